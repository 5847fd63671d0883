//! External collaborators consumed by the classroom: identity, blob storage,
//! chat persistence, participation counters and video-grid status.
//!
//! Each collaborator is a trait so the rest of the crate can be driven by an
//! in-memory implementation in tests and by a real backend in production.

mod memory;

pub use memory::{
    MemoryBlobStore, MemoryChatBackend, MemoryIdentityProvider, MemoryParticipantFeed,
    MemoryParticipation,
};

use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
