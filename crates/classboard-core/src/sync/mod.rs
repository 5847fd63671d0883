//! Sync gateway: pushes local drawing entries to the shared canvas document
//! and delivers the full remote drawing list on every change.
//!
//! Delivery is not guaranteed. A failed push surfaces as
//! [`ClassroomError::Sync`](crate::error::ClassroomError::Sync); the entry has
//! already been applied locally, so local and remote views diverge until the
//! next successful push or remote update. Nothing is retried.

mod memory;
mod protocol;
mod relay;

pub use memory::MemoryGateway;
pub use protocol::{ClientMessage, ServerMessage};
pub use relay::{ConnectionState, NativeWebSocket, RelayGateway, SyncEvent};

use crate::backend::BoxFuture;
use crate::canvas::{CanvasDocument, RasterSnapshot};
use crate::drawing::DrawingEntry;
use crate::error::ClassroomResult;
use crate::presence::Collaborator;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Full drawing list delivered on every change of the canvas document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasUpdate {
    pub drawings: Vec<DrawingEntry>,
    pub last_modified_by: String,
    pub last_modified_at_millis: i64,
    pub version: u64,
}

impl From<&CanvasDocument> for CanvasUpdate {
    fn from(doc: &CanvasDocument) -> Self {
        Self {
            drawings: doc.drawings.clone(),
            last_modified_by: doc.last_modified_by.clone(),
            last_modified_at_millis: doc.last_modified_at_millis,
            version: doc.version,
        }
    }
}

/// Callback invoked for every canvas change, including the local client's own.
pub type CanvasCallback = Box<dyn Fn(&CanvasUpdate) + Send + Sync>;

/// Callback invoked with the current roster on every presence change.
pub type RosterCallback = Box<dyn Fn(&[Collaborator]) + Send + Sync>;

/// Handle returned by a subscription. Cancelling is idempotent; dropping the
/// handle does not cancel.
#[derive(Debug, Clone)]
pub struct Subscription {
    active: Arc<AtomicBool>,
}

impl Subscription {
    /// Detach the subscription. Safe to call any number of times.
    pub fn cancel(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            log::debug!("Subscription cancelled");
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// A list of callbacks with cancellation flags.
///
/// Callbacks run after the list is unlocked, so they may subscribe or cancel.
pub(crate) struct Subscribers<C: ?Sized> {
    entries: Mutex<Vec<(Arc<AtomicBool>, Arc<C>)>>,
}

impl<C: ?Sized> Default for Subscribers<C> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl<C: ?Sized> Subscribers<C> {
    pub(crate) fn add(&self, callback: Box<C>) -> Subscription {
        let active = Arc::new(AtomicBool::new(true));
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((active.clone(), Arc::from(callback)));
        }
        Subscription { active }
    }

    /// Drop cancelled entries and call `f` on each live callback.
    pub(crate) fn for_each(&self, mut f: impl FnMut(&C)) {
        let live: Vec<(Arc<AtomicBool>, Arc<C>)> = {
            let Ok(mut entries) = self.entries.lock() else {
                log::error!("Subscriber list poisoned");
                return;
            };
            entries.retain(|(active, _)| active.load(Ordering::SeqCst));
            entries.clone()
        };
        for (active, callback) in &live {
            // Cancelled by an earlier callback in this round
            if active.load(Ordering::SeqCst) {
                f(&**callback);
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries
            .lock()
            .map(|entries| entries.iter().filter(|(a, _)| a.load(Ordering::SeqCst)).count())
            .unwrap_or(0)
    }
}

/// One-way-out "append my entry", one-way-in "replace with the full list".
pub trait SyncGateway: Send + Sync {
    /// Append an entry to the shared canvas document.
    fn push_drawing(&self, entry: &DrawingEntry) -> BoxFuture<'_, ClassroomResult<()>>;

    /// Reset the shared document to the cleared state.
    fn push_clear(&self, user_id: &str) -> BoxFuture<'_, ClassroomResult<()>>;

    /// Store a rendered raster next to the drawing list.
    fn push_snapshot(&self, snapshot: RasterSnapshot, user_id: &str) -> BoxFuture<'_, ClassroomResult<()>>;

    /// Record that a user undid a local action.
    fn push_undo_marker(&self, user_id: &str) -> BoxFuture<'_, ClassroomResult<()>>;

    /// Register for every change of the canvas document.
    fn subscribe(&self, callback: CanvasCallback) -> Subscription;
}

/// Live feed of the participants attached to a classroom.
pub trait RosterFeed: Send + Sync {
    fn subscribe_roster(&self, callback: RosterCallback) -> Subscription;
}
