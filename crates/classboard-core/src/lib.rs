//! Classboard Core Library
//!
//! Platform-agnostic model and logic for the Classboard virtual classroom:
//! the shared whiteboard, its sync gateway, presence, participation, chat,
//! file sharing and identity.

pub mod auth;
pub mod backend;
pub mod canvas;
pub mod chat;
pub mod config;
pub mod drawing;
pub mod error;
pub mod files;
pub mod input;
pub mod participation;
pub mod presence;
pub mod raster;
pub mod renderer;
pub mod session;
pub mod store;
pub mod sync;
pub mod tools;

pub use auth::{AuthState, IdentityProvider, Role, UserProfile};
pub use canvas::{CanvasAction, CanvasDocument, RasterSnapshot};
pub use chat::{ChatBackend, ChatMessage, ChatState, MessageFilter};
pub use config::ClientConfig;
pub use drawing::{DrawingEntry, DrawingTool, StrokeDraft};
pub use error::{BannerSlot, ClassroomError, ClassroomResult, ErrorKind};
pub use files::{BlobStore, FileMetadata, FileShelf};
pub use input::{PointerEvent, TouchEvent, Viewport};
pub use participation::{ParticipationReporter, ParticipationService};
pub use presence::{Collaborator, CollaboratorTracker, ParticipantFeed, ParticipantStatus};
pub use renderer::{CanvasRenderer, CursorStyle};
pub use session::WhiteboardSession;
pub use store::DrawingStore;
pub use sync::{CanvasUpdate, ConnectionState, RosterFeed, Subscription, SyncEvent, SyncGateway};
pub use tools::ToolState;
