//! Classroom table: one canvas document, peer set and broadcast channel per
//! classroom.

use crate::error::AppError;
use classboard_core::canvas::{CanvasDocument, RasterSnapshot};
use classboard_core::drawing::{DrawingEntry, now_millis};
use classboard_core::presence::{Collaborator, CollaboratorTracker};
use classboard_core::sync::{CanvasUpdate, ServerMessage};
use dashmap::DashMap;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::debug;

/// Classroom state
struct Classroom {
    /// Broadcast channel for this classroom
    tx: broadcast::Sender<ServerMessage>,
    /// Connected peers by connection id
    peers: HashMap<String, Collaborator>,
    document: CanvasDocument,
}

impl Classroom {
    fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            peers: HashMap::new(),
            document: CanvasDocument::new(),
        }
    }

    /// Peers deduplicated by user id, ordered by user id.
    fn roster(&self) -> Vec<Collaborator> {
        let mut peers: Vec<&Collaborator> = self.peers.values().collect();
        peers.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        let mut tracker = CollaboratorTracker::new();
        for peer in peers {
            tracker.add(peer.clone());
        }
        tracker.iter().cloned().collect()
    }

    fn broadcast(&self, msg: ServerMessage) {
        // No receivers is fine
        let _ = self.tx.send(msg);
    }

    fn broadcast_canvas(&self) {
        self.broadcast(ServerMessage::Canvas(CanvasUpdate::from(&self.document)));
    }

    fn broadcast_roster(&self) {
        self.broadcast(ServerMessage::Roster {
            collaborators: self.roster(),
        });
    }
}

/// What a joining connection receives.
pub struct Joined {
    pub rx: broadcast::Receiver<ServerMessage>,
    pub canvas: CanvasUpdate,
    pub peer_count: usize,
}

/// Shared application state
pub struct AppState {
    classrooms: DashMap<String, Classroom>,
    channel_capacity: usize,
}

impl AppState {
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            classrooms: DashMap::new(),
            channel_capacity,
        }
    }

    /// Add a connection to a classroom, creating the classroom if needed.
    pub fn join(&self, classroom: &str, conn_id: &str, collaborator: Collaborator) -> Joined {
        let capacity = self.channel_capacity;
        let mut room = self
            .classrooms
            .entry(classroom.to_string())
            .or_insert_with(|| Classroom::new(capacity));
        room.peers.insert(conn_id.to_string(), collaborator);
        let joined = Joined {
            rx: room.tx.subscribe(),
            canvas: CanvasUpdate::from(&room.document),
            peer_count: room.peers.len(),
        };
        room.broadcast_roster();
        joined
    }

    /// Remove a connection. The canvas document is kept.
    pub fn leave(&self, classroom: &str, conn_id: &str) {
        if let Some(mut room) = self.classrooms.get_mut(classroom) {
            if room.peers.remove(conn_id).is_some() {
                room.broadcast_roster();
            }
        }
    }

    /// Validate and append an entry, then send the full list to everyone.
    pub fn push_drawing(&self, classroom: &str, entry: DrawingEntry) -> Result<(), AppError> {
        entry.validate()?;
        let mut room = self.room_mut(classroom)?;
        let author = entry.author_id.clone();
        if !room.document.append(entry, &author, now_millis()) {
            debug!("Duplicate drawing from {} ignored", author);
        }
        room.broadcast_canvas();
        Ok(())
    }

    pub fn clear(&self, classroom: &str, user_id: &str) -> Result<(), AppError> {
        let mut room = self.room_mut(classroom)?;
        room.document.clear(user_id, now_millis());
        room.broadcast_canvas();
        Ok(())
    }

    pub fn snapshot(&self, classroom: &str, snapshot: RasterSnapshot, user_id: &str) -> Result<(), AppError> {
        let mut room = self.room_mut(classroom)?;
        room.document.set_snapshot(snapshot, user_id, now_millis());
        room.broadcast_canvas();
        Ok(())
    }

    pub fn undo(&self, classroom: &str, user_id: &str) -> Result<(), AppError> {
        let mut room = self.room_mut(classroom)?;
        room.document.mark_undo(user_id, now_millis());
        room.broadcast_canvas();
        Ok(())
    }

    /// Copy of a classroom's canvas document.
    pub fn canvas(&self, classroom: &str) -> Result<CanvasDocument, AppError> {
        self.classrooms
            .get(classroom)
            .map(|room| room.document.clone())
            .ok_or_else(|| AppError::NotFound(format!("classroom {}", classroom)))
    }

    pub fn roster(&self, classroom: &str) -> Vec<Collaborator> {
        self.classrooms
            .get(classroom)
            .map(|room| room.roster())
            .unwrap_or_default()
    }

    #[cfg(test)]
    fn classroom_count(&self) -> usize {
        self.classrooms.len()
    }

    fn room_mut(&self, classroom: &str) -> Result<dashmap::mapref::one::RefMut<'_, String, Classroom>, AppError> {
        self.classrooms
            .get_mut(classroom)
            .ok_or_else(|| AppError::NotFound(format!("classroom {}", classroom)))
    }
}
