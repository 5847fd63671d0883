//! In-process canvas document with live subscriptions.

use super::{
    CanvasCallback, CanvasUpdate, RosterCallback, RosterFeed, Subscribers, Subscription,
    SyncGateway,
};
use crate::backend::BoxFuture;
use crate::canvas::{CanvasDocument, RasterSnapshot};
use crate::drawing::{DrawingEntry, now_millis};
use crate::error::{ClassroomError, ClassroomResult};
use crate::presence::{Collaborator, CollaboratorTracker};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// A canvas document held in memory and shared by every client holding a
/// clone of the `Arc`. Every change is echoed to all live subscribers,
/// including the one that caused it.
#[derive(Default)]
pub struct MemoryGateway {
    document: RwLock<CanvasDocument>,
    subscribers: Subscribers<dyn Fn(&CanvasUpdate) + Send + Sync>,
    roster: RwLock<CollaboratorTracker>,
    roster_subscribers: Subscribers<dyn Fn(&[Collaborator]) + Send + Sync>,
    offline: AtomicBool,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Make every subsequent push fail as if the network were down.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Copy of the current document.
    pub fn document(&self) -> ClassroomResult<CanvasDocument> {
        self.document
            .read()
            .map(|doc| doc.clone())
            .map_err(|e| ClassroomError::sync("Lock error", e))
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Attach a participant to the roster feed.
    pub fn join(&self, collaborator: Collaborator) {
        if let Ok(mut roster) = self.roster.write() {
            roster.add(collaborator);
        }
        self.broadcast_roster();
    }

    /// Detach a participant from the roster feed.
    pub fn leave(&self, user_id: &str) {
        if let Ok(mut roster) = self.roster.write() {
            roster.remove(user_id);
        }
        self.broadcast_roster();
    }

    fn mutate(&self, f: impl FnOnce(&mut CanvasDocument)) -> ClassroomResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ClassroomError::Sync("backend unreachable".to_string()));
        }
        let update = {
            let mut doc = self
                .document
                .write()
                .map_err(|e| ClassroomError::sync("Lock error", e))?;
            f(&mut doc);
            CanvasUpdate::from(&*doc)
        };
        self.subscribers.for_each(|callback| callback(&update));
        Ok(())
    }

    fn broadcast_roster(&self) {
        let collaborators: Vec<Collaborator> = match self.roster.read() {
            Ok(roster) => roster.iter().cloned().collect(),
            Err(_) => return,
        };
        self.roster_subscribers
            .for_each(|callback| callback(&collaborators));
    }
}

impl SyncGateway for MemoryGateway {
    fn push_drawing(&self, entry: &DrawingEntry) -> BoxFuture<'_, ClassroomResult<()>> {
        let entry = entry.clone();
        Box::pin(async move {
            let author = entry.author_id.clone();
            self.mutate(|doc| {
                doc.append(entry, &author, now_millis());
            })
        })
    }

    fn push_clear(&self, user_id: &str) -> BoxFuture<'_, ClassroomResult<()>> {
        let user_id = user_id.to_string();
        Box::pin(async move { self.mutate(|doc| doc.clear(&user_id, now_millis())) })
    }

    fn push_snapshot(&self, snapshot: RasterSnapshot, user_id: &str) -> BoxFuture<'_, ClassroomResult<()>> {
        let user_id = user_id.to_string();
        Box::pin(async move { self.mutate(|doc| doc.set_snapshot(snapshot, &user_id, now_millis())) })
    }

    fn push_undo_marker(&self, user_id: &str) -> BoxFuture<'_, ClassroomResult<()>> {
        let user_id = user_id.to_string();
        Box::pin(async move { self.mutate(|doc| doc.mark_undo(&user_id, now_millis())) })
    }

    fn subscribe(&self, callback: CanvasCallback) -> Subscription {
        self.subscribers.add(callback)
    }
}

impl RosterFeed for MemoryGateway {
    fn subscribe_roster(&self, callback: RosterCallback) -> Subscription {
        self.roster_subscribers.add(callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drawing::test_entry;
    use pollster::block_on;
    use std::sync::Mutex;

    fn recorder(gateway: &MemoryGateway) -> (Arc<Mutex<Vec<CanvasUpdate>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = gateway.subscribe(Box::new(move |update: &CanvasUpdate| {
            sink.lock().unwrap().push(update.clone());
        }));
        (seen, sub)
    }

    #[test]
    fn test_push_echoes_full_list() {
        let gateway = MemoryGateway::new();
        let (seen, _sub) = recorder(&gateway);

        block_on(gateway.push_drawing(&test_entry("a", "u1"))).unwrap();
        block_on(gateway.push_drawing(&test_entry("b", "u2"))).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].drawings.len(), 2);
        assert_eq!(seen[1].last_modified_by, "u2");
    }

    #[test]
    fn test_cancelled_subscription_stops_delivery() {
        let gateway = MemoryGateway::new();
        let (seen, sub) = recorder(&gateway);

        block_on(gateway.push_drawing(&test_entry("a", "u1"))).unwrap();
        sub.cancel();
        sub.cancel();
        block_on(gateway.push_clear("u1")).unwrap();

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(gateway.subscriber_count(), 0);
    }

    #[test]
    fn test_offline_push_fails_without_changing_document() {
        let gateway = MemoryGateway::new();
        gateway.set_offline(true);

        let result = block_on(gateway.push_drawing(&test_entry("a", "u1")));
        assert!(matches!(result, Err(ClassroomError::Sync(_))));
        assert!(gateway.document().unwrap().is_empty());
    }

    #[test]
    fn test_clear_and_snapshot() {
        let gateway = MemoryGateway::new();
        block_on(gateway.push_drawing(&test_entry("a", "u1"))).unwrap();
        let snapshot = RasterSnapshot {
            width: 1,
            height: 1,
            png_base64: String::new(),
        };
        block_on(gateway.push_snapshot(snapshot, "u1")).unwrap();
        assert_eq!(gateway.document().unwrap().len(), 1);

        block_on(gateway.push_clear("t1")).unwrap();
        let doc = gateway.document().unwrap();
        assert!(doc.cleared);
        assert!(doc.is_empty());
        assert!(doc.canvas_snapshot.is_some());
    }

    #[test]
    fn test_roster_feed() {
        let gateway = MemoryGateway::new();
        let latest = Arc::new(Mutex::new(Vec::new()));
        let sink = latest.clone();
        let _sub = gateway.subscribe_roster(Box::new(move |roster: &[Collaborator]| {
            *sink.lock().unwrap() = roster.to_vec();
        }));

        gateway.join(Collaborator::new("u1", "Ada"));
        gateway.join(Collaborator::new("u1", "Ada"));
        gateway.join(Collaborator::new("u2", "Grace"));
        assert_eq!(latest.lock().unwrap().len(), 2);

        gateway.leave("u1");
        let roster = latest.lock().unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].user_id, "u2");
    }
}
