//! Whiteboard session: one user's view of one classroom's board.
//!
//! The session owns the local drawing store, tool state and renderer, and
//! talks to the shared canvas through a [`SyncGateway`]. Local edits are
//! applied optimistically and pushed; remote updates arrive through a
//! subscription and overwrite the local list when [`WhiteboardSession::poll`]
//! runs.

use crate::auth::UserProfile;
use crate::backend::BoxFuture;
use crate::canvas::RasterSnapshot;
use crate::config::ClientConfig;
use crate::drawing::{DrawingEntry, DrawingTool, StrokeDraft, now_millis};
use crate::error::{BannerSlot, ClassroomError, ClassroomResult};
use crate::input::{PointerEvent, TouchEvent, Viewport};
use crate::participation::{EngagementKind, ParticipationReporter};
use crate::presence::{Collaborator, CollaboratorTracker};
use crate::renderer::{CanvasRenderer, CursorStyle};
use crate::store::{DrawingStore, ReplaceOutcome};
use crate::sync::{CanvasUpdate, RosterFeed, Subscription, SyncGateway};
use crate::tools::ToolState;
use base64::{Engine, engine::general_purpose::STANDARD};
use std::sync::{Arc, Mutex};

pub struct WhiteboardSession<G: SyncGateway + RosterFeed> {
    gateway: Arc<G>,
    classroom: String,
    user: Option<UserProfile>,
    store: DrawingStore,
    tools: ToolState,
    renderer: CanvasRenderer,
    collaborators: CollaboratorTracker,
    reporter: Option<ParticipationReporter>,
    banner: BannerSlot,
    inbox: Arc<Mutex<Vec<CanvasUpdate>>>,
    roster_inbox: Arc<Mutex<Option<Vec<Collaborator>>>>,
    subscriptions: Vec<Subscription>,
    side_effects: Vec<BoxFuture<'static, ()>>,
}

impl<G: SyncGateway + RosterFeed> WhiteboardSession<G> {
    pub fn new(gateway: Arc<G>, classroom: &str, viewport: Viewport, config: &ClientConfig) -> Self {
        Self {
            gateway,
            classroom: classroom.to_string(),
            user: None,
            store: config.drawing_store(),
            tools: ToolState::default(),
            renderer: CanvasRenderer::new(viewport),
            collaborators: CollaboratorTracker::new(),
            reporter: None,
            banner: config.banner_slot(),
            inbox: Arc::new(Mutex::new(Vec::new())),
            roster_inbox: Arc::new(Mutex::new(None)),
            subscriptions: Vec::new(),
            side_effects: Vec::new(),
        }
    }

    pub fn with_reporter(mut self, reporter: ParticipationReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn set_user(&mut self, user: Option<UserProfile>) {
        self.user = user;
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    pub fn classroom(&self) -> &str {
        &self.classroom
    }

    pub fn store(&self) -> &DrawingStore {
        &self.store
    }

    pub fn drawings(&self) -> &[DrawingEntry] {
        self.store.drawings()
    }

    pub fn tools(&self) -> &ToolState {
        &self.tools
    }

    pub fn renderer(&self) -> &CanvasRenderer {
        &self.renderer
    }

    pub fn cursor(&self) -> CursorStyle {
        self.renderer.cursor(&self.tools)
    }

    pub fn collaborators(&self) -> &CollaboratorTracker {
        &self.collaborators
    }

    pub fn banner(&self) -> &BannerSlot {
        &self.banner
    }

    pub fn is_attached(&self) -> bool {
        !self.subscriptions.is_empty()
    }

    /// Subscribe to canvas and roster updates. Does nothing if already attached.
    pub fn attach(&mut self) {
        if self.is_attached() {
            return;
        }
        let inbox = self.inbox.clone();
        let canvas = self.gateway.subscribe(Box::new(move |update: &CanvasUpdate| {
            if let Ok(mut inbox) = inbox.lock() {
                inbox.push(update.clone());
            }
        }));
        let roster_inbox = self.roster_inbox.clone();
        let roster = self
            .gateway
            .subscribe_roster(Box::new(move |roster: &[Collaborator]| {
                if let Ok(mut latest) = roster_inbox.lock() {
                    *latest = Some(roster.to_vec());
                }
            }));
        self.subscriptions = vec![canvas, roster];
        log::info!("Attached to classroom {}", self.classroom);
    }

    /// Cancel the subscriptions. Updates already queued are discarded.
    pub fn detach(&mut self) {
        if self.subscriptions.is_empty() {
            return;
        }
        for subscription in self.subscriptions.drain(..) {
            subscription.cancel();
        }
        if let Ok(mut inbox) = self.inbox.lock() {
            inbox.clear();
        }
        log::info!("Detached from classroom {}", self.classroom);
    }

    /// Apply queued remote updates. Returns the outcome of the last canvas
    /// update applied, if any.
    pub fn poll(&mut self) -> Option<ReplaceOutcome> {
        let updates = match self.inbox.lock() {
            Ok(mut inbox) => std::mem::take(&mut *inbox),
            Err(e) => {
                log::error!("Canvas inbox poisoned: {}", e);
                Vec::new()
            }
        };
        let roster = self.roster_inbox.lock().ok().and_then(|mut latest| latest.take());
        if let Some(roster) = roster {
            self.collaborators.set_all(&roster);
        }

        let mut outcome = None;
        for update in updates {
            self.store
                .set_last_modified(&update.last_modified_by, update.last_modified_at_millis);
            outcome = Some(self.store.replace_all(update.drawings));
        }
        outcome
    }

    /// Futures for participation counters fired since the last call.
    pub fn take_side_effects(&mut self) -> Vec<BoxFuture<'static, ()>> {
        std::mem::take(&mut self.side_effects)
    }

    pub fn set_tool(&mut self, tool: DrawingTool) -> ClassroomResult<()> {
        self.require_user()?;
        if self.tools.set_tool(tool) {
            self.fire(EngagementKind::Whiteboard);
        }
        Ok(())
    }

    pub fn set_color(&mut self, color: &str) -> ClassroomResult<()> {
        self.require_user()?;
        self.tools.set_color(color)
    }

    pub fn set_brush(&mut self, size: u32) -> ClassroomResult<()> {
        self.require_user()?;
        self.tools.set_size(size)
    }

    /// Turn a finished stroke into an entry, apply it locally and push it.
    ///
    /// A failed push leaves the local entry in place and raises a banner.
    pub async fn save_drawing(&mut self, draft: StrokeDraft) -> ClassroomResult<DrawingEntry> {
        let author = self.require_user()?.uid.clone();
        let entry = DrawingEntry::from_draft(draft, &author, now_millis());
        entry.validate()?;
        self.store.append(entry.clone())?;
        self.fire(EngagementKind::Whiteboard);

        let gateway = self.gateway.clone();
        if let Err(e) = gateway.push_drawing(&entry).await {
            self.banner.raise(&e, now_millis());
            return Err(e);
        }
        Ok(entry)
    }

    pub async fn clear_board(&mut self) -> ClassroomResult<()> {
        let author = self.require_user()?.uid.clone();
        self.store.clear();
        self.renderer.clear();

        let gateway = self.gateway.clone();
        if let Err(e) = gateway.push_clear(&author).await {
            self.banner.raise(&e, now_millis());
            return Err(e);
        }
        Ok(())
    }

    /// Step back locally and record an undo marker on the shared canvas.
    /// The marker is best effort. Returns whether anything was undone.
    pub async fn undo(&mut self) -> ClassroomResult<bool> {
        let author = self.require_user()?.uid.clone();
        if !self.store.undo() {
            return Ok(false);
        }
        let gateway = self.gateway.clone();
        if let Err(e) = gateway.push_undo_marker(&author).await {
            log::warn!("Failed to record undo marker: {}", e);
        }
        Ok(true)
    }

    /// Step forward locally. Nothing is pushed.
    pub fn redo(&mut self) -> ClassroomResult<bool> {
        self.require_user()?;
        Ok(self.store.redo())
    }

    /// Store a PNG of the local raster on the shared canvas.
    pub async fn save_canvas(&mut self) -> ClassroomResult<RasterSnapshot> {
        let author = self.require_user()?.uid.clone();
        let raster = self.renderer.raster();
        let snapshot = RasterSnapshot {
            width: raster.width(),
            height: raster.height(),
            png_base64: STANDARD.encode(raster.to_png()?),
        };

        let gateway = self.gateway.clone();
        if let Err(e) = gateway.push_snapshot(snapshot.clone(), &author).await {
            self.banner.raise(&e, now_millis());
            return Err(e);
        }
        log::info!("Saved {}x{} canvas snapshot", snapshot.width, snapshot.height);
        Ok(snapshot)
    }

    /// Feed a pointer event. Completed strokes are saved; the saved entry is
    /// returned.
    pub async fn handle_pointer(&mut self, event: PointerEvent) -> ClassroomResult<Option<DrawingEntry>> {
        self.require_user()?;
        let draft = self.renderer.handle_pointer(event, &self.tools);
        self.save_finished(draft).await
    }

    pub async fn handle_touch(&mut self, event: &TouchEvent) -> ClassroomResult<Option<DrawingEntry>> {
        self.require_user()?;
        let draft = self.renderer.handle_touch(event, &self.tools);
        self.save_finished(draft).await
    }

    pub fn resize(&mut self, viewport: Viewport) {
        self.renderer.resize(viewport);
    }

    async fn save_finished(&mut self, draft: Option<StrokeDraft>) -> ClassroomResult<Option<DrawingEntry>> {
        match draft {
            // Eraser strokes only exist on the raster.
            Some(draft) if draft.points.is_empty() => {
                log::debug!("Skipping {:?} stroke without points", draft.tool);
                Ok(None)
            }
            Some(draft) => self.save_drawing(draft).await.map(Some),
            None => Ok(None),
        }
    }

    fn require_user(&self) -> ClassroomResult<&UserProfile> {
        self.user
            .as_ref()
            .ok_or_else(|| ClassroomError::Permission("sign in to use the whiteboard".to_string()))
    }

    fn fire(&mut self, kind: EngagementKind) {
        if let Some(reporter) = &self.reporter {
            self.side_effects.push(reporter.fire(kind));
        }
    }
}

impl<G: SyncGateway + RosterFeed> Drop for WhiteboardSession<G> {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::backend::MemoryParticipation;
    use crate::participation::ParticipationService;
    use crate::sync::MemoryGateway;
    use kurbo::{Point, Rect};
    use pollster::block_on;

    fn user(uid: &str) -> UserProfile {
        UserProfile {
            uid: uid.to_string(),
            email: format!("{}@school.edu", uid),
            display_name: uid.to_string(),
            role: Role::Student,
        }
    }

    fn session(gateway: &Arc<MemoryGateway>, uid: &str) -> WhiteboardSession<MemoryGateway> {
        let viewport = Viewport::new(Rect::new(0.0, 0.0, 200.0, 100.0), 1.0);
        let mut session = WhiteboardSession::new(gateway.clone(), "room", viewport, &ClientConfig::default());
        session.set_user(Some(user(uid)));
        session.attach();
        session
    }

    fn stroke(points: &[(f64, f64)]) -> StrokeDraft {
        StrokeDraft {
            tool: DrawingTool::Pen,
            color: "#FF0000".to_string(),
            size: 3,
            points: points.iter().map(|&(x, y)| Point::new(x, y)).collect(),
        }
    }

    fn draw(session: &mut WhiteboardSession<MemoryGateway>, from: (f64, f64), to: (f64, f64)) {
        let at = |(x, y)| Point::new(x, y);
        block_on(session.handle_pointer(PointerEvent::Down { position: at(from) })).unwrap();
        block_on(session.handle_pointer(PointerEvent::Move { position: at(to) })).unwrap();
        block_on(session.handle_pointer(PointerEvent::Up { position: at(to) })).unwrap();
    }

    #[test]
    fn test_stroke_reaches_both_clients() {
        let gateway = MemoryGateway::shared();
        let mut a = session(&gateway, "a");
        let mut b = session(&gateway, "b");

        let entry = block_on(a.save_drawing(stroke(&[(10.0, 10.0), (20.0, 20.0)]))).unwrap();
        assert_eq!(a.drawings().len(), 1);
        assert_eq!(a.store().pending(), [entry.id.clone()]);

        let outcome = a.poll().unwrap();
        assert_eq!(outcome.confirmed, vec![entry.id.clone()]);
        assert!(a.store().pending().is_empty());

        b.poll();
        assert_eq!(b.drawings(), a.drawings());
        assert_eq!(b.store().last_modified().unwrap().by, "a");
    }

    #[test]
    fn test_pointer_stroke_is_saved() {
        let gateway = MemoryGateway::shared();
        let mut a = session(&gateway, "a");
        draw(&mut a, (10.0, 10.0), (50.0, 10.0));

        assert_eq!(a.drawings().len(), 1);
        assert_eq!(gateway.document().unwrap().len(), 1);
        assert_eq!(a.drawings()[0].points, vec![Point::new(10.0, 10.0), Point::new(50.0, 10.0)]);
    }

    #[test]
    fn test_eraser_stroke_stays_local() {
        let gateway = MemoryGateway::shared();
        let mut a = session(&gateway, "a");
        a.set_tool(DrawingTool::Eraser).unwrap();
        draw(&mut a, (10.0, 10.0), (20.0, 10.0));

        assert!(a.drawings().is_empty());
        assert!(gateway.document().unwrap().is_empty());
        assert_eq!(a.cursor(), CursorStyle::Grab);
    }

    #[test]
    fn test_offline_push_keeps_optimistic_entry() {
        let gateway = MemoryGateway::shared();
        let mut a = session(&gateway, "a");
        gateway.set_offline(true);

        let result = block_on(a.save_drawing(stroke(&[(1.0, 1.0)])));
        assert!(matches!(result, Err(ClassroomError::Sync(_))));
        assert_eq!(a.drawings().len(), 1);
        assert!(a.banner().current(now_millis()).is_some());
        assert!(gateway.document().unwrap().is_empty());
    }

    #[test]
    fn test_remote_update_drops_unconfirmed_local_entry() {
        let gateway = MemoryGateway::shared();
        let mut a = session(&gateway, "a");
        let mut b = session(&gateway, "b");

        gateway.set_offline(true);
        let lost = block_on(a.save_drawing(stroke(&[(1.0, 1.0)]))).unwrap_err();
        assert!(matches!(lost, ClassroomError::Sync(_)));
        gateway.set_offline(false);

        block_on(b.save_drawing(stroke(&[(5.0, 5.0)]))).unwrap();
        let outcome = a.poll().unwrap();
        assert!(outcome.diverged());
        assert_eq!(a.drawings().len(), 1);
        assert_eq!(a.drawings()[0].author_id, "b");
    }

    #[test]
    fn test_undo_redo_and_marker() {
        let gateway = MemoryGateway::shared();
        let mut a = session(&gateway, "a");
        block_on(a.save_drawing(stroke(&[(1.0, 1.0)]))).unwrap();
        block_on(a.save_drawing(stroke(&[(2.0, 2.0)]))).unwrap();

        assert!(block_on(a.undo()).unwrap());
        assert_eq!(a.drawings().len(), 1);
        assert_eq!(gateway.document().unwrap().last_action, Some(crate::canvas::CanvasAction::Undo));
        // The shared list is untouched by undo.
        assert_eq!(gateway.document().unwrap().len(), 2);

        assert!(a.redo().unwrap());
        assert_eq!(a.drawings().len(), 2);
        assert!(!a.redo().unwrap());
    }

    #[test]
    fn test_undo_marker_failure_is_swallowed() {
        let gateway = MemoryGateway::shared();
        let mut a = session(&gateway, "a");
        block_on(a.save_drawing(stroke(&[(1.0, 1.0)]))).unwrap();
        gateway.set_offline(true);
        assert!(block_on(a.undo()).unwrap());
        assert!(a.banner().current(now_millis()).is_none());
    }

    #[test]
    fn test_clear_board_reaches_peers() {
        let gateway = MemoryGateway::shared();
        let mut a = session(&gateway, "a");
        let mut b = session(&gateway, "b");
        block_on(a.save_drawing(stroke(&[(1.0, 1.0)]))).unwrap();
        b.poll();
        assert_eq!(b.drawings().len(), 1);

        block_on(b.clear_board()).unwrap();
        a.poll();
        assert!(a.drawings().is_empty());
        assert!(gateway.document().unwrap().cleared);
    }

    #[test]
    fn test_signed_out_session_is_inert() {
        let gateway = MemoryGateway::shared();
        let mut a = session(&gateway, "a");
        a.set_user(None);

        assert!(matches!(
            block_on(a.save_drawing(stroke(&[(1.0, 1.0)]))),
            Err(ClassroomError::Permission(_))
        ));
        assert!(matches!(a.set_tool(DrawingTool::Eraser), Err(ClassroomError::Permission(_))));
        assert!(block_on(a.handle_pointer(PointerEvent::Down { position: Point::ZERO })).is_err());
        assert!(!a.renderer().is_drawing());
    }

    #[test]
    fn test_tool_change_fires_participation() {
        let gateway = MemoryGateway::shared();
        let service = Arc::new(MemoryParticipation::new());
        let mut a = session(&gateway, "a").with_reporter(ParticipationReporter::new(service.clone(), "room", "a"));

        a.set_tool(DrawingTool::Highlighter).unwrap();
        a.set_tool(DrawingTool::Highlighter).unwrap();
        block_on(a.save_drawing(stroke(&[(1.0, 1.0)]))).unwrap();

        let effects = a.take_side_effects();
        assert_eq!(effects.len(), 2);
        for effect in effects {
            block_on(effect);
        }
        let records = block_on(service.records("room")).unwrap();
        assert_eq!(records[0].whiteboard_interactions, 2);
    }

    #[test]
    fn test_save_canvas_snapshot() {
        let gateway = MemoryGateway::shared();
        let mut a = session(&gateway, "a");
        draw(&mut a, (10.0, 10.0), (50.0, 10.0));

        let snapshot = block_on(a.save_canvas()).unwrap();
        assert_eq!((snapshot.width, snapshot.height), (200, 100));
        let png = STANDARD.decode(&snapshot.png_base64).unwrap();
        assert_eq!(&png[1..4], b"PNG");
        assert_eq!(gateway.document().unwrap().canvas_snapshot, Some(snapshot));
    }

    #[test]
    fn test_roster_and_detach() {
        let gateway = MemoryGateway::shared();
        let mut a = session(&gateway, "a");
        gateway.join(Collaborator::new("a", "A"));
        gateway.join(Collaborator::new("b", "B"));
        a.poll();
        assert_eq!(a.collaborators().len(), 2);

        a.detach();
        assert!(!a.is_attached());
        assert_eq!(gateway.subscriber_count(), 0);

        let mut b = session(&gateway, "b");
        block_on(b.save_drawing(stroke(&[(1.0, 1.0)]))).unwrap();
        assert!(a.poll().is_none());
    }
}
