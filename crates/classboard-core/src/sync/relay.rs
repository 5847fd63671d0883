//! WebSocket client for the canvas relay server.

use super::protocol::{ClientMessage, ServerMessage};
use super::{
    CanvasCallback, CanvasUpdate, RosterCallback, RosterFeed, Subscribers, Subscription,
    SyncGateway,
};
use crate::backend::BoxFuture;
use crate::canvas::RasterSnapshot;
use crate::drawing::DrawingEntry;
use crate::error::{ClassroomError, ClassroomResult};
use crate::presence::Collaborator;
use std::sync::Mutex;
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tungstenite::{Message, connect};
use url::Url;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Events from the WebSocket client
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Connected to server
    Connected,
    /// Disconnected from server
    Disconnected,
    /// Joined a classroom
    Joined { classroom: String, peer_count: usize, canvas: CanvasUpdate },
    /// The canvas changed
    CanvasChanged(CanvasUpdate),
    /// The roster changed
    Roster(Vec<Collaborator>),
    /// Error occurred
    Error { message: String },
}

impl From<ServerMessage> for SyncEvent {
    fn from(msg: ServerMessage) -> Self {
        match msg {
            ServerMessage::Joined { classroom, peer_count, canvas } => {
                SyncEvent::Joined { classroom, peer_count, canvas }
            }
            ServerMessage::Canvas(update) => SyncEvent::CanvasChanged(update),
            ServerMessage::Roster { collaborators } => SyncEvent::Roster(collaborators),
            ServerMessage::Error { message } => SyncEvent::Error { message },
        }
    }
}

/// Commands sent to the WebSocket thread.
enum WsCommand {
    Send(String),
    Close,
}

/// WebSocket client for native platforms.
///
/// Uses a background thread for non-blocking operation.
pub struct NativeWebSocket {
    state: ConnectionState,
    events: Vec<SyncEvent>,
    /// Channel to send commands to the WebSocket thread.
    cmd_tx: Option<Sender<WsCommand>>,
    /// Channel to receive events from the WebSocket thread.
    event_rx: Option<Receiver<SyncEvent>>,
    /// Handle to the WebSocket thread.
    _thread: Option<JoinHandle<()>>,
}

impl NativeWebSocket {
    /// Create a new disconnected WebSocket client.
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            events: Vec::new(),
            cmd_tx: None,
            event_rx: None,
            _thread: None,
        }
    }

    /// Connect to a WebSocket server.
    pub fn connect(&mut self, url: &str) -> ClassroomResult<()> {
        if self.cmd_tx.is_some() {
            return Err(ClassroomError::Sync("Already connected".to_string()));
        }

        let parsed_url = Url::parse(url)
            .map_err(|e| ClassroomError::Validation(format!("Invalid URL: {}", e)))?;
        if parsed_url.scheme() != "ws" && parsed_url.scheme() != "wss" {
            return Err(ClassroomError::Validation(format!(
                "Invalid WebSocket URL scheme: {}",
                parsed_url.scheme()
            )));
        }

        self.state = ConnectionState::Connecting;

        let (cmd_tx, cmd_rx) = channel::<WsCommand>();
        let (event_tx, event_rx) = channel::<SyncEvent>();
        let url = url.to_string();

        let handle = thread::spawn(move || run_socket(&url, cmd_rx, event_tx));

        self.cmd_tx = Some(cmd_tx);
        self.event_rx = Some(event_rx);
        self._thread = Some(handle);

        Ok(())
    }

    /// Disconnect from the server.
    pub fn disconnect(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(WsCommand::Close);
        }
        self.event_rx = None;
        self._thread = None;
        self.state = ConnectionState::Disconnected;
    }

    /// Queue a text message.
    pub fn send(&self, msg: &str) -> ClassroomResult<()> {
        match self.cmd_tx {
            Some(ref tx) => tx
                .send(WsCommand::Send(msg.to_string()))
                .map_err(|e| ClassroomError::sync("Send failed", e)),
            None => Err(ClassroomError::Sync("Not connected".to_string())),
        }
    }

    /// Poll for pending events (non-blocking).
    pub fn poll_events(&mut self) -> Vec<SyncEvent> {
        if let Some(ref rx) = self.event_rx {
            while let Ok(event) = rx.try_recv() {
                match &event {
                    SyncEvent::Connected => self.state = ConnectionState::Connected,
                    SyncEvent::Disconnected => self.state = ConnectionState::Disconnected,
                    SyncEvent::Error { .. } => self.state = ConnectionState::Error,
                    _ => {}
                }
                self.events.push(event);
            }
        }

        std::mem::take(&mut self.events)
    }

    /// Get current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

impl Default for NativeWebSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NativeWebSocket {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// At most the first `max_chars` characters of `msg`, cut on a char boundary.
fn preview(msg: &str, max_chars: usize) -> &str {
    msg.char_indices().nth(max_chars).map_or(msg, |(i, _)| &msg[..i])
}

/// Reports `Disconnected` when the socket thread ends, including by unwinding.
struct ExitNotice {
    event_tx: Sender<SyncEvent>,
    connected: bool,
}

impl Drop for ExitNotice {
    fn drop(&mut self) {
        if self.connected {
            if thread::panicking() {
                log::error!("WebSocket thread panicked");
            }
            let _ = self.event_tx.send(SyncEvent::Disconnected);
        }
    }
}

/// Body of the WebSocket thread.
fn run_socket(url: &str, cmd_rx: Receiver<WsCommand>, event_tx: Sender<SyncEvent>) {
    log::info!("WebSocket thread: connecting to {}", url);

    let (mut socket, response) = match connect(url) {
        Ok(pair) => pair,
        Err(e) => {
            log::error!("WebSocket connection failed: {}", e);
            let _ = event_tx.send(SyncEvent::Error {
                message: format!("Connection failed: {}", e),
            });
            return;
        }
    };
    let mut exit = ExitNotice {
        event_tx: event_tx.clone(),
        connected: false,
    };
    log::info!("WebSocket connected, status: {}", response.status());
    let _ = event_tx.send(SyncEvent::Connected);
    exit.connected = true;

    // Short read timeout keeps the loop responsive to outgoing commands.
    if let tungstenite::stream::MaybeTlsStream::Plain(tcp) = socket.get_mut() {
        let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
        let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
    }

    loop {
        match cmd_rx.try_recv() {
            Ok(WsCommand::Send(msg)) => {
                log::debug!("WebSocket sending: {}", preview(&msg, 100));
                if let Err(e) = socket.send(Message::Text(msg)) {
                    log::error!("WebSocket send error: {}", e);
                    break;
                }
            }
            Ok(WsCommand::Close) => {
                log::info!("WebSocket close requested");
                let _ = socket.close(None);
                break;
            }
            Err(TryRecvError::Disconnected) => {
                log::info!("WebSocket command channel disconnected");
                break;
            }
            Err(TryRecvError::Empty) => {}
        }

        match socket.read() {
            Ok(Message::Text(txt)) => match serde_json::from_str::<ServerMessage>(&txt) {
                Ok(server_msg) => {
                    let _ = event_tx.send(SyncEvent::from(server_msg));
                }
                Err(e) => log::warn!("Failed to parse server message: {}", e),
            },
            Ok(Message::Ping(data)) => {
                let _ = socket.send(Message::Pong(data));
            }
            Ok(Message::Close(_)) => {
                log::info!("WebSocket received close frame");
                break;
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(e) => {
                log::error!("WebSocket read error: {}", e);
                break;
            }
        }
    }

    log::info!("WebSocket thread exiting");
}

/// [`SyncGateway`] backed by the relay server.
///
/// Pushes are queued on the socket; they succeed once queued and fail with a
/// sync error when the socket is gone. Incoming events are only dispatched
/// to subscribers from [`RelayGateway::poll`].
pub struct RelayGateway {
    socket: Mutex<NativeWebSocket>,
    subscribers: Subscribers<dyn Fn(&CanvasUpdate) + Send + Sync>,
    roster_subscribers: Subscribers<dyn Fn(&[Collaborator]) + Send + Sync>,
}

impl RelayGateway {
    /// Connect to the relay and join a classroom as `user`.
    pub fn connect(url: &str, classroom: &str, user: &Collaborator) -> ClassroomResult<Self> {
        let mut socket = NativeWebSocket::new();
        socket.connect(url)?;
        let gateway = Self {
            socket: Mutex::new(socket),
            subscribers: Subscribers::default(),
            roster_subscribers: Subscribers::default(),
        };
        gateway.send(&ClientMessage::Join {
            classroom: classroom.to_string(),
            user_id: user.user_id.clone(),
            user_name: user.user_name.clone(),
        })?;
        Ok(gateway)
    }

    /// Drain socket events, dispatch canvas and roster changes to
    /// subscribers, and return every event for the caller to inspect.
    pub fn poll(&self) -> Vec<SyncEvent> {
        let events = match self.socket.lock() {
            Ok(mut socket) => socket.poll_events(),
            Err(_) => return Vec::new(),
        };
        for event in &events {
            match event {
                SyncEvent::Joined { canvas, .. } | SyncEvent::CanvasChanged(canvas) => {
                    self.subscribers.for_each(|callback| callback(canvas));
                }
                SyncEvent::Roster(collaborators) => {
                    self.roster_subscribers
                        .for_each(|callback| callback(collaborators));
                }
                SyncEvent::Error { message } => log::warn!("Relay error: {}", message),
                SyncEvent::Connected | SyncEvent::Disconnected => {}
            }
        }
        events
    }

    pub fn state(&self) -> ConnectionState {
        self.socket
            .lock()
            .map(|socket| socket.state())
            .unwrap_or(ConnectionState::Error)
    }

    /// Leave the classroom and close the socket.
    pub fn disconnect(&self) {
        let _ = self.send(&ClientMessage::Leave);
        if let Ok(mut socket) = self.socket.lock() {
            socket.disconnect();
        }
    }

    fn send(&self, msg: &ClientMessage) -> ClassroomResult<()> {
        let json = serde_json::to_string(msg)
            .map_err(|e| ClassroomError::Validation(format!("Serialization error: {}", e)))?;
        let socket = self
            .socket
            .lock()
            .map_err(|e| ClassroomError::sync("Lock error", e))?;
        socket.send(&json)
    }
}

impl SyncGateway for RelayGateway {
    fn push_drawing(&self, entry: &DrawingEntry) -> BoxFuture<'_, ClassroomResult<()>> {
        let msg = ClientMessage::PushDrawing { entry: entry.clone() };
        Box::pin(async move { self.send(&msg) })
    }

    fn push_clear(&self, user_id: &str) -> BoxFuture<'_, ClassroomResult<()>> {
        let msg = ClientMessage::Clear { user_id: user_id.to_string() };
        Box::pin(async move { self.send(&msg) })
    }

    fn push_snapshot(&self, snapshot: RasterSnapshot, user_id: &str) -> BoxFuture<'_, ClassroomResult<()>> {
        let msg = ClientMessage::Snapshot {
            snapshot,
            user_id: user_id.to_string(),
        };
        Box::pin(async move { self.send(&msg) })
    }

    fn push_undo_marker(&self, user_id: &str) -> BoxFuture<'_, ClassroomResult<()>> {
        let msg = ClientMessage::Undo { user_id: user_id.to_string() };
        Box::pin(async move { self.send(&msg) })
    }

    fn subscribe(&self, callback: CanvasCallback) -> Subscription {
        self.subscribers.add(callback)
    }
}

impl RosterFeed for RelayGateway {
    fn subscribe_roster(&self, callback: RosterCallback) -> Subscription {
        self.roster_subscribers.add(callback)
    }
}
