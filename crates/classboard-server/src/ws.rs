//! WebSocket connection loop.
//!
//! Every canvas change is sent back to all peers in the classroom, the
//! originator included, as the full drawing list.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use classboard_core::presence::Collaborator;
use classboard_core::sync::{ClientMessage, ServerMessage};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Per-connection state
struct Connection {
    conn_id: String,
    classroom: Option<String>,
    rx: Option<broadcast::Receiver<ServerMessage>>,
}

impl Connection {
    fn classroom(&self) -> Result<&str, AppError> {
        self.classroom.as_deref().ok_or(AppError::NotJoined)
    }

    fn leave(&mut self, state: &AppState) {
        if let Some(classroom) = self.classroom.take() {
            state.leave(&classroom, &self.conn_id);
            info!("Connection {} left classroom {}", self.conn_id, classroom);
        }
        self.rx = None;
    }
}

async fn send(sender: &mut SplitSink<WebSocket, Message>, msg: &ServerMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!("Failed to encode server message: {}", e);
            true
        }
    }
}

/// Apply one client message. Returns a reply for the sender, if any.
fn dispatch(state: &AppState, conn: &mut Connection, msg: ClientMessage) -> Result<Option<ServerMessage>, AppError> {
    match msg {
        ClientMessage::Join {
            classroom,
            user_id,
            user_name,
        } => {
            conn.leave(state);
            let joined = state.join(&classroom, &conn.conn_id, Collaborator::new(&user_id, &user_name));
            info!("Connection {} ({}) joined classroom {}", conn.conn_id, user_id, classroom);
            conn.rx = Some(joined.rx);
            conn.classroom = Some(classroom.clone());
            Ok(Some(ServerMessage::Joined {
                classroom,
                peer_count: joined.peer_count,
                canvas: joined.canvas,
            }))
        }
        ClientMessage::Leave => {
            conn.leave(state);
            Ok(None)
        }
        ClientMessage::PushDrawing { entry } => {
            debug!("Drawing {} from {}", entry.id, entry.author_id);
            state.push_drawing(conn.classroom()?, entry)?;
            Ok(None)
        }
        ClientMessage::Clear { user_id } => {
            state.clear(conn.classroom()?, &user_id)?;
            Ok(None)
        }
        ClientMessage::Snapshot { snapshot, user_id } => {
            state.snapshot(conn.classroom()?, snapshot, &user_id)?;
            Ok(None)
        }
        ClientMessage::Undo { user_id } => {
            state.undo(conn.classroom()?, &user_id)?;
            Ok(None)
        }
    }
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let mut conn = Connection {
        conn_id: Uuid::new_v4().to_string(),
        classroom: None,
        rx: None,
    };
    info!("New connection: {}", conn.conn_id);

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = serde_json::from_str::<ClientMessage>(&text)
                            .map_err(AppError::from)
                            .and_then(|client_msg| dispatch(&state, &mut conn, client_msg));
                        let reply = match reply {
                            Ok(reply) => reply,
                            Err(e) => {
                                warn!("Rejected message from {}: {}", conn.conn_id, e);
                                Some(ServerMessage::Error { message: e.to_string() })
                            }
                        };
                        if let Some(reply) = reply {
                            if !send(&mut sender, &reply).await {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // Ignore binary and ping/pong
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", conn.conn_id, e);
                        break;
                    }
                }
            }

            msg = async {
                match &mut conn.rx {
                    Some(rx) => rx.recv().await,
                    None => std::future::pending().await,
                }
            } => {
                match msg {
                    Ok(server_msg) => {
                        if !send(&mut sender, &server_msg).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        // Each canvas message carries the full list, so the next one catches up.
                        warn!("Connection {} lagged by {} messages", conn.conn_id, skipped);
                    }
                    Err(RecvError::Closed) => conn.rx = None,
                }
            }
        }
    }

    conn.leave(&state);
    info!("Connection closed: {}", conn.conn_id);
}
