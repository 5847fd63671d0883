//! JSON messages exchanged with the canvas relay server.

use super::CanvasUpdate;
use crate::canvas::RasterSnapshot;
use crate::drawing::DrawingEntry;
use crate::presence::Collaborator;
use serde::{Deserialize, Serialize};

/// Messages sent to the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Attach to a classroom's canvas
    Join {
        classroom: String,
        user_id: String,
        user_name: String,
    },
    /// Detach from the current classroom
    Leave,
    /// Append a drawing entry
    PushDrawing { entry: DrawingEntry },
    /// Clear the canvas
    Clear { user_id: String },
    /// Store a rendered raster
    Snapshot {
        snapshot: RasterSnapshot,
        user_id: String,
    },
    /// A user undid a local action
    Undo { user_id: String },
}

/// Messages received from the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Join confirmed, with the current canvas
    Joined {
        classroom: String,
        peer_count: usize,
        canvas: CanvasUpdate,
    },
    /// The canvas changed; carries the full drawing list
    Canvas(CanvasUpdate),
    /// Current set of attached participants
    Roster { collaborators: Vec<Collaborator> },
    /// Error message
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drawing::test_entry;

    #[test]
    fn test_client_message_serialize() {
        let msg = ClientMessage::PushDrawing {
            entry: test_entry("draw_1_a", "u1"),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"push_drawing""#));
        assert!(json.contains("draw_1_a"));
    }

    #[test]
    fn test_server_canvas_deserialize() {
        let json = r#"{"type":"canvas","drawings":[],"lastModifiedBy":"u2","lastModifiedAtMillis":5,"version":3}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        match msg {
            ServerMessage::Canvas(update) => {
                assert_eq!(update.last_modified_by, "u2");
                assert_eq!(update.version, 3);
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_roster_deserialize() {
        let json = r#"{"type":"roster","collaborators":[{"userId":"u1","userName":"Ada"}]}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, ServerMessage::Roster { collaborators } if collaborators.len() == 1));
    }
}
