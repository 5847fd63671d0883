//! Client configuration.

use crate::chat::ChatState;
use crate::error::{BannerSlot, ClassroomError, ClassroomResult, DEFAULT_BANNER_DISMISS_MS};
use crate::files::{DEFAULT_MAX_UPLOAD_BYTES, FileShelf};
use crate::presence::Collaborator;
use crate::store::DrawingStore;
use crate::sync::RelayGateway;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings a classroom client starts with. Missing JSON fields take their
/// defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket URL of the canvas relay.
    pub relay_url: String,
    pub banner_dismiss_ms: u64,
    pub max_upload_bytes: u64,
    /// Maximum undo snapshots kept. `None` keeps all of them.
    pub history_limit: Option<usize>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: "ws://localhost:3030/ws".to_string(),
            banner_dismiss_ms: DEFAULT_BANNER_DISMISS_MS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            history_limit: None,
        }
    }
}

impl ClientConfig {
    pub fn from_json(json: &str) -> ClassroomResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| ClassroomError::Validation(format!("invalid client config: {}", e)))
    }

    pub fn banner_slot(&self) -> BannerSlot {
        BannerSlot::new(Duration::from_millis(self.banner_dismiss_ms))
    }

    pub fn drawing_store(&self) -> DrawingStore {
        match self.history_limit {
            Some(limit) => DrawingStore::with_history_limit(limit),
            None => DrawingStore::new(),
        }
    }

    /// File shelf bound to the configured upload limit and banner delay.
    pub fn file_shelf(&self, classroom: &str) -> FileShelf {
        FileShelf::new(classroom)
            .with_max_upload_bytes(self.max_upload_bytes)
            .with_banner(self.banner_slot())
    }

    pub fn chat_state(&self, classroom: &str) -> ChatState {
        ChatState::new(classroom).with_banner(self.banner_slot())
    }

    /// Connect to the configured relay and join `classroom`.
    pub fn connect_relay(&self, classroom: &str, user: &Collaborator) -> ClassroomResult<RelayGateway> {
        log::info!("Connecting to relay {} for {}", self.relay_url, classroom);
        RelayGateway::connect(&self.relay_url, classroom, user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Role, UserProfile};
    use crate::backend::{MemoryBlobStore, MemoryChatBackend};
    use crate::drawing::now_millis;
    use crate::files::FileUpload;
    use pollster::block_on;

    fn student() -> UserProfile {
        UserProfile {
            uid: "s1".to_string(),
            email: "s1@school.edu".to_string(),
            display_name: String::new(),
            role: Role::Student,
        }
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ClientConfig::from_json(r#"{"history_limit": 20}"#).unwrap();
        assert_eq!(config.history_limit, Some(20));
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert_eq!(config.banner_slot().dismiss_after(), Duration::from_millis(DEFAULT_BANNER_DISMISS_MS));
    }

    #[test]
    fn test_bad_json_is_validation_error() {
        assert!(matches!(
            ClientConfig::from_json("{"),
            Err(ClassroomError::Validation(_))
        ));
    }

    #[test]
    fn test_file_shelf_uses_upload_limit() {
        let config = ClientConfig {
            max_upload_bytes: 1,
            ..ClientConfig::default()
        };
        let store = MemoryBlobStore::new();
        let mut shelf = config.file_shelf("room");

        let result = block_on(shelf.upload(&store, FileUpload::new("a.txt", "text/plain", vec![1, 2]), &student()));
        assert!(matches!(result, Err(ClassroomError::Validation(_))));
        assert!(store.is_empty());

        block_on(shelf.upload(&store, FileUpload::new("b.txt", "text/plain", vec![1]), &student())).unwrap();
        assert_eq!(shelf.files().len(), 1);
    }

    #[test]
    fn test_banner_delay_reaches_chat_and_files() {
        let config = ClientConfig {
            banner_dismiss_ms: 10,
            ..ClientConfig::default()
        };

        let backend = MemoryChatBackend::new();
        backend.set_offline(true);
        let mut chat = config.chat_state("room");
        let before = now_millis();
        assert!(block_on(chat.send(&backend, "hello", &student())).is_err());
        let raised_at = chat.banner().current(before).unwrap().raised_at;
        assert!(chat.banner().current(raised_at + 9).is_some());
        assert!(chat.banner().current(raised_at + 10).is_none());

        let store = MemoryBlobStore::new();
        store.set_offline(true);
        let mut shelf = config.file_shelf("room");
        let before = now_millis();
        assert!(block_on(shelf.upload(&store, FileUpload::new("a.txt", "text/plain", vec![1]), &student())).is_err());
        let raised_at = shelf.banner().current(before).unwrap().raised_at;
        assert!(shelf.banner().current(raised_at + 10).is_none());
        assert_eq!(shelf.banner().dismiss_after(), Duration::from_millis(10));
    }

    #[test]
    fn test_connect_relay_rejects_bad_url() {
        let config = ClientConfig {
            relay_url: "http://localhost:3030/ws".to_string(),
            ..ClientConfig::default()
        };
        assert!(matches!(
            config.connect_relay("room", &Collaborator::new("u1", "Ada")),
            Err(ClassroomError::Validation(_))
        ));
    }
}
