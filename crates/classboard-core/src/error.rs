//! Error taxonomy and user-visible banners.
//!
//! Validation failures are caught at the boundary where input enters the
//! system. Sync failures on critical paths (sending a message, uploading a
//! file, signing in, pushing drawings) are raised into a [`BannerSlot`] that
//! dismisses itself; failures on non-critical paths are logged and dropped.

use std::time::Duration;
use thiserror::Error;

/// Default time a banner stays visible.
pub const DEFAULT_BANNER_DISMISS_MS: u64 = 5_000;

/// Errors surfaced by classroom operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassroomError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Sync failed: {0}")]
    Sync(String),
    #[error("Permission denied: {0}")]
    Permission(String),
    #[error("Invalid drawing entry: {0}")]
    InvalidEntry(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Result type for classroom operations.
pub type ClassroomResult<T> = Result<T, ClassroomError>;

/// Coarse classification of a [`ClassroomError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ValidationFailure,
    SyncFailure,
    PermissionFailure,
    InvalidEntry,
    NotFound,
}

impl ClassroomError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClassroomError::Validation(_) => ErrorKind::ValidationFailure,
            ClassroomError::Sync(_) => ErrorKind::SyncFailure,
            ClassroomError::Permission(_) => ErrorKind::PermissionFailure,
            ClassroomError::InvalidEntry(_) => ErrorKind::InvalidEntry,
            ClassroomError::NotFound(_) => ErrorKind::NotFound,
        }
    }

    /// Wrap a transport/backend failure with some context.
    pub fn sync(context: &str, cause: impl std::fmt::Display) -> Self {
        ClassroomError::Sync(format!("{}: {}", context, cause))
    }
}

/// A message shown to the user until it expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    pub message: String,
    /// Milliseconds since the Unix epoch when the banner was raised.
    pub raised_at: i64,
}

impl Banner {
    /// Whether the banner has outlived `dismiss_after` at time `now`.
    pub fn is_expired(&self, now: i64, dismiss_after: Duration) -> bool {
        now.saturating_sub(self.raised_at) >= dismiss_after.as_millis() as i64
    }
}

/// Holds at most one visible banner; a newer one replaces the older.
#[derive(Debug, Clone)]
pub struct BannerSlot {
    banner: Option<Banner>,
    dismiss_after: Duration,
}

impl Default for BannerSlot {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_BANNER_DISMISS_MS))
    }
}

impl BannerSlot {
    pub fn new(dismiss_after: Duration) -> Self {
        Self {
            banner: None,
            dismiss_after,
        }
    }

    /// Raise a banner for an error.
    pub fn raise(&mut self, error: &ClassroomError, now: i64) {
        log::warn!("Raising banner: {}", error);
        self.banner = Some(Banner {
            message: error.to_string(),
            raised_at: now,
        });
    }

    /// The banner visible at `now`, if it has not yet self-dismissed.
    pub fn current(&self, now: i64) -> Option<&Banner> {
        self.banner
            .as_ref()
            .filter(|banner| !banner.is_expired(now, self.dismiss_after))
    }

    pub fn dismiss(&mut self) {
        self.banner = None;
    }

    pub fn dismiss_after(&self) -> Duration {
        self.dismiss_after
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            ClassroomError::Validation("x".into()).kind(),
            ErrorKind::ValidationFailure
        );
        assert_eq!(ClassroomError::sync("push", "offline").kind(), ErrorKind::SyncFailure);
        assert_eq!(
            ClassroomError::Permission("x".into()).kind(),
            ErrorKind::PermissionFailure
        );
    }

    #[test]
    fn test_banner_self_dismisses_after_five_seconds() {
        let mut slot = BannerSlot::default();
        slot.raise(&ClassroomError::Sync("offline".into()), 1_000);

        assert!(slot.current(1_000).is_some());
        assert!(slot.current(5_999).is_some());
        assert!(slot.current(6_000).is_none());
    }

    #[test]
    fn test_newer_banner_replaces_older() {
        let mut slot = BannerSlot::default();
        slot.raise(&ClassroomError::Sync("first".into()), 0);
        slot.raise(&ClassroomError::Sync("second".into()), 10);

        let banner = slot.current(10).unwrap();
        assert!(banner.message.contains("second"));

        slot.dismiss();
        assert!(slot.current(10).is_none());
    }
}
