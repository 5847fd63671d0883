//! Presence: who is attached to a classroom, and the status each participant
//! shows in the video grid.
//!
//! Staleness is the roster feed's concern. Nothing here expires entries.
//! Video-grid status is shared through a [`ParticipantFeed`], which keeps a
//! participant's record after they leave and only reports active ones.

use crate::backend::BoxFuture;
use crate::error::ClassroomResult;
use crate::sync::Subscription;
use serde::{Deserialize, Serialize};

/// A user currently viewing or editing the board.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collaborator {
    pub user_id: String,
    pub user_name: String,
}

impl Collaborator {
    pub fn new(user_id: &str, user_name: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
        }
    }
}

/// Set of collaborators, unique by user id, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct CollaboratorTracker {
    collaborators: Vec<Collaborator>,
}

impl CollaboratorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a collaborator unless one with the same user id is present.
    /// Returns whether it was added.
    pub fn add(&mut self, collaborator: Collaborator) -> bool {
        if self.contains(&collaborator.user_id) {
            return false;
        }
        self.collaborators.push(collaborator);
        true
    }

    /// Remove the collaborator with `user_id`. Returns whether one was removed.
    pub fn remove(&mut self, user_id: &str) -> bool {
        let before = self.collaborators.len();
        self.collaborators.retain(|c| c.user_id != user_id);
        before != self.collaborators.len()
    }

    /// Replace the whole set with a roster snapshot, dropping duplicates.
    pub fn set_all(&mut self, roster: &[Collaborator]) {
        self.collaborators.clear();
        for collaborator in roster {
            self.add(collaborator.clone());
        }
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.collaborators.iter().any(|c| c.user_id == user_id)
    }

    pub fn len(&self) -> usize {
        self.collaborators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collaborators.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Collaborator> {
        self.collaborators.iter()
    }
}

/// What a participant shows in the video grid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantStatus {
    pub user_id: String,
    pub user_name: String,
    pub is_muted: bool,
    pub has_video: bool,
    pub is_screen_sharing: bool,
    pub has_raised_hand: bool,
    pub hand_raised_at: Option<i64>,
    pub is_speaking: bool,
    pub is_active: bool,
    pub last_active: Option<i64>,
}

/// A change a participant makes to their own status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StatusChange {
    Mute(bool),
    Video(bool),
    ScreenShare(bool),
    RaiseHand(bool),
    Speaking(bool),
    Active(bool),
}

impl ParticipantStatus {
    pub fn new(user_id: &str, user_name: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            is_muted: true,
            is_active: true,
            ..Self::default()
        }
    }

    /// Apply a change made at `now`.
    pub fn apply(&mut self, change: StatusChange, now: i64) {
        match change {
            StatusChange::Mute(muted) => {
                self.is_muted = muted;
                self.is_speaking = false;
            }
            StatusChange::Video(on) => self.has_video = on,
            StatusChange::ScreenShare(on) => self.is_screen_sharing = on,
            StatusChange::RaiseHand(raised) => {
                self.has_raised_hand = raised;
                self.hand_raised_at = raised.then_some(now);
            }
            StatusChange::Speaking(speaking) => {
                // A muted participant cannot be speaking.
                self.is_speaking = speaking && !self.is_muted;
            }
            StatusChange::Active(active) => self.is_active = active,
        }
        self.last_active = Some(now);
    }

    pub fn collaborator(&self) -> Collaborator {
        Collaborator::new(&self.user_id, &self.user_name)
    }
}

/// Participants currently marked active.
pub fn active_participants(all: &[ParticipantStatus]) -> Vec<&ParticipantStatus> {
    all.iter().filter(|p| p.is_active).collect()
}

/// Raised hands, earliest first.
pub fn raised_hands(all: &[ParticipantStatus]) -> Vec<&ParticipantStatus> {
    let mut hands: Vec<_> = all.iter().filter(|p| p.is_active && p.has_raised_hand).collect();
    hands.sort_by_key(|p| p.hand_raised_at.unwrap_or(i64::MAX));
    hands
}

/// Up to two uppercase initials from the words of `name`, or "??" when empty.
pub fn participant_initials(name: &str) -> String {
    let initials: String = name
        .split(' ')
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_uppercase)
        .take(2)
        .collect();
    if initials.is_empty() {
        "??".to_string()
    } else {
        initials
    }
}

/// Tile colour of a participant in the video grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusColor {
    Speaking,
    RaisedHand,
    Muted,
    Idle,
}

impl StatusColor {
    /// Speaking wins over a raised hand, which wins over muted.
    pub fn of(status: &ParticipantStatus) -> Self {
        if status.is_speaking {
            Self::Speaking
        } else if status.has_raised_hand {
            Self::RaisedHand
        } else if status.is_muted {
            Self::Muted
        } else {
            Self::Idle
        }
    }

    /// Utility class used by the web front end.
    pub fn class_name(self) -> &'static str {
        match self {
            Self::Speaking => "bg-green-500",
            Self::RaisedHand => "bg-yellow-500",
            Self::Muted => "bg-red-500",
            Self::Idle => "bg-gray-500",
        }
    }
}

/// Callback invoked with the active participants of a classroom.
pub type ParticipantCallback = Box<dyn Fn(&[ParticipantStatus]) + Send + Sync>;

/// Shared video-grid status of every participant in a classroom.
pub trait ParticipantFeed: Send + Sync {
    /// Mark a participant active with a fresh, muted status.
    fn join(&self, classroom: &str, user_id: &str, user_name: &str) -> BoxFuture<'_, ClassroomResult<()>>;

    /// Mark a participant inactive. Their record is kept.
    fn leave(&self, classroom: &str, user_id: &str) -> BoxFuture<'_, ClassroomResult<()>>;

    /// Apply a change to a joined participant and return the new status.
    fn update(
        &self,
        classroom: &str,
        user_id: &str,
        change: StatusChange,
    ) -> BoxFuture<'_, ClassroomResult<ParticipantStatus>>;

    /// Receive the active participants now and after every change.
    fn subscribe_participants(&self, classroom: &str, callback: ParticipantCallback) -> Subscription;
}
