//! Classroom chat: messages, filters, typing indicators and unread count.

use crate::auth::UserProfile;
use crate::backend::BoxFuture;
use crate::drawing::now_millis;
use crate::error::{BannerSlot, ClassroomError, ClassroomResult};
use crate::files::FileMetadata;
use crate::participation::{EngagementKind, ParticipationReporter};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How long a typing indicator stays visible.
pub const TYPING_TIMEOUT_MS: i64 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    File,
    System,
}

/// A message as stored by the chat backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub text: String,
    pub user_id: String,
    pub user_name: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub timestamp: i64,
    #[serde(default)]
    pub edited: bool,
    /// Emoji to the ids of users who reacted with it.
    #[serde(default)]
    pub reactions: BTreeMap<String, Vec<String>>,
    #[serde(default, rename = "fileData", skip_serializing_if = "Option::is_none")]
    pub file: Option<FileMetadata>,
}

impl ChatMessage {
    pub fn is_question(&self) -> bool {
        is_question(&self.text)
    }
}

/// A message ready to hand to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDraft {
    pub text: String,
    pub user_id: String,
    pub user_name: String,
    pub display_name: String,
    pub kind: MessageKind,
    pub file: Option<FileMetadata>,
}

impl MessageDraft {
    /// Build the stored form with the id and time the backend assigned.
    pub fn into_message(self, id: String, timestamp: i64) -> ChatMessage {
        ChatMessage {
            id,
            text: self.text,
            user_id: self.user_id,
            user_name: self.user_name,
            display_name: self.display_name,
            kind: self.kind,
            timestamp,
            edited: false,
            reactions: BTreeMap::new(),
            file: self.file,
        }
    }
}

/// Trim `text` and attribute it to `user`. Empty text is rejected.
pub fn compose(text: &str, user: &UserProfile, kind: MessageKind) -> ClassroomResult<MessageDraft> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ClassroomError::Validation("message is empty".to_string()));
    }
    Ok(MessageDraft {
        text: text.to_string(),
        user_id: user.uid.clone(),
        user_name: user.user_name(),
        display_name: user.name_for_display(),
        kind,
        file: None,
    })
}

/// Draft announcing a shared file.
pub fn compose_file_share(file: FileMetadata, user: &UserProfile) -> MessageDraft {
    MessageDraft {
        text: format!("Shared file: {}", file.name),
        user_id: user.uid.clone(),
        user_name: user.user_name(),
        display_name: user.name_for_display(),
        kind: MessageKind::File,
        file: Some(file),
    }
}

pub fn is_question(text: &str) -> bool {
    text.contains('?') || text.to_lowercase().contains("question")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageFilter {
    #[default]
    All,
    Questions,
    Files,
}

impl MessageFilter {
    pub fn matches(self, message: &ChatMessage) -> bool {
        match self {
            Self::All => true,
            Self::Questions => message.is_question(),
            Self::Files => message.kind == MessageKind::File,
        }
    }

    pub fn apply(self, messages: &[ChatMessage]) -> Vec<&ChatMessage> {
        messages.iter().filter(|m| self.matches(m)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingUser {
    pub user_id: String,
    pub user_name: String,
    pub timestamp: i64,
}

/// Other users who typed within the last five seconds.
pub fn visible_typers(all: Vec<TypingUser>, self_id: &str, now: i64) -> Vec<TypingUser> {
    all.into_iter()
        .filter(|u| u.user_id != self_id)
        .filter(|u| now - u.timestamp < TYPING_TIMEOUT_MS)
        .collect()
}

/// Chat backend contract.
pub trait ChatBackend: Send + Sync {
    fn send(&self, classroom: &str, draft: MessageDraft) -> BoxFuture<'_, ClassroomResult<ChatMessage>>;

    fn share_file(&self, classroom: &str, draft: MessageDraft) -> BoxFuture<'_, ClassroomResult<ChatMessage>>;

    /// Mark `user_id` as typing, or clear the mark.
    fn set_typing(
        &self,
        classroom: &str,
        user_id: &str,
        user_name: &str,
        typing: bool,
    ) -> BoxFuture<'_, ClassroomResult<()>>;

    /// All messages, oldest first.
    fn messages(&self, classroom: &str) -> BoxFuture<'_, ClassroomResult<Vec<ChatMessage>>>;

    fn typing(&self, classroom: &str) -> BoxFuture<'_, ClassroomResult<Vec<TypingUser>>>;
}

/// Chat view state for one classroom.
pub struct ChatState {
    classroom: String,
    messages: Vec<ChatMessage>,
    filter: MessageFilter,
    typing: Vec<TypingUser>,
    unread: usize,
    banner: BannerSlot,
    reporter: Option<ParticipationReporter>,
    side_effects: Vec<BoxFuture<'static, ()>>,
}

impl ChatState {
    pub fn new(classroom: &str) -> Self {
        Self {
            classroom: classroom.to_string(),
            messages: Vec::new(),
            filter: MessageFilter::All,
            typing: Vec::new(),
            unread: 0,
            banner: BannerSlot::default(),
            reporter: None,
            side_effects: Vec::new(),
        }
    }

    /// Use a banner slot with a custom dismiss delay.
    pub fn with_banner(mut self, banner: BannerSlot) -> Self {
        self.banner = banner;
        self
    }

    pub fn with_reporter(mut self, reporter: ParticipationReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn filtered(&self) -> Vec<&ChatMessage> {
        self.filter.apply(&self.messages)
    }

    pub fn filter(&self) -> MessageFilter {
        self.filter
    }

    pub fn set_filter(&mut self, filter: MessageFilter) {
        self.filter = filter;
    }

    pub fn typing_users(&self) -> &[TypingUser] {
        &self.typing
    }

    pub fn unread_count(&self) -> usize {
        self.unread
    }

    pub fn mark_as_read(&mut self) {
        self.unread = 0;
    }

    pub fn banner(&self) -> &BannerSlot {
        &self.banner
    }

    pub fn take_side_effects(&mut self) -> Vec<BoxFuture<'static, ()>> {
        std::mem::take(&mut self.side_effects)
    }

    /// Replace the message list with the backend's. New arrivals count as unread.
    pub fn set_messages(&mut self, messages: Vec<ChatMessage>) {
        let arrived = messages
            .iter()
            .filter(|m| !self.messages.iter().any(|known| known.id == m.id))
            .count();
        self.unread += arrived;
        self.messages = messages;
    }

    /// Pull messages and typing users from the backend.
    pub async fn refresh<B: ChatBackend + ?Sized>(&mut self, backend: &B, self_id: &str) -> ClassroomResult<()> {
        let messages = backend.messages(&self.classroom).await?;
        self.set_messages(messages);
        match backend.typing(&self.classroom).await {
            Ok(all) => self.typing = visible_typers(all, self_id, now_millis()),
            Err(e) => log::warn!("Failed to fetch typing users: {}", e),
        }
        Ok(())
    }

    pub async fn send<B: ChatBackend + ?Sized>(
        &mut self,
        backend: &B,
        text: &str,
        user: &UserProfile,
    ) -> ClassroomResult<()> {
        let draft = compose(text, user, MessageKind::Text)?;
        let kind = if is_question(&draft.text) {
            EngagementKind::Question
        } else {
            EngagementKind::Message
        };
        match backend.send(&self.classroom, draft).await {
            Ok(message) => {
                log::debug!("Sent message {}", message.id);
                if let Some(reporter) = &self.reporter {
                    self.side_effects.push(reporter.fire(kind));
                }
                Ok(())
            }
            Err(e) => {
                self.banner.raise(&e, now_millis());
                Err(e)
            }
        }
    }

    pub async fn share_file<B: ChatBackend + ?Sized>(
        &mut self,
        backend: &B,
        file: FileMetadata,
        user: &UserProfile,
    ) -> ClassroomResult<()> {
        let draft = compose_file_share(file, user);
        if let Err(e) = backend.share_file(&self.classroom, draft).await {
            self.banner.raise(&e, now_millis());
            return Err(e);
        }
        Ok(())
    }

    /// Best effort; failures are logged only.
    pub async fn set_typing<B: ChatBackend + ?Sized>(&self, backend: &B, user: &UserProfile, typing: bool) {
        if let Err(e) = backend
            .set_typing(&self.classroom, &user.uid, &user.name_for_display(), typing)
            .await
        {
            log::warn!("Failed to update typing status: {}", e);
        }
    }
}
