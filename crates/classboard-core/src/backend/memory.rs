//! In-memory collaborators for tests and offline use.

use super::BoxFuture;
use crate::auth::{IdentityProvider, Role, UserProfile};
use crate::chat::{ChatBackend, ChatMessage, MessageDraft, TypingUser};
use crate::drawing::now_millis;
use crate::error::{ClassroomError, ClassroomResult};
use crate::files::BlobStore;
use crate::participation::{EngagementKind, ParticipationRecord, ParticipationService};
use crate::presence::{ParticipantCallback, ParticipantFeed, ParticipantStatus, StatusChange};
use crate::sync::{Subscribers, Subscription};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

fn lock_error(e: impl std::fmt::Display) -> ClassroomError {
    ClassroomError::sync("Lock error", e)
}

fn check_online(offline: &AtomicBool) -> ClassroomResult<()> {
    if offline.load(Ordering::SeqCst) {
        return Err(ClassroomError::Sync("backend unreachable".to_string()));
    }
    Ok(())
}

/// Blob storage keyed by path.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    offline: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.blobs.read().ok()?.get(path).cloned()
    }
}

impl BlobStore for MemoryBlobStore {
    fn upload(&self, path: &str, bytes: Vec<u8>, _mime_type: &str) -> BoxFuture<'_, ClassroomResult<String>> {
        let path = path.to_string();
        Box::pin(async move {
            check_online(&self.offline)?;
            let mut blobs = self.blobs.write().map_err(lock_error)?;
            blobs.insert(path.clone(), bytes);
            Ok(format!("mem://{}", path))
        })
    }

    fn delete(&self, path: &str) -> BoxFuture<'_, ClassroomResult<()>> {
        let path = path.to_string();
        Box::pin(async move {
            check_online(&self.offline)?;
            let mut blobs = self.blobs.write().map_err(lock_error)?;
            blobs
                .remove(&path)
                .map(|_| ())
                .ok_or_else(|| ClassroomError::NotFound(path))
        })
    }
}

#[derive(Default)]
struct ChatRoom {
    messages: Vec<ChatMessage>,
    typing: HashMap<String, TypingUser>,
}

/// Chat collections per classroom.
#[derive(Default)]
pub struct MemoryChatBackend {
    rooms: RwLock<HashMap<String, ChatRoom>>,
    offline: AtomicBool,
}

impl MemoryChatBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn post(&self, classroom: String, draft: MessageDraft) -> BoxFuture<'_, ClassroomResult<ChatMessage>> {
        Box::pin(async move {
            check_online(&self.offline)?;
            let mut rooms = self.rooms.write().map_err(lock_error)?;
            let message = draft.into_message(Uuid::new_v4().to_string(), now_millis());
            rooms.entry(classroom).or_default().messages.push(message.clone());
            Ok(message)
        })
    }
}

impl ChatBackend for MemoryChatBackend {
    fn send(&self, classroom: &str, draft: MessageDraft) -> BoxFuture<'_, ClassroomResult<ChatMessage>> {
        self.post(classroom.to_string(), draft)
    }

    fn share_file(&self, classroom: &str, draft: MessageDraft) -> BoxFuture<'_, ClassroomResult<ChatMessage>> {
        self.post(classroom.to_string(), draft)
    }

    fn set_typing(
        &self,
        classroom: &str,
        user_id: &str,
        user_name: &str,
        typing: bool,
    ) -> BoxFuture<'_, ClassroomResult<()>> {
        let classroom = classroom.to_string();
        let user = TypingUser {
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            timestamp: now_millis(),
        };
        Box::pin(async move {
            check_online(&self.offline)?;
            let mut rooms = self.rooms.write().map_err(lock_error)?;
            let room = rooms.entry(classroom).or_default();
            if typing {
                room.typing.insert(user.user_id.clone(), user);
            } else {
                room.typing.remove(&user.user_id);
            }
            Ok(())
        })
    }

    fn messages(&self, classroom: &str) -> BoxFuture<'_, ClassroomResult<Vec<ChatMessage>>> {
        let classroom = classroom.to_string();
        Box::pin(async move {
            check_online(&self.offline)?;
            let rooms = self.rooms.read().map_err(lock_error)?;
            let mut messages = rooms
                .get(&classroom)
                .map(|room| room.messages.clone())
                .unwrap_or_default();
            messages.sort_by_key(|m| m.timestamp);
            Ok(messages)
        })
    }

    fn typing(&self, classroom: &str) -> BoxFuture<'_, ClassroomResult<Vec<TypingUser>>> {
        let classroom = classroom.to_string();
        Box::pin(async move {
            check_online(&self.offline)?;
            let rooms = self.rooms.read().map_err(lock_error)?;
            Ok(rooms
                .get(&classroom)
                .map(|room| room.typing.values().cloned().collect())
                .unwrap_or_default())
        })
    }
}

struct Account {
    password: String,
    profile: UserProfile,
}

/// Email/password accounts plus a single canned Google account.
pub struct MemoryIdentityProvider {
    accounts: RwLock<HashMap<String, Account>>,
    google: UserProfile,
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            google: UserProfile {
                uid: "google-user".to_string(),
                email: "student@gmail.com".to_string(),
                display_name: "Google Student".to_string(),
                role: Role::Student,
            },
        }
    }
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `profile` for Google sign-in.
    pub fn with_google_account(mut self, profile: UserProfile) -> Self {
        self.google = profile;
        self
    }
}

impl IdentityProvider for MemoryIdentityProvider {
    fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
        role: Role,
    ) -> BoxFuture<'_, ClassroomResult<UserProfile>> {
        let email = email.trim().to_lowercase();
        let password = password.to_string();
        let display_name = display_name.to_string();
        Box::pin(async move {
            let mut accounts = self.accounts.write().map_err(lock_error)?;
            if accounts.contains_key(&email) {
                return Err(ClassroomError::Validation(format!("{} is already registered", email)));
            }
            let profile = UserProfile {
                uid: Uuid::new_v4().to_string(),
                email: email.clone(),
                display_name,
                role,
            };
            accounts.insert(
                email,
                Account {
                    password,
                    profile: profile.clone(),
                },
            );
            Ok(profile)
        })
    }

    fn sign_in(&self, email: &str, password: &str) -> BoxFuture<'_, ClassroomResult<UserProfile>> {
        let email = email.trim().to_lowercase();
        let password = password.to_string();
        Box::pin(async move {
            let accounts = self.accounts.read().map_err(lock_error)?;
            match accounts.get(&email) {
                Some(account) if account.password == password => Ok(account.profile.clone()),
                _ => Err(ClassroomError::Sync("invalid email or password".to_string())),
            }
        })
    }

    fn sign_in_with_google(&self) -> BoxFuture<'_, ClassroomResult<UserProfile>> {
        Box::pin(async move {
            let mut accounts = self.accounts.write().map_err(lock_error)?;
            let account = accounts
                .entry(self.google.email.clone())
                .or_insert_with(|| Account {
                    password: String::new(),
                    profile: self.google.clone(),
                });
            Ok(account.profile.clone())
        })
    }

    fn sign_out(&self) -> BoxFuture<'_, ClassroomResult<()>> {
        Box::pin(async move { Ok(()) })
    }
}

/// Participation records per classroom.
#[derive(Default)]
pub struct MemoryParticipation {
    classrooms: RwLock<HashMap<String, HashMap<String, ParticipationRecord>>>,
    offline: AtomicBool,
}

impl MemoryParticipation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

impl ParticipationService for MemoryParticipation {
    fn track(
        &self,
        classroom: &str,
        user_id: &str,
        kind: EngagementKind,
        at: i64,
    ) -> BoxFuture<'_, ClassroomResult<()>> {
        let classroom = classroom.to_string();
        let user_id = user_id.to_string();
        Box::pin(async move {
            check_online(&self.offline)?;
            let mut classrooms = self.classrooms.write().map_err(lock_error)?;
            classrooms
                .entry(classroom)
                .or_default()
                .entry(user_id.clone())
                .or_insert_with(|| ParticipationRecord::new(&user_id))
                .record(kind, at);
            Ok(())
        })
    }

    fn records(&self, classroom: &str) -> BoxFuture<'_, ClassroomResult<Vec<ParticipationRecord>>> {
        let classroom = classroom.to_string();
        Box::pin(async move {
            let classrooms = self.classrooms.read().map_err(lock_error)?;
            let mut records: Vec<_> = classrooms
                .get(&classroom)
                .map(|users| users.values().cloned().collect())
                .unwrap_or_default();
            records.sort_by(|a: &ParticipationRecord, b| a.user_id.cmp(&b.user_id));
            Ok(records)
        })
    }
}

type ParticipantSubscribers = Subscribers<dyn Fn(&[ParticipantStatus]) + Send + Sync>;

/// Video-grid status per classroom, with live subscriptions.
#[derive(Default)]
pub struct MemoryParticipantFeed {
    classrooms: RwLock<HashMap<String, BTreeMap<String, ParticipantStatus>>>,
    subscribers: RwLock<HashMap<String, Arc<ParticipantSubscribers>>>,
    offline: AtomicBool,
}

impl MemoryParticipantFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn active(&self, classroom: &str) -> Vec<ParticipantStatus> {
        self.classrooms
            .read()
            .map(|classrooms| {
                classrooms
                    .get(classroom)
                    .map(|users| users.values().filter(|p| p.is_active).cloned().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    fn subscribers(&self, classroom: &str) -> Option<Arc<ParticipantSubscribers>> {
        let mut subscribers = self.subscribers.write().ok()?;
        Some(subscribers.entry(classroom.to_string()).or_default().clone())
    }

    fn broadcast(&self, classroom: &str) {
        let participants = self.active(classroom);
        let subscribers = self
            .subscribers
            .read()
            .ok()
            .and_then(|subscribers| subscribers.get(classroom).cloned());
        if let Some(subscribers) = subscribers {
            subscribers.for_each(|callback| callback(&participants));
        }
    }

    fn modify(
        &self,
        classroom: &str,
        user_id: &str,
        f: impl FnOnce(&mut ParticipantStatus, i64),
    ) -> ClassroomResult<ParticipantStatus> {
        check_online(&self.offline)?;
        let status = {
            let mut classrooms = self.classrooms.write().map_err(lock_error)?;
            let status = classrooms
                .get_mut(classroom)
                .and_then(|users| users.get_mut(user_id))
                .ok_or_else(|| ClassroomError::NotFound(format!("participant {}", user_id)))?;
            f(status, now_millis());
            status.clone()
        };
        self.broadcast(classroom);
        Ok(status)
    }
}

impl ParticipantFeed for MemoryParticipantFeed {
    fn join(&self, classroom: &str, user_id: &str, user_name: &str) -> BoxFuture<'_, ClassroomResult<()>> {
        let classroom = classroom.to_string();
        let mut status = ParticipantStatus::new(user_id, user_name);
        Box::pin(async move {
            check_online(&self.offline)?;
            status.last_active = Some(now_millis());
            {
                let mut classrooms = self.classrooms.write().map_err(lock_error)?;
                classrooms
                    .entry(classroom.clone())
                    .or_default()
                    .insert(status.user_id.clone(), status);
            }
            self.broadcast(&classroom);
            Ok(())
        })
    }

    fn leave(&self, classroom: &str, user_id: &str) -> BoxFuture<'_, ClassroomResult<()>> {
        let classroom = classroom.to_string();
        let user_id = user_id.to_string();
        Box::pin(async move {
            self.modify(&classroom, &user_id, |status, now| {
                status.apply(StatusChange::Active(false), now);
            })?;
            Ok(())
        })
    }

    fn update(
        &self,
        classroom: &str,
        user_id: &str,
        change: StatusChange,
    ) -> BoxFuture<'_, ClassroomResult<ParticipantStatus>> {
        let classroom = classroom.to_string();
        let user_id = user_id.to_string();
        Box::pin(async move {
            self.modify(&classroom, &user_id, |status, now| status.apply(change, now))
        })
    }

    fn subscribe_participants(&self, classroom: &str, callback: ParticipantCallback) -> Subscription {
        callback(&self.active(classroom));
        match self.subscribers(classroom) {
            Some(subscribers) => subscribers.add(callback),
            None => {
                log::error!("Participant subscriber table poisoned");
                let orphan = ParticipantSubscribers::default();
                let subscription = orphan.add(callback);
                subscription.cancel();
                subscription
            }
        }
    }
}
