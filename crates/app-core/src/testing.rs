//! In-memory fakes for tests
//!
//! Deterministic implementations of the storage and identity seams so state
//! and integration tests run without a backend. Not gated on `cfg(test)` so
//! downstream crates can use them in their own tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use backend_client::auth::{AuthError, AuthEvent, IdentityProvider, Session};
use backend_client::realtime::{MessageRow, RealtimeHub};

use crate::conversation::ConversationKey;
use crate::message::{Message, MessageError, NewMessage};
use crate::profile::{Profile, ProfileError, ProfileStore};
use crate::repository::MessageRepository;

/// In-memory message repository.
///
/// Assigns ids and timestamps on insert. When given a [`RealtimeHub`] it also
/// publishes every inserted row, mimicking a backend whose change feed echoes
/// writes back to the author.
#[derive(Default)]
pub struct MemoryMessageRepository {
    rows: Mutex<Vec<MessageRow>>,
    next_id: AtomicU64,
    hub: Option<RealtimeHub>,
    fail_history: Mutex<bool>,
}

impl MemoryMessageRepository {
    /// Empty repository with no change-feed loopback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository that publishes inserts to `hub`.
    pub fn with_hub(hub: RealtimeHub) -> Self {
        Self {
            hub: Some(hub),
            ..Self::default()
        }
    }

    /// Make subsequent `history` calls fail.
    pub fn fail_history(&self, fail: bool) {
        *self.fail_history.lock() = fail;
    }

    /// Seed a row directly, bypassing id assignment.
    pub fn seed(&self, row: MessageRow) {
        self.rows.lock().push(row);
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    /// Whether the repository is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }
}

#[async_trait]
impl MessageRepository for MemoryMessageRepository {
    async fn insert(&self, message: &NewMessage) -> crate::message::Result<()> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let row = MessageRow {
            id: format!("mem-{id}"),
            sender: message.sender.clone(),
            channel_name: message.channel_name.as_str().to_string(),
            content: message.content.clone(),
            caption: message.caption.clone(),
            kind: message.kind.as_str().to_string(),
            created_at: Utc::now(),
        };
        self.rows.lock().push(row.clone());
        if let Some(hub) = &self.hub {
            hub.publish(row);
        }
        Ok(())
    }

    async fn history(&self, key: &ConversationKey) -> crate::message::Result<Vec<Message>> {
        if *self.fail_history.lock() {
            return Err(MessageError::Backend("history unavailable".to_string()));
        }
        let mut messages: Vec<Message> = self
            .rows
            .lock()
            .iter()
            .filter(|row| row.channel_name == key.as_str())
            .cloned()
            .filter_map(|row| Message::from_row(row).ok())
            .collect();
        messages.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        Ok(messages)
    }
}

/// In-memory profile store.
#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: Mutex<Vec<Profile>>,
}

impl MemoryProfileStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with one profile.
    pub fn with_profile(id: &str, username: &str) -> Self {
        let store = Self::default();
        store.profiles.lock().push(Profile {
            id: id.to_string(),
            username: username.to_string(),
        });
        store
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn find(&self, user_id: &str) -> crate::profile::Result<Option<Profile>> {
        Ok(self
            .profiles
            .lock()
            .iter()
            .find(|p| p.id == user_id)
            .cloned())
    }

    async fn set_username(&self, user_id: &str, username: &str) -> crate::profile::Result<Profile> {
        crate::profile::validate_username(username)?;
        let mut profiles = self.profiles.lock();
        if profiles.iter().any(|p| p.username == username && p.id != user_id) {
            return Err(ProfileError::UsernameTaken);
        }
        let profile = Profile {
            id: user_id.to_string(),
            username: username.to_string(),
        };
        if let Some(existing) = profiles.iter_mut().find(|p| p.id == user_id) {
            *existing = profile.clone();
        } else {
            profiles.push(profile.clone());
        }
        Ok(profile)
    }

    async fn username_taken(&self, username: &str) -> crate::profile::Result<bool> {
        Ok(self.profiles.lock().iter().any(|p| p.username == username))
    }
}

/// Identity provider with fixed credentials.
///
/// Accepts one email/password pair, tracks the active session, and broadcasts
/// [`AuthEvent`]s like the real client.
pub struct StaticIdentity {
    email: String,
    password: String,
    user_id: String,
    session: Mutex<Option<Session>>,
    events: broadcast::Sender<AuthEvent>,
}

impl StaticIdentity {
    /// Provider accepting exactly these credentials.
    pub fn new(email: &str, password: &str, user_id: &str) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            email: email.to_string(),
            password: password.to_string(),
            user_id: user_id.to_string(),
            session: Mutex::new(None),
            events,
        }
    }

    fn make_session(&self) -> Session {
        Session {
            user_id: self.user_id.clone(),
            email: self.email.clone(),
            access_token: format!("fake-token-{}", self.user_id),
        }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_session(&self) -> backend_client::auth::Result<Option<Session>> {
        Ok(self.session.lock().clone())
    }

    async fn sign_in(&self, email: &str, password: &str) -> backend_client::auth::Result<Session> {
        if email != self.email || password != self.password {
            return Err(AuthError::InvalidCredentials);
        }
        let session = self.make_session();
        *self.session.lock() = Some(session.clone());
        let _ = self.events.send(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, _password: &str) -> backend_client::auth::Result<Session> {
        if email == self.email && self.session.lock().is_some() {
            return Err(AuthError::AlreadyRegistered);
        }
        let session = self.make_session();
        *self.session.lock() = Some(session.clone());
        let _ = self.events.send(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> backend_client::auth::Result<()> {
        *self.session.lock() = None;
        let _ = self.events.send(AuthEvent::SignedOut);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
