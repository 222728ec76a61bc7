//! Conversation controller
//!
//! Owns the active conversation: which one is open, its ordered message view,
//! and the unread counters for everything else. Activation is epoch-guarded
//! so a history fetch that finishes after the user has already opened another
//! conversation can never overwrite the newer state, and incoming rows are
//! deduplicated by id so a realtime event racing the history fetch shows a
//! message exactly once.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use app_core::message::OutgoingContent;
use app_core::repository::MessageRepository;
use app_core::{ConversationDescriptor, ConversationKey, Message, NewMessage};
use backend_client::realtime::{ChangeFeed, FeedSubscription, MessageRow, RealtimeError};

use crate::diagnostics::ErrorLog;
use crate::unread::{UnreadCounters, UnreadDisplay};

/// Controller errors.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// An operation needed an open conversation and none is active.
    #[error("no active conversation")]
    NoActiveConversation,

    /// History could not be fetched for the activated conversation.
    #[error("history fetch failed: {0}")]
    History(String),

    /// The realtime feed refused the subscription.
    #[error(transparent)]
    Realtime(#[from] RealtimeError),

    /// A message could not be composed or appended.
    #[error("send failed: {0}")]
    Send(String),
}

/// Result alias for controller operations.
pub type Result<T> = std::result::Result<T, ControllerError>;

struct ControllerState {
    active: Option<(ConversationDescriptor, ConversationKey)>,
    epoch: u64,
    buffer: Vec<Message>,
    seen: HashSet<String>,
    unread: UnreadCounters,
    pump: Option<JoinHandle<()>>,
}

impl ControllerState {
    fn active_key(&self) -> Option<&ConversationKey> {
        self.active.as_ref().map(|(_, key)| key)
    }
}

/// State controller for conversations, message views, and unread counters.
///
/// Cheap to clone; clones share state. Consumers observe the ordered view of
/// the active conversation and the unread snapshot through `watch` receivers.
#[derive(Clone)]
pub struct ConversationController {
    viewer: String,
    repository: Arc<dyn MessageRepository>,
    feed: Arc<dyn ChangeFeed>,
    state: Arc<Mutex<ControllerState>>,
    view_tx: Arc<watch::Sender<Vec<Message>>>,
    unread_tx: Arc<watch::Sender<HashMap<ConversationKey, u32>>>,
    diagnostics: ErrorLog,
}

impl ConversationController {
    /// Create a controller for `viewer`.
    pub fn new(
        viewer: impl Into<String>,
        repository: Arc<dyn MessageRepository>,
        feed: Arc<dyn ChangeFeed>,
        diagnostics: ErrorLog,
    ) -> Self {
        let (view_tx, _) = watch::channel(Vec::new());
        let (unread_tx, _) = watch::channel(HashMap::new());
        Self {
            viewer: viewer.into(),
            repository,
            feed,
            state: Arc::new(Mutex::new(ControllerState {
                active: None,
                epoch: 0,
                buffer: Vec::new(),
                seen: HashSet::new(),
                unread: UnreadCounters::new(),
                pump: None,
            })),
            view_tx: Arc::new(view_tx),
            unread_tx: Arc::new(unread_tx),
            diagnostics,
        }
    }

    /// The viewer this controller reads and writes as.
    pub fn viewer(&self) -> &str {
        &self.viewer
    }

    /// Observe the ordered message view of the active conversation.
    pub fn subscribe_view(&self) -> watch::Receiver<Vec<Message>> {
        self.view_tx.subscribe()
    }

    /// Observe nonzero unread counts.
    pub fn subscribe_unread(&self) -> watch::Receiver<HashMap<ConversationKey, u32>> {
        self.unread_tx.subscribe()
    }

    /// Canonical key of the active conversation, if any.
    pub async fn active_key(&self) -> Option<ConversationKey> {
        self.state.lock().await.active_key().cloned()
    }

    /// How the unread count for `key` should be rendered.
    pub async fn unread_display(&self, key: &ConversationKey) -> UnreadDisplay {
        self.state.lock().await.unread.display(key)
    }

    /// Open a conversation: reset its unread count, subscribe to its change
    /// feed, and load its history.
    ///
    /// Returns the ordered view. If another activation supersedes this one
    /// while history is in flight, the stale result is discarded and an empty
    /// view is returned.
    pub async fn activate(&self, descriptor: ConversationDescriptor) -> Result<Vec<Message>> {
        let key = ConversationKey::resolve(&self.viewer, &descriptor);
        tracing::info!(key = %key, "activating conversation");

        let epoch = {
            let mut state = self.state.lock().await;
            if let Some(previous) = state.active_key().cloned() {
                state.unread.clear(&previous);
            }
            state.unread.clear(&key);
            state.epoch += 1;
            state.buffer.clear();
            state.seen.clear();
            if let Some(pump) = state.pump.take() {
                pump.abort();
            }
            state.active = Some((descriptor, key.clone()));
            self.publish(&state);
            state.epoch
        };

        let subscription = self.feed.subscribe(key.as_str()).await?;
        self.install_pump(epoch, subscription).await;

        match self.repository.history(&key).await {
            Ok(history) => {
                let mut state = self.state.lock().await;
                if state.epoch != epoch {
                    tracing::debug!(key = %key, "discarding stale history result");
                    return Ok(Vec::new());
                }
                for message in history {
                    if state.seen.insert(message.id.clone()) {
                        state.buffer.push(message);
                    }
                }
                self.publish(&state);
                Ok(derive_view(&state.buffer, Some(&key)))
            }
            Err(error) => {
                let state = self.state.lock().await;
                if state.epoch != epoch {
                    return Ok(Vec::new());
                }
                // The conversation stays open on whatever realtime delivers.
                self.diagnostics.record("history", error.to_string());
                Err(ControllerError::History(error.to_string()))
            }
        }
    }

    /// Close the active conversation and drop all message state.
    pub async fn deactivate(&self) {
        let mut state = self.state.lock().await;
        state.epoch += 1;
        if let Some(pump) = state.pump.take() {
            pump.abort();
        }
        state.active = None;
        state.buffer.clear();
        state.seen.clear();
        state.unread.reset();
        self.publish(&state);
    }

    /// Send a message into the active conversation.
    pub async fn send(&self, content: OutgoingContent) -> Result<()> {
        let key = self
            .active_key()
            .await
            .ok_or(ControllerError::NoActiveConversation)?;
        let message = NewMessage::compose(&self.viewer, key, content)
            .map_err(|e| ControllerError::Send(e.to_string()))?;
        self.repository
            .insert(&message)
            .await
            .map_err(|e| ControllerError::Send(e.to_string()))
    }

    /// Feed one inserted row into the controller.
    ///
    /// This is the boundary the realtime transport calls into; the internal
    /// pump uses it for the active conversation's subscription, and arrivals
    /// for other conversations enter here to drive unread counters. Malformed
    /// and already-seen rows are ignored.
    pub async fn on_incoming(&self, row: MessageRow) {
        let message = match Message::from_row(row) {
            Ok(message) => message,
            Err(error) => {
                tracing::warn!(%error, "ignoring malformed realtime row");
                return;
            }
        };

        let mut state = self.state.lock().await;
        if !state.seen.insert(message.id.clone()) {
            return;
        }
        let from_other = message.sender != self.viewer;
        let inactive = state.active_key() != Some(&message.conversation);
        if from_other && inactive {
            state.unread.increment(&message.conversation);
        }
        state.buffer.push(message);
        self.publish(&state);
    }

    async fn install_pump(&self, epoch: u64, mut subscription: FeedSubscription) {
        let mut state = self.state.lock().await;
        if state.epoch != epoch {
            // Superseded while subscribing; dropping the subscription
            // unsubscribes.
            return;
        }
        let controller = self.clone();
        state.pump = Some(tokio::spawn(async move {
            while let Some(row) = subscription.recv().await {
                controller.on_incoming(row).await;
            }
        }));
    }

    fn publish(&self, state: &ControllerState) {
        self.view_tx
            .send_replace(derive_view(&state.buffer, state.active_key()));
        self.unread_tx.send_replace(state.unread.snapshot());
    }
}

/// Pure projection of the buffer into the active conversation's ordered view.
fn derive_view(buffer: &[Message], active: Option<&ConversationKey>) -> Vec<Message> {
    let Some(key) = active else {
        return Vec::new();
    };
    let mut view: Vec<Message> = buffer
        .iter()
        .filter(|m| &m.conversation == key)
        .cloned()
        .collect();
    view.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    view
}
