//! Shared presence channel
//!
//! Broadcast-style shared state reporting which users are currently
//! connected. The external primitive delivers full snapshots on every sync
//! event, so consumers recompute their online list wholesale instead of
//! patching it. [`PresenceHub`] is the in-process implementation: each client
//! takes one handle, tracks at most one entry through it, and must retract
//! that entry (untrack) before closing; closing first leaves a ghost entry
//! for other clients until an external timeout.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Capacity of the sync-event broadcast channel.
const SYNC_EVENT_CAPACITY: usize = 32;

/// Presence errors.
#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    /// The channel is shut down.
    #[error("presence channel closed")]
    Closed,
}

/// Result type for presence operations.
pub type Result<T> = std::result::Result<T, PresenceError>;

/// Connection status of a tracked user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    /// Actively connected.
    Online,
    /// Connected but inactive.
    Idle,
}

/// One connected user's presence record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEntry {
    /// User identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Current status.
    pub status: PresenceStatus,
}

impl PresenceEntry {
    /// Create an online entry.
    pub fn online(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: PresenceStatus::Online,
        }
    }
}

/// The presence channel at its interface boundary.
///
/// One handle per client; `track` publishes (or replaces) the caller's own
/// entry, `untrack` retracts it, and `state` returns the full snapshot of
/// every connected client.
#[async_trait]
pub trait PresenceChannel: Send + Sync {
    /// Publish or replace the caller's presence entry.
    async fn track(&self, entry: PresenceEntry) -> Result<()>;

    /// Retract the caller's presence entry.
    async fn untrack(&self) -> Result<()>;

    /// Full snapshot of all tracked entries.
    async fn state(&self) -> Vec<PresenceEntry>;

    /// Subscribe to sync events; each event means the snapshot changed.
    fn on_sync(&self) -> broadcast::Receiver<()>;
}

#[derive(Default)]
struct PresenceInner {
    entries: HashMap<u64, PresenceEntry>,
}

/// In-process presence topic shared by all local handles.
#[derive(Clone)]
pub struct PresenceHub {
    inner: Arc<Mutex<PresenceInner>>,
    next_slot: Arc<AtomicU64>,
    sync_tx: broadcast::Sender<()>,
}

impl PresenceHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        let (sync_tx, _) = broadcast::channel(SYNC_EVENT_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(PresenceInner::default())),
            next_slot: Arc::new(AtomicU64::new(0)),
            sync_tx,
        }
    }

    /// Take a per-client handle on the shared topic.
    pub fn channel(&self) -> PresenceHandle {
        PresenceHandle {
            slot: self.next_slot.fetch_add(1, Ordering::Relaxed),
            inner: Arc::clone(&self.inner),
            sync_tx: self.sync_tx.clone(),
        }
    }

    /// Full snapshot of all tracked entries, sorted by name.
    pub fn state(&self) -> Vec<PresenceEntry> {
        let inner = self.inner.lock();
        let mut entries: Vec<PresenceEntry> = inner.entries.values().cloned().collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }
}

impl Default for PresenceHub {
    fn default() -> Self {
        Self::new()
    }
}

/// One client's handle on the shared presence topic.
pub struct PresenceHandle {
    slot: u64,
    inner: Arc<Mutex<PresenceInner>>,
    sync_tx: broadcast::Sender<()>,
}

#[async_trait]
impl PresenceChannel for PresenceHandle {
    async fn track(&self, entry: PresenceEntry) -> Result<()> {
        self.inner.lock().entries.insert(self.slot, entry);
        let _ = self.sync_tx.send(());
        Ok(())
    }

    async fn untrack(&self) -> Result<()> {
        if self.inner.lock().entries.remove(&self.slot).is_some() {
            let _ = self.sync_tx.send(());
        }
        Ok(())
    }

    async fn state(&self) -> Vec<PresenceEntry> {
        let inner = self.inner.lock();
        let mut entries: Vec<PresenceEntry> = inner.entries.values().cloned().collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    fn on_sync(&self) -> broadcast::Receiver<()> {
        self.sync_tx.subscribe()
    }
}
