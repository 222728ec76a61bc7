//! Typing indicators
//!
//! Short-lived "x is typing" state per conversation. Entries expire on read
//! rather than by timer, so a peer that disconnects mid-keystroke simply ages
//! out after [`TYPING_EXPIRY`].

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use app_core::ConversationKey;

/// How long a typing notice stays live without renewal.
pub const TYPING_EXPIRY: Duration = Duration::from_millis(1500);

/// Tracks who is typing in which conversation.
pub struct TypingTracker {
    viewer: String,
    entries: Mutex<HashMap<(ConversationKey, String), Instant>>,
}

impl TypingTracker {
    /// Tracker for `viewer`; the viewer's own notices are never reported.
    pub fn new(viewer: impl Into<String>) -> Self {
        Self {
            viewer: viewer.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Record that `who` started (or continues) typing in `key`.
    pub fn notice_start(&self, key: &ConversationKey, who: &str) {
        self.entries
            .lock()
            .insert((key.clone(), who.to_string()), Instant::now());
    }

    /// Record that `who` stopped typing in `key`.
    pub fn notice_stop(&self, key: &ConversationKey, who: &str) {
        self.entries
            .lock()
            .remove(&(key.clone(), who.to_string()));
    }

    /// Names currently typing in `key`, excluding the viewer, sorted.
    pub fn typists(&self, key: &ConversationKey) -> Vec<String> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, started| now.duration_since(*started) < TYPING_EXPIRY);

        let mut names: Vec<String> = entries
            .keys()
            .filter(|(k, who)| k == key && who != &self.viewer)
            .map(|(_, who)| who.clone())
            .collect();
        names.sort();
        names
    }

    /// Rendered indicator line for `key`, or `None` when nobody is typing.
    pub fn summary(&self, key: &ConversationKey) -> Option<String> {
        let names = self.typists(key);
        match names.as_slice() {
            [] => None,
            [one] => Some(format!("{one} is typing…")),
            [first, second] => Some(format!("{first} and {second} are typing…")),
            _ => Some("several people are typing…".to_string()),
        }
    }
}
