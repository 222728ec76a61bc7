//! Unread counters
//!
//! Per-conversation counts of messages that arrived while the conversation
//! was not on screen. Counts only ever grow or reset to zero; opening a
//! conversation is the single reset point, so a count never silently decays.

use std::collections::HashMap;

use app_core::ConversationKey;

/// Largest count rendered as a number; anything above shows as "9+".
pub const MAX_DISPLAY_COUNT: u32 = 9;

/// How a counter should be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnreadDisplay {
    /// No badge.
    None,
    /// Exact count badge.
    Count(u32),
    /// Overflow badge ("9+").
    Many,
}

impl UnreadDisplay {
    /// Badge text, if any.
    pub fn label(&self) -> Option<String> {
        match self {
            Self::None => None,
            Self::Count(n) => Some(n.to_string()),
            Self::Many => Some(format!("{MAX_DISPLAY_COUNT}+")),
        }
    }
}

/// Unread message counts keyed by canonical conversation key.
#[derive(Debug, Clone, Default)]
pub struct UnreadCounters {
    counts: HashMap<ConversationKey, u32>,
}

impl UnreadCounters {
    /// Empty counter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one unread message to `key`.
    pub fn increment(&mut self, key: &ConversationKey) {
        *self.counts.entry(key.clone()).or_insert(0) += 1;
    }

    /// Reset the count for `key` to zero.
    pub fn clear(&mut self, key: &ConversationKey) {
        self.counts.remove(key);
    }

    /// Current count for `key`.
    pub fn get(&self, key: &ConversationKey) -> u32 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// How the count for `key` should be rendered.
    pub fn display(&self, key: &ConversationKey) -> UnreadDisplay {
        match self.get(key) {
            0 => UnreadDisplay::None,
            n if n > MAX_DISPLAY_COUNT => UnreadDisplay::Many,
            n => UnreadDisplay::Count(n),
        }
    }

    /// All nonzero counts, for publishing to the renderer.
    pub fn snapshot(&self) -> HashMap<ConversationKey, u32> {
        self.counts.clone()
    }

    /// Drop every count.
    pub fn reset(&mut self) {
        self.counts.clear();
    }
}
