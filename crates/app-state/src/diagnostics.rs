//! In-app diagnostics log
//!
//! A bounded ring of recent errors the user can inspect from the client
//! itself, independent of the tracing pipeline. Oldest entries fall off once
//! the cap is reached.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Entries kept before the oldest is evicted.
pub const MAX_LOG_ENTRIES: usize = 50;

/// One recorded error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEntry {
    /// When the error was recorded.
    pub at: DateTime<Utc>,
    /// Component that reported it.
    pub source: String,
    /// Human-readable description.
    pub message: String,
}

/// Shared, bounded error log.
#[derive(Debug, Clone, Default)]
pub struct ErrorLog {
    entries: Arc<Mutex<VecDeque<ErrorEntry>>>,
}

impl ErrorLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error, evicting the oldest entry past the cap.
    pub fn record(&self, source: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(source, %message, "recorded diagnostic");
        let mut entries = self.entries.lock();
        if entries.len() == MAX_LOG_ENTRIES {
            entries.pop_front();
        }
        entries.push_back(ErrorEntry {
            at: Utc::now(),
            source: source.to_string(),
            message,
        });
    }

    /// Snapshot of entries, oldest first.
    pub fn entries(&self) -> Vec<ErrorEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of recorded entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
