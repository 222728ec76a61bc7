//! Conversation identity
//!
//! A conversation is either a named channel or a direct message between two
//! display names. [`ConversationKey::resolve`] maps a viewer-relative
//! descriptor to the canonical key both participants compute identically:
//! channels keep their name, direct messages sort the pair of names so
//! neither side depends on who is "self". Any asymmetry here silently splits
//! a conversation into two non-communicating halves, which is why the key is
//! derived in exactly one place.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix of every direct-message conversation key.
pub const DM_KEY_PREFIX: &str = "DM_";

/// A conversation as the viewer names it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum ConversationDescriptor {
    /// A named channel.
    Channel(String),
    /// A direct message; the name is the *other* participant's display name.
    Direct(String),
}

impl ConversationDescriptor {
    /// Descriptor for a channel.
    pub fn channel(name: impl Into<String>) -> Self {
        Self::Channel(name.into())
    }

    /// Descriptor for a direct message with `other`.
    pub fn direct(other: impl Into<String>) -> Self {
        Self::Direct(other.into())
    }

    /// The viewer-relative display name of this conversation.
    pub fn name(&self) -> &str {
        match self {
            Self::Channel(name) | Self::Direct(name) => name,
        }
    }
}

/// Canonical conversation key, identical on both participants' clients.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationKey(String);

impl ConversationKey {
    /// Wrap an already-canonical key (as stored in the message table).
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Derive the canonical key for `descriptor` as seen by `viewer`.
    ///
    /// Pure and total: safe to call on every render. The self-DM case
    /// (`viewer == other`) yields the well-defined degenerate key `DM_X_X`.
    pub fn resolve(viewer: &str, descriptor: &ConversationDescriptor) -> Self {
        match descriptor {
            ConversationDescriptor::Channel(name) => Self(name.clone()),
            ConversationDescriptor::Direct(other) => {
                // Code-point order, so both sides agree on the pair order.
                let (a, b) = if viewer.as_bytes() <= other.as_bytes() {
                    (viewer, other.as_str())
                } else {
                    (other.as_str(), viewer)
                };
                Self(format!("{DM_KEY_PREFIX}{a}_{b}"))
            }
        }
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this key names a direct-message conversation.
    pub fn is_direct(&self) -> bool {
        self.0.starts_with(DM_KEY_PREFIX)
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
