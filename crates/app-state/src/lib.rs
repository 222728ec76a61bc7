//! Application state for Sitechat
//!
//! Reactive state controllers that sit between the backend clients and a
//! rendering layer: the conversation controller (active conversation, ordered
//! message view, unread counters), presence and typing trackers, the session
//! lifecycle, and a bounded diagnostics log. Views are published on `watch`
//! channels so a renderer observes state instead of polling it.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod controller;
pub mod diagnostics;
pub mod presence;
pub mod session;
pub mod typing;
pub mod unread;

pub use controller::{ConversationController, ControllerError};
pub use diagnostics::{ErrorEntry, ErrorLog};
pub use presence::PresenceTracker;
pub use session::{SessionController, SessionPhase};
pub use typing::TypingTracker;
pub use unread::{UnreadCounters, UnreadDisplay};
