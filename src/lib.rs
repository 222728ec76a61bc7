//! Sitechat
//!
//! Conversation-state core for a chat client that delegates auth, storage,
//! realtime, and blobs to a hosted backend. This crate re-exports the pieces
//! a frontend wires together: the backend clients, the domain services, and
//! the reactive state controllers.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub use backend_client::auth::{AuthClient, AuthError, AuthEvent, IdentityProvider, Session};
pub use backend_client::presence::{
    PresenceChannel, PresenceEntry, PresenceHub, PresenceStatus,
};
pub use backend_client::realtime::{ChangeFeed, MessageRow, RealtimeHub};
pub use backend_client::rest::RestClient;
pub use backend_client::storage::BlobClient;
pub use backend_client::{token_store, BackendConfig, TokenStore};

pub use app_core::auth::{AuthFlow, LoginOutcome};
pub use app_core::media::{MediaService, StoredAttachment};
pub use app_core::profile::{Profile, ProfileStore, RestProfileStore};
pub use app_core::repository::{MessageRepository, RestMessageRepository};
pub use app_core::{
    ConversationDescriptor, ConversationKey, Message, MessageKind, NewMessage, OutgoingContent,
};

pub use app_state::{
    ConversationController, ControllerError, ErrorLog, PresenceTracker, SessionController,
    SessionPhase, TypingTracker, UnreadCounters, UnreadDisplay,
};
