//! Backend-as-a-service client for Sitechat
//!
//! This crate covers the external collaborators of the chat client at their
//! interface boundary: identity (auth sessions), PostgREST-style table
//! access, the realtime change feed, the shared presence channel, and blob
//! storage. The REST surfaces are implemented over HTTP; the realtime and
//! presence transports are trait boundaries with an in-process hub
//! implementation used for loopback and tests.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod config;
pub mod presence;
pub mod realtime;
pub mod rest;
pub mod storage;

pub use auth::{AuthClient, AuthError, AuthEvent, IdentityProvider, Session};
pub use config::BackendConfig;
pub use presence::{PresenceChannel, PresenceEntry, PresenceError, PresenceHub, PresenceStatus};
pub use realtime::{ChangeFeed, FeedSubscription, MessageRow, RealtimeError, RealtimeHub};
pub use rest::{RestClient, RestError, TableQuery};
pub use storage::{BlobClient, StorageError};

use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared access-token slot.
///
/// The auth client writes the bearer token here on sign-in/sign-out; the REST
/// and blob clients read it for every request. When empty, requests fall back
/// to the anon API key.
pub type TokenStore = Arc<RwLock<Option<String>>>;

/// Create an empty token store shared between the clients.
pub fn token_store() -> TokenStore {
    Arc::new(RwLock::new(None))
}
