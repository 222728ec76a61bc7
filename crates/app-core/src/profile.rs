//! User profiles
//!
//! A profile pairs an account id with the username shown in chat. Accounts
//! without a profile row are mid-onboarding; choosing a username creates the
//! row, and usernames are unique across the instance.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use backend_client::rest::{RestClient, TableQuery};

/// Table holding user profiles.
pub const PROFILES_TABLE: &str = "profiles";

/// Longest allowed username.
pub const MAX_USERNAME_LENGTH: usize = 32;

/// Errors from profile lookups and updates.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// The requested username is already in use by another account.
    #[error("username is already taken")]
    UsernameTaken,

    /// The username is empty, too long, or contains whitespace.
    #[error("invalid username: {0}")]
    InvalidUsername(String),

    /// The backend rejected or failed the request.
    #[error("profile backend error: {0}")]
    Backend(String),
}

/// Result alias for profile operations.
pub type Result<T> = std::result::Result<T, ProfileError>;

/// A user's public profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Account id the profile belongs to.
    pub id: String,
    /// Display name shown in conversations.
    pub username: String,
}

/// Profile storage at its interface boundary.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Look up the profile for an account id. `None` means onboarding is
    /// still pending.
    async fn find(&self, user_id: &str) -> Result<Option<Profile>>;

    /// Claim `username` for `user_id`, creating or replacing the profile row.
    async fn set_username(&self, user_id: &str, username: &str) -> Result<Profile>;

    /// Whether any account already holds `username`.
    async fn username_taken(&self, username: &str) -> Result<bool>;
}

/// Reject usernames the rest of the system cannot display or key on.
pub fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() {
        return Err(ProfileError::InvalidUsername(
            "username must not be empty".to_string(),
        ));
    }
    if username.len() > MAX_USERNAME_LENGTH {
        return Err(ProfileError::InvalidUsername(format!(
            "username exceeds {MAX_USERNAME_LENGTH} characters"
        )));
    }
    if username.chars().any(char::is_whitespace) {
        return Err(ProfileError::InvalidUsername(
            "username must not contain whitespace".to_string(),
        ));
    }
    Ok(())
}

/// Profile store backed by the backend's `profiles` table.
#[derive(Debug, Clone)]
pub struct RestProfileStore {
    rest: RestClient,
}

impl RestProfileStore {
    /// Create a store over a REST client.
    pub fn new(rest: RestClient) -> Self {
        Self { rest }
    }
}

#[async_trait]
impl ProfileStore for RestProfileStore {
    async fn find(&self, user_id: &str) -> Result<Option<Profile>> {
        let query = TableQuery::new(PROFILES_TABLE).eq("id", user_id).limit(1);
        let mut rows: Vec<Profile> = self
            .rest
            .select(&query)
            .await
            .map_err(|e| ProfileError::Backend(e.to_string()))?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.remove(0))
        })
    }

    async fn set_username(&self, user_id: &str, username: &str) -> Result<Profile> {
        validate_username(username)?;
        if self.username_taken(username).await? {
            return Err(ProfileError::UsernameTaken);
        }

        let profile = Profile {
            id: user_id.to_string(),
            username: username.to_string(),
        };
        let existing = self.find(user_id).await?;
        let result = if existing.is_some() {
            self.rest
                .update(PROFILES_TABLE, "id", user_id, &profile)
                .await
        } else {
            self.rest.insert(PROFILES_TABLE, &profile).await
        };
        result.map_err(|e| ProfileError::Backend(e.to_string()))?;
        Ok(profile)
    }

    async fn username_taken(&self, username: &str) -> Result<bool> {
        let count = self
            .rest
            .count_eq(PROFILES_TABLE, "username", username)
            .await
            .map_err(|e| ProfileError::Backend(e.to_string()))?;
        Ok(count > 0)
    }
}
