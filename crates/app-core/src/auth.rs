//! Authentication flows
//!
//! High-level login, registration, and logout built on the identity provider
//! and the profile store. Login and registration resolve the account's
//! profile so the caller learns in one step whether onboarding is pending.

use std::sync::Arc;

use backend_client::auth::{AuthError, IdentityProvider, Session};
use thiserror::Error;

use crate::profile::{Profile, ProfileError, ProfileStore};

/// Errors from the combined auth-and-profile flows.
#[derive(Debug, Error)]
pub enum AuthFlowError {
    /// The identity provider rejected or failed the request.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Profile lookup or update failed after authentication succeeded.
    #[error(transparent)]
    Profile(#[from] ProfileError),
}

/// Result alias for auth flows.
pub type Result<T> = std::result::Result<T, AuthFlowError>;

/// What a successful login or registration produced.
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    /// The account has a profile and can enter chat.
    Ready {
        /// The established session.
        session: Session,
        /// The account's profile.
        profile: Profile,
    },
    /// The account is authenticated but has not chosen a username yet.
    NeedsOnboarding {
        /// The established session.
        session: Session,
    },
}

/// Login, registration, and logout over an identity provider and a profile
/// store.
#[derive(Clone)]
pub struct AuthFlow {
    identity: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
}

impl AuthFlow {
    /// Create a flow over the given providers.
    pub fn new(identity: Arc<dyn IdentityProvider>, profiles: Arc<dyn ProfileStore>) -> Self {
        Self { identity, profiles }
    }

    /// Sign in and resolve the account's profile.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome> {
        let session = self.identity.sign_in(email, password).await?;
        tracing::info!(user_id = %session.user_id, "signed in");
        self.resolve(session).await
    }

    /// Register a new account. Freshly created accounts never have a profile,
    /// so a session here always means onboarding.
    pub async fn register(&self, email: &str, password: &str) -> Result<LoginOutcome> {
        let session = self.identity.sign_up(email, password).await?;
        tracing::info!(user_id = %session.user_id, "account created");
        Ok(LoginOutcome::NeedsOnboarding { session })
    }

    /// End the current session.
    pub async fn logout(&self) -> Result<()> {
        self.identity.sign_out().await?;
        tracing::info!("signed out");
        Ok(())
    }

    /// Resolve a session against the profile store.
    pub async fn resolve(&self, session: Session) -> Result<LoginOutcome> {
        match self.profiles.find(&session.user_id).await? {
            Some(profile) => Ok(LoginOutcome::Ready { session, profile }),
            None => Ok(LoginOutcome::NeedsOnboarding { session }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backend_client::auth::AuthEvent;
    use mockall::mock;
    use mockall::predicate::eq;
    use tokio::sync::broadcast;

    mock! {
        Identity {}

        #[async_trait::async_trait]
        impl IdentityProvider for Identity {
            async fn current_session(&self) -> backend_client::auth::Result<Option<Session>>;
            async fn sign_in(&self, email: &str, password: &str) -> backend_client::auth::Result<Session>;
            async fn sign_up(&self, email: &str, password: &str) -> backend_client::auth::Result<Session>;
            async fn sign_out(&self) -> backend_client::auth::Result<()>;
            fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
        }
    }

    mock! {
        Profiles {}

        #[async_trait::async_trait]
        impl ProfileStore for Profiles {
            async fn find(&self, user_id: &str) -> crate::profile::Result<Option<Profile>>;
            async fn set_username(&self, user_id: &str, username: &str) -> crate::profile::Result<Profile>;
            async fn username_taken(&self, username: &str) -> crate::profile::Result<bool>;
        }
    }

    fn session() -> Session {
        Session {
            user_id: "u1".to_string(),
            email: "alice@example.com".to_string(),
            access_token: "tok".to_string(),
        }
    }

    #[tokio::test]
    async fn test_login_with_profile_is_ready() {
        let mut identity = MockIdentity::new();
        identity
            .expect_sign_in()
            .with(eq("alice@example.com"), eq("pw"))
            .returning(|_, _| Ok(session()));
        let mut profiles = MockProfiles::new();
        profiles.expect_find().with(eq("u1")).returning(|_| {
            Ok(Some(Profile {
                id: "u1".to_string(),
                username: "alice".to_string(),
            }))
        });

        let flow = AuthFlow::new(Arc::new(identity), Arc::new(profiles));
        let outcome = flow.login("alice@example.com", "pw").await.unwrap();
        match outcome {
            LoginOutcome::Ready { profile, .. } => assert_eq!(profile.username, "alice"),
            other => panic!("expected Ready, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_login_without_profile_needs_onboarding() {
        let mut identity = MockIdentity::new();
        identity.expect_sign_in().returning(|_, _| Ok(session()));
        let mut profiles = MockProfiles::new();
        profiles.expect_find().returning(|_| Ok(None));

        let flow = AuthFlow::new(Arc::new(identity), Arc::new(profiles));
        let outcome = flow.login("alice@example.com", "pw").await.unwrap();
        assert!(matches!(outcome, LoginOutcome::NeedsOnboarding { .. }));
    }

    #[tokio::test]
    async fn test_register_always_needs_onboarding() {
        let mut identity = MockIdentity::new();
        identity.expect_sign_up().returning(|_, _| Ok(session()));
        let profiles = MockProfiles::new();

        let flow = AuthFlow::new(Arc::new(identity), Arc::new(profiles));
        let outcome = flow.register("alice@example.com", "pw").await.unwrap();
        assert!(matches!(outcome, LoginOutcome::NeedsOnboarding { .. }));
    }

    #[tokio::test]
    async fn test_login_propagates_auth_errors() {
        let mut identity = MockIdentity::new();
        identity
            .expect_sign_in()
            .returning(|_, _| Err(AuthError::InvalidCredentials));
        let profiles = MockProfiles::new();

        let flow = AuthFlow::new(Arc::new(identity), Arc::new(profiles));
        let result = flow.login("alice@example.com", "wrong").await;
        assert!(matches!(
            result,
            Err(AuthFlowError::Auth(AuthError::InvalidCredentials))
        ));
    }
}
