//! Session lifecycle
//!
//! Drives the account's phase through loading, signed-out, onboarding, and
//! active, publishing every transition on a `watch` channel. Initialization
//! always leaves the loading phase, whatever the backend does, so a renderer
//! never spins forever.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use app_core::auth::{AuthFlow, AuthFlowError, LoginOutcome};
use app_core::profile::{ProfileError, ProfileStore};
use backend_client::auth::{AuthEvent, IdentityProvider, Session};

use crate::controller::ConversationController;
use crate::diagnostics::ErrorLog;

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// An operation needed an authenticated session and there is none.
    #[error("not signed in")]
    NotSignedIn,

    /// A login, registration, or logout flow failed.
    #[error(transparent)]
    Flow(#[from] AuthFlowError),

    /// A profile operation failed.
    #[error(transparent)]
    Profile(#[from] ProfileError),
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Where the account currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    /// Initialization has not finished yet.
    Loading,
    /// No authenticated session.
    SignedOut,
    /// Authenticated, but no username chosen yet.
    Onboarding {
        /// Account id of the session.
        user_id: String,
        /// Email the account was registered with.
        email: String,
    },
    /// Authenticated with a complete profile.
    Active {
        /// Account id of the session.
        user_id: String,
        /// Chosen display name.
        username: String,
    },
}

/// Controller for the account's session phase.
///
/// When a [`ConversationController`] is attached, signing out also tears
/// down its conversation state (active conversation, message buffer, unread
/// counters), whether the sign-out came from [`SessionController::logout`]
/// or from an auth event.
#[derive(Clone)]
pub struct SessionController {
    identity: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    flow: AuthFlow,
    phase_tx: Arc<watch::Sender<SessionPhase>>,
    conversations: Option<ConversationController>,
    diagnostics: ErrorLog,
}

impl SessionController {
    /// Create a controller in the loading phase.
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
        diagnostics: ErrorLog,
    ) -> Self {
        let flow = AuthFlow::new(Arc::clone(&identity), Arc::clone(&profiles));
        let (phase_tx, _) = watch::channel(SessionPhase::Loading);
        Self {
            identity,
            profiles,
            flow,
            phase_tx: Arc::new(phase_tx),
            conversations: None,
            diagnostics,
        }
    }

    /// Attach the conversation controller whose state is torn down on
    /// sign-out.
    pub fn with_conversations(mut self, conversations: ConversationController) -> Self {
        self.conversations = Some(conversations);
        self
    }

    /// Observe phase transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionPhase> {
        self.phase_tx.subscribe()
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase_tx.borrow().clone()
    }

    /// Restore any existing session and start listening for auth events.
    ///
    /// Leaves [`SessionPhase::Loading`] on every path; a backend failure
    /// lands on signed-out rather than hanging.
    pub async fn initialize(&self) -> JoinHandle<()> {
        let listener = self.spawn_auth_listener();
        let phase = match self.identity.current_session().await {
            Ok(Some(session)) => self.resolve_phase(session).await,
            Ok(None) => SessionPhase::SignedOut,
            Err(error) => {
                self.diagnostics.record("session", error.to_string());
                SessionPhase::SignedOut
            }
        };
        self.phase_tx.send_replace(phase);
        listener
    }

    /// Sign in and publish the resulting phase.
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionPhase> {
        match self.flow.login(email, password).await {
            Ok(outcome) => {
                let phase = phase_for(outcome);
                self.phase_tx.send_replace(phase.clone());
                Ok(phase)
            }
            Err(error) => {
                self.diagnostics.record("login", error.to_string());
                Err(error.into())
            }
        }
    }

    /// Register a new account; a fresh account always lands on onboarding.
    pub async fn register(&self, email: &str, password: &str) -> Result<SessionPhase> {
        match self.flow.register(email, password).await {
            Ok(outcome) => {
                let phase = phase_for(outcome);
                self.phase_tx.send_replace(phase.clone());
                Ok(phase)
            }
            Err(error) => {
                self.diagnostics.record("register", error.to_string());
                Err(error.into())
            }
        }
    }

    /// Claim a username for the signed-in account and activate the session.
    pub async fn complete_onboarding(&self, username: &str) -> Result<SessionPhase> {
        let session = self
            .identity
            .current_session()
            .await
            .ok()
            .flatten()
            .ok_or(SessionError::NotSignedIn)?;

        let profile = self.profiles.set_username(&session.user_id, username).await?;
        let phase = SessionPhase::Active {
            user_id: profile.id,
            username: profile.username,
        };
        self.phase_tx.send_replace(phase.clone());
        Ok(phase)
    }

    /// Sign out, tear down attached conversation state, and publish the
    /// signed-out phase.
    ///
    /// On failure the phase and conversation state are left unchanged so the
    /// caller can retry.
    pub async fn logout(&self) -> Result<()> {
        match self.flow.logout().await {
            Ok(()) => {
                self.teardown_conversations().await;
                self.phase_tx.send_replace(SessionPhase::SignedOut);
                Ok(())
            }
            Err(error) => {
                self.diagnostics.record("logout", error.to_string());
                Err(error.into())
            }
        }
    }

    async fn teardown_conversations(&self) {
        if let Some(conversations) = &self.conversations {
            conversations.deactivate().await;
        }
    }

    async fn resolve_phase(&self, session: Session) -> SessionPhase {
        match self.flow.resolve(session.clone()).await {
            Ok(outcome) => phase_for(outcome),
            Err(error) => {
                // Profile lookup failed; fall back to onboarding rather than
                // dropping the authenticated session.
                self.diagnostics.record("session", error.to_string());
                SessionPhase::Onboarding {
                    user_id: session.user_id,
                    email: session.email,
                }
            }
        }
    }

    fn spawn_auth_listener(&self) -> JoinHandle<()> {
        let controller = self.clone();
        let mut events = self.identity.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(AuthEvent::SignedIn(session)) => {
                        let phase = controller.resolve_phase(session).await;
                        controller.phase_tx.send_replace(phase);
                    }
                    Ok(AuthEvent::SignedOut) => {
                        controller.teardown_conversations().await;
                        controller.phase_tx.send_replace(SessionPhase::SignedOut);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "auth event stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

fn phase_for(outcome: LoginOutcome) -> SessionPhase {
    match outcome {
        LoginOutcome::Ready { session, profile } => SessionPhase::Active {
            user_id: session.user_id,
            username: profile.username,
        },
        LoginOutcome::NeedsOnboarding { session } => SessionPhase::Onboarding {
            user_id: session.user_id,
            email: session.email,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use app_core::testing::{MemoryMessageRepository, MemoryProfileStore, StaticIdentity};
    use app_core::{ConversationDescriptor, ConversationKey};
    use backend_client::auth::AuthError;
    use backend_client::realtime::{MessageRow, RealtimeHub};
    use chrono::Utc;
    use std::time::Duration;

    use crate::unread::UnreadDisplay;

    fn controller(
        identity: StaticIdentity,
        profiles: MemoryProfileStore,
    ) -> (SessionController, ErrorLog) {
        let diagnostics = ErrorLog::new();
        let controller = SessionController::new(
            Arc::new(identity),
            Arc::new(profiles),
            diagnostics.clone(),
        );
        (controller, diagnostics)
    }

    #[tokio::test]
    async fn test_initialize_without_session_is_signed_out() {
        let (controller, _) = controller(
            StaticIdentity::new("alice@example.com", "pw", "u1"),
            MemoryProfileStore::new(),
        );
        assert_eq!(controller.phase(), SessionPhase::Loading);

        let _listener = controller.initialize().await;
        assert_eq!(controller.phase(), SessionPhase::SignedOut);
    }

    #[tokio::test]
    async fn test_login_with_profile_is_active() {
        let (controller, _) = controller(
            StaticIdentity::new("alice@example.com", "pw", "u1"),
            MemoryProfileStore::with_profile("u1", "alice"),
        );
        let _listener = controller.initialize().await;

        let phase = controller.login("alice@example.com", "pw").await.unwrap();
        assert_eq!(
            phase,
            SessionPhase::Active {
                user_id: "u1".to_string(),
                username: "alice".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_login_without_profile_is_onboarding() {
        let (controller, _) = controller(
            StaticIdentity::new("alice@example.com", "pw", "u1"),
            MemoryProfileStore::new(),
        );
        let _listener = controller.initialize().await;

        let phase = controller.login("alice@example.com", "pw").await.unwrap();
        assert!(matches!(phase, SessionPhase::Onboarding { .. }));
    }

    #[tokio::test]
    async fn test_failed_login_keeps_phase_and_logs() {
        let (controller, diagnostics) = controller(
            StaticIdentity::new("alice@example.com", "pw", "u1"),
            MemoryProfileStore::new(),
        );
        let _listener = controller.initialize().await;

        let result = controller.login("alice@example.com", "wrong").await;
        assert!(matches!(
            result,
            Err(SessionError::Flow(AuthFlowError::Auth(
                AuthError::InvalidCredentials
            )))
        ));
        assert_eq!(controller.phase(), SessionPhase::SignedOut);
        assert_eq!(diagnostics.len(), 1);
    }

    #[tokio::test]
    async fn test_onboarding_completes_to_active() {
        let (controller, _) = controller(
            StaticIdentity::new("alice@example.com", "pw", "u1"),
            MemoryProfileStore::new(),
        );
        let _listener = controller.initialize().await;
        controller.login("alice@example.com", "pw").await.unwrap();

        let phase = controller.complete_onboarding("alice").await.unwrap();
        assert_eq!(
            phase,
            SessionPhase::Active {
                user_id: "u1".to_string(),
                username: "alice".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_onboarding_requires_session() {
        let (controller, _) = controller(
            StaticIdentity::new("alice@example.com", "pw", "u1"),
            MemoryProfileStore::new(),
        );
        let _listener = controller.initialize().await;

        let result = controller.complete_onboarding("alice").await;
        assert!(matches!(result, Err(SessionError::NotSignedIn)));
    }

    #[tokio::test]
    async fn test_taken_username_stays_in_onboarding() {
        let (controller, _) = controller(
            StaticIdentity::new("bob@example.com", "pw", "u2"),
            MemoryProfileStore::with_profile("u1", "alice"),
        );
        let _listener = controller.initialize().await;
        controller.login("bob@example.com", "pw").await.unwrap();

        let result = controller.complete_onboarding("alice").await;
        assert!(matches!(
            result,
            Err(SessionError::Profile(ProfileError::UsernameTaken))
        ));
        assert!(matches!(controller.phase(), SessionPhase::Onboarding { .. }));
    }

    #[tokio::test]
    async fn test_logout_signs_out() {
        let (controller, _) = controller(
            StaticIdentity::new("alice@example.com", "pw", "u1"),
            MemoryProfileStore::with_profile("u1", "alice"),
        );
        let _listener = controller.initialize().await;
        controller.login("alice@example.com", "pw").await.unwrap();

        controller.logout().await.unwrap();
        assert_eq!(controller.phase(), SessionPhase::SignedOut);
    }

    fn conversations_for(viewer: &str) -> ConversationController {
        ConversationController::new(
            viewer,
            Arc::new(MemoryMessageRepository::new()),
            Arc::new(RealtimeHub::new()),
            ErrorLog::new(),
        )
    }

    fn unread_row(id: &str, key: &str) -> MessageRow {
        MessageRow {
            id: id.to_string(),
            sender: "bob".to_string(),
            channel_name: key.to_string(),
            content: "psst".to_string(),
            caption: None,
            kind: "text".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_logout_tears_down_conversation_state() {
        let conversations = conversations_for("alice");
        let controller = SessionController::new(
            Arc::new(StaticIdentity::new("alice@example.com", "pw", "u1")),
            Arc::new(MemoryProfileStore::with_profile("u1", "alice")),
            ErrorLog::new(),
        )
        .with_conversations(conversations.clone());
        let _listener = controller.initialize().await;
        controller.login("alice@example.com", "pw").await.unwrap();

        conversations
            .activate(ConversationDescriptor::channel("general"))
            .await
            .unwrap();
        conversations.on_incoming(unread_row("m1", "random")).await;
        conversations.on_incoming(unread_row("m2", "random")).await;
        let random = ConversationKey::new("random");
        assert_eq!(
            conversations.unread_display(&random).await,
            UnreadDisplay::Count(2)
        );

        controller.logout().await.unwrap();
        assert_eq!(controller.phase(), SessionPhase::SignedOut);
        assert!(conversations.active_key().await.is_none());
        assert_eq!(
            conversations.unread_display(&random).await,
            UnreadDisplay::None
        );
        assert!(conversations.subscribe_view().borrow().is_empty());
    }

    #[tokio::test]
    async fn test_sign_out_event_tears_down_conversation_state() {
        let identity = Arc::new(StaticIdentity::new("alice@example.com", "pw", "u1"));
        let conversations = conversations_for("alice");
        let controller = SessionController::new(
            Arc::clone(&identity) as Arc<dyn IdentityProvider>,
            Arc::new(MemoryProfileStore::with_profile("u1", "alice")),
            ErrorLog::new(),
        )
        .with_conversations(conversations.clone());
        let _listener = controller.initialize().await;
        controller.login("alice@example.com", "pw").await.unwrap();

        conversations
            .activate(ConversationDescriptor::channel("general"))
            .await
            .unwrap();
        conversations.on_incoming(unread_row("m1", "random")).await;

        // The session ends somewhere else; only the auth event reaches us.
        identity.sign_out().await.unwrap();
        let mut phases = controller.subscribe();
        tokio::time::timeout(Duration::from_secs(1), async {
            while controller.phase() != SessionPhase::SignedOut {
                phases.changed().await.expect("phase channel closed");
            }
        })
        .await
        .unwrap();

        assert!(conversations.active_key().await.is_none());
        assert_eq!(
            conversations
                .unread_display(&ConversationKey::new("random"))
                .await,
            UnreadDisplay::None
        );
    }

    #[tokio::test]
    async fn test_initialize_restores_existing_session() {
        let identity = StaticIdentity::new("alice@example.com", "pw", "u1");
        identity.sign_in("alice@example.com", "pw").await.unwrap();
        let (controller, _) = controller(identity, MemoryProfileStore::with_profile("u1", "alice"));

        let _listener = controller.initialize().await;
        assert_eq!(
            controller.phase(),
            SessionPhase::Active {
                user_id: "u1".to_string(),
                username: "alice".to_string(),
            }
        );
    }
}
