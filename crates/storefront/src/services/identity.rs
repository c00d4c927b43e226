//! Identity store: who is signed in, and whether they are an admin.
//!
//! Per-visitor identity (user plus tokens) lives in the HTTP session. The
//! store itself is shared application state holding the admin-flag
//! directory, which is kept current by listening to auth events.
//!
//! # Late lookups
//!
//! Every directory entry carries an epoch. Starting a lookup for a user
//! bumps that user's epoch; a finished lookup is written back only if the
//! epoch is unchanged. A sign-out removes the entry, so a lookup that
//! finishes after it is dropped as well.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tower_sessions::Session;
use tracing::instrument;

use orchard_core::{Email, UserId};

use crate::backend::{
    AccessToken, AuthEvent, AuthService, BackendError, Gateway, NewProfile, SessionTokens,
};
use crate::models::{CurrentUser, session_keys};

/// Errors from identity operations.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// The auth service refused the request with a reason worth showing.
    #[error("{0}")]
    Rejected(String),

    #[error("Auth service error: {0}")]
    Backend(#[from] BackendError),

    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),
}

impl IdentityError {
    /// Message safe to show on the sign-in and sign-up pages.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidCredentials => self.to_string(),
            Self::Rejected(message) => message.clone(),
            Self::Backend(_) => "Authentication service unavailable. Please try again.".to_string(),
            Self::Session(_) => "Something went wrong. Please try again.".to_string(),
        }
    }

    fn from_sign_in(err: BackendError) -> Self {
        match err {
            BackendError::Unauthorized(_) => Self::InvalidCredentials,
            BackendError::Api { status, message } if (400..500).contains(&status) => {
                Self::Rejected(message)
            }
            other => Self::Backend(other),
        }
    }

    fn from_sign_up(err: BackendError) -> Self {
        match err {
            BackendError::Unauthorized(message) => Self::Rejected(message),
            BackendError::Api { status, message } if (400..500).contains(&status) => {
                Self::Rejected(message)
            }
            other => Self::Backend(other),
        }
    }
}

/// Identity as seen by one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum IdentityState {
    /// Not resolved yet.
    #[default]
    Loading,
    Anonymous,
    Authenticated { user: CurrentUser },
}

impl IdentityState {
    #[must_use]
    pub const fn user(&self) -> Option<&CurrentUser> {
        match self {
            Self::Authenticated { user } => Some(user),
            Self::Loading | Self::Anonymous => None,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.user().map(|user| user.id)
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.user().is_some_and(|user| user.is_admin)
    }
}

/// Handle to the auth-event listener. Dropping it (or calling
/// [`AuthSubscription::dispose`]) stops the listener.
#[derive(Debug)]
pub struct AuthSubscription {
    handle: JoinHandle<()>,
}

impl AuthSubscription {
    /// Stop listening.
    pub fn dispose(self) {
        drop(self);
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for AuthSubscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Debug, Clone, Copy)]
struct AdminEntry {
    epoch: u64,
    /// Last known flag; `None` until the first lookup lands.
    is_admin: Option<bool>,
}

/// Shared identity store. Cheap to clone.
#[derive(Clone)]
pub struct IdentityStore {
    inner: Arc<IdentityStoreInner>,
}

struct IdentityStoreInner {
    auth: Arc<dyn AuthService>,
    gateway: Arc<dyn Gateway>,
    directory: RwLock<HashMap<UserId, AdminEntry>>,
    next_epoch: AtomicU64,
}

impl IdentityStore {
    #[must_use]
    pub fn new(auth: Arc<dyn AuthService>, gateway: Arc<dyn Gateway>) -> Self {
        Self {
            inner: Arc::new(IdentityStoreInner {
                auth,
                gateway,
                directory: RwLock::new(HashMap::new()),
                next_epoch: AtomicU64::new(1),
            }),
        }
    }

    /// Start applying auth events to the directory. Must be called from
    /// within a Tokio runtime.
    #[must_use = "dropping the subscription stops the listener"]
    pub fn listen(&self) -> AuthSubscription {
        let mut events = self.inner.auth.subscribe();
        let store = self.clone();

        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => store.apply(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Auth event listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!("Auth event listener stopped");
        });

        AuthSubscription { handle }
    }

    /// Apply one auth event.
    pub async fn apply(&self, event: AuthEvent) {
        match event {
            AuthEvent::SignedIn(session) | AuthEvent::TokenRefreshed(session) => {
                let token = session.tokens.access();
                self.refresh_admin_flag(session.user.id, Some(&token)).await;
            }
            AuthEvent::SignedOut(user) => self.forget(user),
        }
    }

    /// Last known admin flag, without a lookup.
    #[must_use]
    pub fn cached_admin_flag(&self, user: UserId) -> Option<bool> {
        self.inner
            .directory
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user)
            .and_then(|entry| entry.is_admin)
    }

    /// Admin flag for `user`, looking it up if it is not known yet.
    pub async fn admin_flag(&self, user: UserId, token: Option<&AccessToken>) -> bool {
        match self.cached_admin_flag(user) {
            Some(is_admin) => is_admin,
            None => self.refresh_admin_flag(user, token).await,
        }
    }

    /// Look up the admin flag from the user's profile. A failed lookup
    /// means "not an admin".
    #[instrument(skip(self, token))]
    pub async fn refresh_admin_flag(&self, user: UserId, token: Option<&AccessToken>) -> bool {
        let epoch = self.begin_lookup(user);

        let is_admin = match self.inner.gateway.get_profile(token, user).await {
            Ok(profile) => profile.is_admin,
            Err(e) => {
                tracing::warn!(user_id = %user, error = %e, "Admin flag lookup failed");
                false
            }
        };

        if !self.finish_lookup(user, epoch, is_admin) {
            tracing::debug!(user_id = %user, "Discarded stale admin flag lookup");
        }
        is_admin
    }

    fn begin_lookup(&self, user: UserId) -> u64 {
        let epoch = self.inner.next_epoch.fetch_add(1, Ordering::Relaxed);
        let mut directory = self
            .inner
            .directory
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let previous = directory.get(&user).and_then(|entry| entry.is_admin);
        directory.insert(
            user,
            AdminEntry {
                epoch,
                is_admin: previous,
            },
        );
        epoch
    }

    /// Write a lookup result back if it is still current.
    fn finish_lookup(&self, user: UserId, epoch: u64, is_admin: bool) -> bool {
        let mut directory = self
            .inner
            .directory
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match directory.get_mut(&user) {
            Some(entry) if entry.epoch == epoch => {
                entry.is_admin = Some(is_admin);
                true
            }
            _ => false,
        }
    }

    /// Record a flag known without a lookup (a fresh account).
    fn settle(&self, user: UserId, is_admin: bool) {
        let epoch = self.begin_lookup(user);
        self.finish_lookup(user, epoch, is_admin);
    }

    fn forget(&self, user: UserId) {
        self.inner
            .directory
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&user);
    }

    /// Resolve the identity behind a session.
    ///
    /// An expired access token is refreshed once; an identity seen for the
    /// first time is confirmed with the auth service. Anything the auth
    /// service rejects clears the session identity.
    #[instrument(skip(self, session))]
    pub async fn resolve(&self, session: &Session) -> IdentityState {
        let Some((mut user, tokens)) = load_identity(session).await else {
            return IdentityState::Anonymous;
        };

        let Some(tokens) = self.current_tokens(session, &user, tokens).await else {
            if let Err(e) = clear_identity(session).await {
                tracing::warn!(error = %e, "Failed to clear rejected session identity");
            }
            return IdentityState::Anonymous;
        };

        user.is_admin = self.admin_flag(user.id, Some(&tokens.access())).await;
        IdentityState::Authenticated { user }
    }

    async fn current_tokens(
        &self,
        session: &Session,
        user: &CurrentUser,
        tokens: SessionTokens,
    ) -> Option<SessionTokens> {
        if tokens.is_expired() {
            return self.refresh_tokens(session, &tokens).await;
        }
        if self.cached_admin_flag(user.id).is_some() {
            return Some(tokens);
        }

        match self.inner.auth.get_user(&tokens.access()).await {
            Ok(found) if found.id == user.id => Some(tokens),
            Ok(found) => {
                tracing::warn!(expected = %user.id, found = %found.id, "Session token belongs to another user");
                None
            }
            Err(e) if e.is_unauthorized() => self.refresh_tokens(session, &tokens).await,
            Err(e) => {
                tracing::warn!(error = %e, "Could not confirm session with auth service");
                Some(tokens)
            }
        }
    }

    async fn refresh_tokens(
        &self,
        session: &Session,
        tokens: &SessionTokens,
    ) -> Option<SessionTokens> {
        match self.inner.auth.refresh(&tokens.refresh_token).await {
            Ok(fresh) => {
                if let Err(e) = session.insert(session_keys::AUTH_TOKENS, &fresh.tokens).await {
                    tracing::warn!(error = %e, "Failed to store refreshed tokens");
                }
                Some(fresh.tokens)
            }
            Err(e) => {
                tracing::info!(error = %e, "Session refresh rejected");
                None
            }
        }
    }

    /// Sign in with email and password and record the identity in the
    /// session.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCredentials` for a wrong email or password.
    #[instrument(skip(self, session, password), fields(email = %email))]
    pub async fn sign_in(
        &self,
        session: &Session,
        email: &Email,
        password: &str,
    ) -> Result<CurrentUser, IdentityError> {
        let signed_in = self
            .inner
            .auth
            .sign_in(email.as_str(), password)
            .await
            .map_err(IdentityError::from_sign_in)?;

        let token = signed_in.tokens.access();
        let is_admin = self.refresh_admin_flag(signed_in.user.id, Some(&token)).await;
        let user = CurrentUser {
            id: signed_in.user.id,
            email: signed_in
                .user
                .email
                .unwrap_or_else(|| email.as_str().to_string()),
            is_admin,
        };

        session.cycle_id().await?;
        store_identity(session, &user, &signed_in.tokens).await?;
        Ok(user)
    }

    /// Create an account and its non-admin profile row. Returns the signed
    /// in user when the account is usable right away, `None` while an
    /// email confirmation is pending.
    ///
    /// A failure to create the profile row is logged, not returned.
    ///
    /// # Errors
    ///
    /// Returns `Rejected` when the auth service refuses the sign-up.
    #[instrument(skip(self, session, password), fields(email = %email))]
    pub async fn sign_up(
        &self,
        session: &Session,
        email: &Email,
        password: &str,
    ) -> Result<Option<CurrentUser>, IdentityError> {
        let outcome = self
            .inner
            .auth
            .sign_up(email.as_str(), password)
            .await
            .map_err(IdentityError::from_sign_up)?;

        let token = outcome.session.as_ref().map(|s| s.tokens.access());
        let profile = NewProfile {
            id: outcome.user.id,
            email: email.as_str().to_string(),
            is_admin: false,
        };
        if let Err(e) = self.inner.gateway.create_profile(token.as_ref(), &profile).await {
            tracing::error!(user_id = %profile.id, error = %e, "Failed to create profile after sign-up");
        }

        let Some(signed_in) = outcome.session else {
            return Ok(None);
        };

        self.settle(profile.id, false);
        let user = CurrentUser {
            id: profile.id,
            email: profile.email,
            is_admin: false,
        };
        session.cycle_id().await?;
        store_identity(session, &user, &signed_in.tokens).await?;
        Ok(Some(user))
    }

    /// Sign out. The session identity is cleared even if the auth service
    /// call fails; the cart is kept.
    ///
    /// # Errors
    ///
    /// Returns an error only if the session cannot be modified.
    #[instrument(skip(self, session))]
    pub async fn sign_out(&self, session: &Session) -> Result<(), IdentityError> {
        if let Some((user, tokens)) = load_identity(session).await {
            if let Err(e) = self.inner.auth.sign_out(user.id, &tokens.access()).await {
                tracing::warn!(user_id = %user.id, error = %e, "Auth service sign-out failed");
            }
            self.forget(user.id);
        }
        clear_identity(session).await?;
        Ok(())
    }

    /// The access token for gateway calls made on the visitor's behalf.
    pub async fn access_token(session: &Session) -> Option<AccessToken> {
        session
            .get::<SessionTokens>(session_keys::AUTH_TOKENS)
            .await
            .ok()
            .flatten()
            .map(|tokens| tokens.access())
    }
}

async fn load_identity(session: &Session) -> Option<(CurrentUser, SessionTokens)> {
    let user = session
        .get::<CurrentUser>(session_keys::CURRENT_USER)
        .await
        .ok()
        .flatten()?;
    let tokens = session
        .get::<SessionTokens>(session_keys::AUTH_TOKENS)
        .await
        .ok()
        .flatten()?;
    Some((user, tokens))
}

async fn store_identity(
    session: &Session,
    user: &CurrentUser,
    tokens: &SessionTokens,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(session_keys::CURRENT_USER, user).await?;
    session.insert(session_keys::AUTH_TOKENS, tokens).await
}

async fn clear_identity(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session
        .remove::<CurrentUser>(session_keys::CURRENT_USER)
        .await?;
    session
        .remove::<SessionTokens>(session_keys::AUTH_TOKENS)
        .await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn user(is_admin: bool) -> CurrentUser {
        CurrentUser {
            id: UserId::random(),
            email: "grower@orchard.test".to_string(),
            is_admin,
        }
    }

    /// Backend whose every call fails.
    struct Offline;

    fn offline() -> BackendError {
        BackendError::Config("offline".to_string())
    }

    #[async_trait::async_trait]
    impl Gateway for Offline {
        async fn list_products(&self) -> Result<Vec<orchard_core::Product>, BackendError> {
            Err(offline())
        }
        async fn get_product(
            &self,
            _: orchard_core::ProductId,
        ) -> Result<orchard_core::Product, BackendError> {
            Err(offline())
        }
        async fn create_product(
            &self,
            _: Option<&AccessToken>,
            _: &orchard_core::ProductDraft,
        ) -> Result<orchard_core::Product, BackendError> {
            Err(offline())
        }
        async fn update_product(
            &self,
            _: Option<&AccessToken>,
            _: orchard_core::ProductId,
            _: &orchard_core::ProductDraft,
        ) -> Result<orchard_core::Product, BackendError> {
            Err(offline())
        }
        async fn delete_product(
            &self,
            _: Option<&AccessToken>,
            _: orchard_core::ProductId,
        ) -> Result<(), BackendError> {
            Err(offline())
        }
        async fn create_order(
            &self,
            _: Option<&AccessToken>,
            _: &orchard_core::NewOrder,
        ) -> Result<orchard_core::Order, BackendError> {
            Err(offline())
        }
        async fn list_orders(
            &self,
            _: Option<&AccessToken>,
            _: UserId,
        ) -> Result<Vec<orchard_core::Order>, BackendError> {
            Err(offline())
        }
        async fn get_order(
            &self,
            _: Option<&AccessToken>,
            _: orchard_core::OrderId,
        ) -> Result<orchard_core::Order, BackendError> {
            Err(offline())
        }
        async fn get_profile(
            &self,
            _: Option<&AccessToken>,
            _: UserId,
        ) -> Result<crate::backend::Profile, BackendError> {
            Err(offline())
        }
        async fn create_profile(
            &self,
            _: Option<&AccessToken>,
            _: &NewProfile,
        ) -> Result<(), BackendError> {
            Err(offline())
        }
    }

    #[async_trait::async_trait]
    impl AuthService for Offline {
        async fn sign_up(
            &self,
            _: &str,
            _: &str,
        ) -> Result<crate::backend::SignUpOutcome, BackendError> {
            Err(offline())
        }
        async fn sign_in(&self, _: &str, _: &str) -> Result<crate::backend::AuthSession, BackendError> {
            Err(offline())
        }
        async fn sign_out(&self, _: UserId, _: &AccessToken) -> Result<(), BackendError> {
            Err(offline())
        }
        async fn get_user(&self, _: &AccessToken) -> Result<crate::backend::AuthUser, BackendError> {
            Err(offline())
        }
        async fn refresh(&self, _: &str) -> Result<crate::backend::AuthSession, BackendError> {
            Err(offline())
        }
        fn subscribe(&self) -> tokio::sync::broadcast::Receiver<AuthEvent> {
            crate::backend::AuthEventBus::new().subscribe()
        }
    }

    fn store() -> IdentityStore {
        let backend = Arc::new(Offline);
        IdentityStore::new(backend.clone(), backend)
    }

    #[test]
    fn test_newer_lookup_wins_over_late_one() {
        let store = store();
        let id = UserId::random();

        let first = store.begin_lookup(id);
        let second = store.begin_lookup(id);

        assert!(store.finish_lookup(id, second, false));
        assert!(!store.finish_lookup(id, first, true));
        assert_eq!(store.cached_admin_flag(id), Some(false));
    }

    #[test]
    fn test_lookup_finishing_after_sign_out_is_dropped() {
        let store = store();
        let id = UserId::random();

        let epoch = store.begin_lookup(id);
        store.forget(id);

        assert!(!store.finish_lookup(id, epoch, true));
        assert_eq!(store.cached_admin_flag(id), None);
    }

    #[test]
    fn test_known_flag_survives_while_lookup_is_in_flight() {
        let store = store();
        let id = UserId::random();
        store.settle(id, true);

        let _pending = store.begin_lookup(id);
        assert_eq!(store.cached_admin_flag(id), Some(true));
    }

    #[tokio::test]
    async fn test_failed_lookup_degrades_to_non_admin() {
        let store = store();
        let id = UserId::random();

        assert!(!store.admin_flag(id, None).await);
        assert_eq!(store.cached_admin_flag(id), Some(false));
    }

    #[test]
    fn test_identity_state_accessors() {
        assert_eq!(IdentityState::default(), IdentityState::Loading);
        assert_eq!(IdentityState::Anonymous.user_id(), None);

        let admin = user(true);
        let state = IdentityState::Authenticated {
            user: admin.clone(),
        };
        assert_eq!(state.user_id(), Some(admin.id));
        assert!(state.is_admin());
        assert!(!IdentityState::Authenticated { user: user(false) }.is_admin());
    }

    #[test]
    fn test_sign_in_errors_map_to_messages() {
        let err = IdentityError::from_sign_in(BackendError::Unauthorized("nope".into()));
        assert!(matches!(err, IdentityError::InvalidCredentials));
        assert_eq!(err.user_message(), "Invalid email or password");

        let err = IdentityError::from_sign_up(BackendError::Api {
            status: 422,
            message: "User already registered".into(),
        });
        assert_eq!(err.user_message(), "User already registered");

        let err = IdentityError::from_sign_in(BackendError::Api {
            status: 503,
            message: "down".into(),
        });
        assert!(matches!(err, IdentityError::Backend(_)));
        assert!(!err.user_message().contains("down"));
    }
}
