//! Hosted backend access: the table API and the auth service.
//!
//! # Architecture
//!
//! - [`Gateway`] covers every table read and write the storefront makes
//!   (products, orders with their lines, profiles)
//! - [`AuthService`] covers sign-up, sign-in, sign-out, session refresh and
//!   auth-state notifications
//! - [`SupabaseClient`] implements both over the backend's REST surface with
//!   `reqwest`; tests substitute an in-memory fake
//!
//! Every operation returns `Result<T, BackendError>`. Nothing here retries,
//! caches or paginates: one call is one request.

mod supabase;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use orchard_core::{NewOrder, Order, Product, ProductDraft, ProductId, OrderId, UserId};

pub use supabase::SupabaseClient;
pub use types::{
    AccessToken, AuthSession, AuthUser, NewProfile, Profile, SessionTokens, SignUpOutcome,
};

/// Pending auth events kept per subscriber before the slowest one lags.
const AUTH_EVENT_CAPACITY: usize = 64;

/// Errors that can occur when talking to the backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Credentials or access token rejected.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Record not found (or a single-row read matched nothing).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by the backend.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Client could not be built from its configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl BackendError {
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

/// Table operations.
///
/// `auth` is the caller's access token; `None` falls back to the client's
/// own API key (anon key in the storefront, service-role key in the CLI).
#[async_trait]
pub trait Gateway: Send + Sync {
    /// All products, ordered by name.
    async fn list_products(&self) -> Result<Vec<Product>, BackendError>;

    /// One product by id.
    async fn get_product(&self, id: ProductId) -> Result<Product, BackendError>;

    /// Insert a product and return the stored row.
    async fn create_product(
        &self,
        auth: Option<&AccessToken>,
        draft: &ProductDraft,
    ) -> Result<Product, BackendError>;

    /// Replace a product's editable fields and return the stored row.
    async fn update_product(
        &self,
        auth: Option<&AccessToken>,
        id: ProductId,
        draft: &ProductDraft,
    ) -> Result<Product, BackendError>;

    async fn delete_product(
        &self,
        auth: Option<&AccessToken>,
        id: ProductId,
    ) -> Result<(), BackendError>;

    /// Insert the order row, then its lines. The returned order carries the
    /// inserted lines (without joined products).
    async fn create_order(
        &self,
        auth: Option<&AccessToken>,
        order: &NewOrder,
    ) -> Result<Order, BackendError>;

    /// A user's orders with lines and joined products, newest first.
    async fn list_orders(
        &self,
        auth: Option<&AccessToken>,
        user: UserId,
    ) -> Result<Vec<Order>, BackendError>;

    async fn get_order(
        &self,
        auth: Option<&AccessToken>,
        id: OrderId,
    ) -> Result<Order, BackendError>;

    async fn get_profile(
        &self,
        auth: Option<&AccessToken>,
        user: UserId,
    ) -> Result<Profile, BackendError>;

    async fn create_profile(
        &self,
        auth: Option<&AccessToken>,
        profile: &NewProfile,
    ) -> Result<(), BackendError>;
}

/// Auth-state change, broadcast to every subscriber.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    SignedIn(AuthSession),
    SignedOut(UserId),
    TokenRefreshed(AuthSession),
}

impl AuthEvent {
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        match self {
            Self::SignedIn(session) | Self::TokenRefreshed(session) => session.user.id,
            Self::SignedOut(id) => *id,
        }
    }
}

/// Credential operations against the auth service.
///
/// Implementations emit an [`AuthEvent`] after each successful sign-in,
/// sign-out and refresh.
#[async_trait]
pub trait AuthService: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, BackendError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, BackendError>;

    async fn sign_out(&self, user: UserId, token: &AccessToken) -> Result<(), BackendError>;

    /// The user the access token belongs to.
    async fn get_user(&self, token: &AccessToken) -> Result<AuthUser, BackendError>;

    /// Exchange a refresh token for a new session.
    async fn refresh(&self, refresh_token: &str) -> Result<AuthSession, BackendError>;

    /// Receive every auth event emitted from now on.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

/// Fan-out channel for [`AuthEvent`]s.
#[derive(Debug, Clone)]
pub struct AuthEventBus {
    tx: broadcast::Sender<AuthEvent>,
}

impl AuthEventBus {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self { tx }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn emit(&self, event: AuthEvent) {
        let _ = self.tx.send(event);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.tx.subscribe()
    }
}

impl Default for AuthEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::NotFound("product 9".to_string());
        assert_eq!(err.to_string(), "Not found: product 9");
        assert!(err.is_not_found());

        let err = BackendError::RateLimited(30);
        assert_eq!(err.to_string(), "Rate limited, retry after 30 seconds");
    }

    #[tokio::test]
    async fn test_event_bus_reaches_every_subscriber() {
        let bus = AuthEventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        let user = UserId::random();

        bus.emit(AuthEvent::SignedOut(user));

        assert_eq!(first.recv().await.map(|e| e.user_id()).ok(), Some(user));
        assert_eq!(second.recv().await.map(|e| e.user_id()).ok(), Some(user));
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        AuthEventBus::default().emit(AuthEvent::SignedOut(UserId::random()));
    }
}
