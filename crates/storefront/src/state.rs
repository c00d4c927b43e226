//! Application state shared across handlers.

use std::sync::Arc;

use crate::backend::{AuthService, BackendError, Gateway, SupabaseClient};
use crate::config::StorefrontConfig;
use crate::services::{CheckoutService, IdentityStore, PaymentProcessor, SimulatedPayment};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// backend gateway, the identity store and the checkout service.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    gateway: Arc<dyn Gateway>,
    identity: IdentityStore,
    checkout: CheckoutService,
}

impl AppState {
    /// Assemble state from explicit parts. Tests pass in-memory fakes here.
    #[must_use]
    pub fn new(
        config: StorefrontConfig,
        gateway: Arc<dyn Gateway>,
        auth: Arc<dyn AuthService>,
        payments: Arc<dyn PaymentProcessor>,
    ) -> Self {
        let identity = IdentityStore::new(auth, Arc::clone(&gateway));
        let checkout = CheckoutService::new(Arc::clone(&gateway), payments);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                gateway,
                identity,
                checkout,
            }),
        }
    }

    /// Production state: the REST backend client and the simulated payment
    /// processor.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend client cannot be built.
    pub fn from_config(config: StorefrontConfig) -> Result<Self, BackendError> {
        let client = Arc::new(SupabaseClient::new(&config.backend)?);
        let payments = Arc::new(SimulatedPayment::new(config.payment_delay));
        Ok(Self::new(config, client.clone(), client, payments))
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the backend gateway.
    #[must_use]
    pub fn gateway(&self) -> &dyn Gateway {
        self.inner.gateway.as_ref()
    }

    #[must_use]
    pub fn identity(&self) -> &IdentityStore {
        &self.inner.identity
    }

    #[must_use]
    pub fn checkout(&self) -> &CheckoutService {
        &self.inner.checkout
    }
}
