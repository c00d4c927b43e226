//! Payment authorization.
//!
//! The store does not take real payments. [`SimulatedPayment`] stands in
//! for a processor: it waits a fixed delay and always authorizes. Anything
//! implementing [`PaymentProcessor`] can replace it without touching the
//! checkout flow.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rand::distr::Alphanumeric;
use thiserror::Error;

use orchard_core::Price;

/// Prefix of every simulated payment reference.
pub const REFERENCE_PREFIX: &str = "pay_";

const REFERENCE_SUFFIX_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    #[error("Payment declined: {0}")]
    Declined(String),

    #[error("Payment processor unavailable: {0}")]
    Unavailable(String),
}

/// How the customer pays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentMethod {
    /// Card payment in the cardholder's name.
    Card { holder: String },
}

/// Opaque processor reference stored on the order as `payment_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PaymentReference(String);

impl PaymentReference {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PaymentReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Authorize `amount` against `method`.
    async fn authorize(
        &self,
        amount: Price,
        method: &PaymentMethod,
    ) -> Result<PaymentReference, PaymentError>;
}

/// Always-successful processor with a fixed latency.
#[derive(Debug, Clone)]
pub struct SimulatedPayment {
    delay: Duration,
}

impl SimulatedPayment {
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl PaymentProcessor for SimulatedPayment {
    #[tracing::instrument(skip(self, _method), fields(amount = %amount))]
    async fn authorize(
        &self,
        amount: Price,
        _method: &PaymentMethod,
    ) -> Result<PaymentReference, PaymentError> {
        tokio::time::sleep(self.delay).await;

        let reference = PaymentReference(format!("{REFERENCE_PREFIX}{}", random_suffix()));
        tracing::info!(payment_id = %reference, "Simulated payment authorized");
        Ok(reference)
    }
}

/// Lowercase alphanumerics for the reference suffix.
fn random_suffix() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(REFERENCE_SUFFIX_LEN)
        .map(|byte| char::from(byte).to_ascii_lowercase())
        .collect()
}
