//! Checkout: validate shipping details, authorize payment, save the order.

use std::sync::Arc;

use thiserror::Error;
use tracing::instrument;

use orchard_core::checkout::{CheckoutBlock, CheckoutStage, StageError, checkout_gate};
use orchard_core::forms::{ShippingForm, ValidationErrors};
use orchard_core::{Cart, NewOrder, Order, OrderStatus};

use super::payment::{PaymentError, PaymentMethod, PaymentProcessor};
use crate::backend::{AccessToken, BackendError, Gateway};
use crate::models::CurrentUser;

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("{}", .0.message())]
    Blocked(CheckoutBlock),

    #[error("Invalid shipping details: {0}")]
    Validation(ValidationErrors),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error("Failed to save order: {0}")]
    Save(#[source] BackendError),

    #[error(transparent)]
    Stage(#[from] StageError),
}

impl CheckoutError {
    /// Message shown on the checkout page.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Blocked(block) => block.message().to_string(),
            Self::Validation(_) => "Please correct the highlighted fields.".to_string(),
            Self::Payment(_) => "Payment failed. Please try again.".to_string(),
            Self::Save(_) | Self::Stage(_) => {
                "Failed to save your order. Please try again.".to_string()
            }
        }
    }
}

/// Runs one checkout per call. Holds no per-run state.
#[derive(Clone)]
pub struct CheckoutService {
    gateway: Arc<dyn Gateway>,
    payments: Arc<dyn PaymentProcessor>,
}

impl CheckoutService {
    #[must_use]
    pub fn new(gateway: Arc<dyn Gateway>, payments: Arc<dyn PaymentProcessor>) -> Self {
        Self { gateway, payments }
    }

    /// Place an order for everything in `cart`.
    ///
    /// On success the order is saved as paid with the payment reference. The
    /// cart is never touched here; clearing it is the caller's job once the
    /// order exists.
    ///
    /// # Errors
    ///
    /// Returns the first failing step. A failure leaves no order behind
    /// except when saving fails after payment, which is logged.
    #[instrument(skip_all, fields(user_id = %user.id, items = cart.item_count()))]
    pub async fn place_order(
        &self,
        user: &CurrentUser,
        token: Option<&AccessToken>,
        cart: &Cart,
        form: &ShippingForm,
    ) -> Result<Order, CheckoutError> {
        let mut stage = CheckoutStage::Idle;
        let result = self.run(&mut stage, user, token, cart, form).await;

        match &result {
            Ok(order) => tracing::info!(order_id = %order.id, total = %order.total_amount, "Order placed"),
            Err(e) => {
                tracing::warn!(failed_at = ?stage, error = %e, "Checkout failed");
                stage = stage.fail();
            }
        }
        tracing::debug!(stage = ?stage, "Checkout finished");
        result
    }

    async fn run(
        &self,
        stage: &mut CheckoutStage,
        user: &CurrentUser,
        token: Option<&AccessToken>,
        cart: &Cart,
        form: &ShippingForm,
    ) -> Result<Order, CheckoutError> {
        *stage = stage.advance(CheckoutStage::Validating)?;
        let user_id = checkout_gate(Some(user.id), cart).map_err(CheckoutError::Blocked)?;
        let shipping = form.validate().map_err(CheckoutError::Validation)?;

        *stage = stage.advance(CheckoutStage::ProcessingPayment)?;
        let total = cart.total();
        let method = PaymentMethod::Card {
            holder: shipping.full_name.clone(),
        };
        let payment = self.payments.authorize(total, &method).await?;

        *stage = stage.advance(CheckoutStage::SavingOrder)?;
        let new_order = NewOrder {
            user_id,
            total_amount: total,
            shipping_address: shipping.flattened(),
            status: OrderStatus::Paid,
            payment_id: Some(payment.to_string()),
            lines: cart.to_new_order_lines(),
        };
        let order = self
            .gateway
            .create_order(token, &new_order)
            .await
            .map_err(|e| {
                tracing::error!(payment_id = %payment, error = %e, "Payment authorized but order not saved");
                CheckoutError::Save(e)
            })?;

        *stage = stage.advance(CheckoutStage::Done(order.id))?;
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages_hide_details() {
        let err = CheckoutError::Save(BackendError::Api {
            status: 500,
            message: "relation \"orders\" does not exist".to_string(),
        });
        assert_eq!(err.user_message(), "Failed to save your order. Please try again.");

        let err = CheckoutError::Payment(PaymentError::Declined("insufficient funds".into()));
        assert_eq!(err.user_message(), "Payment failed. Please try again.");

        let err = CheckoutError::Blocked(CheckoutBlock::EmptyCart);
        assert_eq!(err.to_string(), CheckoutBlock::EmptyCart.message());
    }
}
