//! Checkout stage machine and entry gate.
//!
//! ```text
//! Idle -> Validating -> ProcessingPayment -> SavingOrder -> Done(order)
//!   ^         |                |                  |
//!   +---------+----------------+------------------+   (any failure)
//! ```

use crate::cart::Cart;
use crate::types::{OrderId, UserId};

/// Path a blocked checkout sends the visitor to when nobody is signed in.
pub const SIGN_IN_PATH: &str = "/signin";

/// Path a blocked checkout sends the visitor to when the cart is empty.
pub const CATALOG_PATH: &str = "/products";

/// Where checkout is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckoutStage {
    #[default]
    Idle,
    Validating,
    ProcessingPayment,
    SavingOrder,
    Done(OrderId),
}

/// Attempted an out-of-order transition.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot move checkout from {from:?} to {to:?}")]
pub struct StageError {
    pub from: CheckoutStage,
    pub to: CheckoutStage,
}

impl CheckoutStage {
    /// Move forward one stage. Only the transitions in the diagram are
    /// allowed; a finished run cannot be restarted.
    ///
    /// # Errors
    ///
    /// Returns [`StageError`] for any other transition.
    pub const fn advance(self, to: Self) -> Result<Self, StageError> {
        match (self, to) {
            (Self::Idle, Self::Validating)
            | (Self::Validating, Self::ProcessingPayment)
            | (Self::ProcessingPayment, Self::SavingOrder)
            | (Self::SavingOrder, Self::Done(_)) => Ok(to),
            _ => Err(StageError { from: self, to }),
        }
    }

    /// Abort the run. Every in-flight stage fails back to `Idle`; a
    /// completed run stays done.
    #[must_use]
    pub const fn fail(self) -> Self {
        match self {
            Self::Done(id) => Self::Done(id),
            _ => Self::Idle,
        }
    }

    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }
}

/// Why checkout may not be entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutBlock {
    /// Nobody is signed in.
    SignInRequired,
    /// The cart has no lines.
    EmptyCart,
}

impl CheckoutBlock {
    /// Redirect target for this block.
    #[must_use]
    pub const fn redirect_to(&self) -> &'static str {
        match self {
            Self::SignInRequired => SIGN_IN_PATH,
            Self::EmptyCart => CATALOG_PATH,
        }
    }

    /// Notification shown after the redirect.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::SignInRequired => "Please sign in to proceed to checkout",
            Self::EmptyCart => "Your cart is empty. Add some items before checkout.",
        }
    }
}

/// Decide whether checkout may be entered. Identity is checked first; each
/// condition blocks on its own.
///
/// # Errors
///
/// Returns the [`CheckoutBlock`] that applies.
pub fn checkout_gate(user: Option<UserId>, cart: &Cart) -> Result<UserId, CheckoutBlock> {
    let user = user.ok_or(CheckoutBlock::SignInRequired)?;
    if cart.is_empty() {
        return Err(CheckoutBlock::EmptyCart);
    }
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::fruit;

    fn filled_cart() -> Cart {
        let mut cart = Cart::new();
        cart.add(&fruit(1, "Fig", "Soft and honeyed", 200), 1);
        cart
    }

    #[test]
    fn gate_requires_identity_regardless_of_cart() {
        assert_eq!(checkout_gate(None, &filled_cart()), Err(CheckoutBlock::SignInRequired));
        assert_eq!(checkout_gate(None, &Cart::new()), Err(CheckoutBlock::SignInRequired));
        assert_eq!(CheckoutBlock::SignInRequired.redirect_to(), "/signin");
    }

    #[test]
    fn gate_requires_items_for_signed_in_user() {
        let user = UserId::random();
        assert_eq!(checkout_gate(Some(user), &Cart::new()), Err(CheckoutBlock::EmptyCart));
        assert_eq!(CheckoutBlock::EmptyCart.redirect_to(), "/products");
        assert_eq!(checkout_gate(Some(user), &filled_cart()), Ok(user));
    }

    #[test]
    fn stages_advance_in_order() {
        let order = OrderId::random();
        let stage = CheckoutStage::Idle
            .advance(CheckoutStage::Validating)
            .and_then(|s| s.advance(CheckoutStage::ProcessingPayment))
            .and_then(|s| s.advance(CheckoutStage::SavingOrder))
            .and_then(|s| s.advance(CheckoutStage::Done(order)));
        assert_eq!(stage, Ok(CheckoutStage::Done(order)));
    }

    #[test]
    fn skipping_a_stage_is_rejected() {
        let err = CheckoutStage::Validating.advance(CheckoutStage::SavingOrder);
        assert!(err.is_err());
        assert!(CheckoutStage::Done(OrderId::random())
            .advance(CheckoutStage::Validating)
            .is_err());
    }

    #[test]
    fn failure_returns_to_idle() {
        assert_eq!(CheckoutStage::SavingOrder.fail(), CheckoutStage::Idle);
        assert_eq!(CheckoutStage::ProcessingPayment.fail(), CheckoutStage::Idle);
        assert!(CheckoutStage::Done(OrderId::random()).fail().is_done());
    }
}
