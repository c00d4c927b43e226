//! Business logic services for storefront.
//!
//! # Services
//!
//! - `identity` - Who is signed in, admin flags, auth-event listener
//! - `cart` - The session-held cart
//! - `payment` - Payment authorization (simulated)
//! - `checkout` - Validate, pay, save the order

pub mod cart;
pub mod checkout;
pub mod identity;
pub mod payment;

pub use cart::CartStore;
pub use checkout::{CheckoutError, CheckoutService};
pub use identity::{AuthSubscription, IdentityError, IdentityState, IdentityStore};
pub use payment::{PaymentError, PaymentMethod, PaymentProcessor, PaymentReference, SimulatedPayment};
