//! Orchard Core - shared domain types and pure storefront logic.
//!
//! This crate is used by:
//! - `storefront` - the server-rendered shop and admin panel
//! - `cli` - operator tooling (catalog seeding, admin flags)
//!
//! # Architecture
//!
//! The core crate contains only types, reducers and validation - no I/O, no
//! HTTP clients. Everything here can be exercised with plain unit tests.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, prices, emails, and statuses
//! - [`catalog`] - Products, client-side search and sort
//! - [`cart`] - The cart reducer
//! - [`order`] - Orders, order lines, insert payloads
//! - [`checkout`] - Checkout stage machine and entry gate
//! - [`forms`] - Form validation with field-level messages
//! - [`analytics`] - Dashboard aggregations

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod analytics;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod forms;
pub mod order;
pub mod types;

pub use cart::{Cart, CartError, CartLine, MAX_LINE_QUANTITY};
pub use catalog::{Product, ProductDraft, SortOption};
pub use order::{NewOrder, NewOrderLine, Order, OrderLine};
pub use types::*;
