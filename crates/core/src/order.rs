//! Orders and their line items.
//!
//! Field names follow the backend's `orders` / `order_line_items` columns;
//! the joined product snapshot arrives under `products` when the order is
//! read with its lines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::Product;
use crate::types::{OrderId, OrderLineId, OrderStatus, Price, ProductId, UserId};

/// A placed order, read back with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub total_amount: Price,
    pub shipping_address: String,
    pub status: OrderStatus,
    #[serde(default)]
    pub payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, rename = "order_line_items")]
    pub lines: Vec<OrderLine>,
}

impl Order {
    /// Units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lines.iter().map(|line| line.quantity).sum()
    }
}

/// One line of a placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: OrderLineId,
    pub product_id: ProductId,
    pub quantity: u32,
    /// Unit price at purchase time.
    pub price: Price,
    /// Joined product row; absent if the product was deleted since.
    #[serde(default, rename = "products")]
    pub product: Option<Product>,
}

impl OrderLine {
    #[must_use]
    pub fn product_name(&self) -> Option<&str> {
        self.product.as_ref().map(|p| p.name.as_str())
    }
}

/// Insert payload for the `orders` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewOrder {
    pub user_id: UserId,
    pub total_amount: Price,
    pub shipping_address: String,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    /// Written to `order_line_items` after the order row exists.
    #[serde(skip)]
    pub lines: Vec<NewOrderLine>,
}

/// Insert payload for one `order_line_items` row (the `order_id` is added
/// by the gateway once the order row has been created).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Price,
}
