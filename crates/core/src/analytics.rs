//! Dashboard aggregations over a customer's order history.
//!
//! All functions are deterministic reductions over an already-fetched list
//! of orders.

use chrono::{DateTime, Datelike, Utc};

use crate::order::Order;
use crate::types::{OrderStatus, Price};

/// Label used for lines whose product row no longer exists.
pub const UNKNOWN_PRODUCT: &str = "Unknown product";

/// Default number of slices in the "top fruits" chart.
pub const TOP_PRODUCTS_LIMIT: usize = 5;

/// Units purchased of one product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductCount {
    pub name: String,
    pub count: u32,
}

/// Spend in one calendar month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthlySpend {
    /// `"{month}/{year}"`, e.g. `"3/2025"`.
    pub month: String,
    pub amount: Price,
}

/// Headline numbers for the dashboard cards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSummary {
    pub total_orders: usize,
    pub lifetime_spend: Price,
    pub latest: Option<(DateTime<Utc>, OrderStatus)>,
}

/// Units purchased per product name, most purchased first, truncated to
/// `limit`. Ties keep first-seen order.
#[must_use]
pub fn top_products(orders: &[Order], limit: usize) -> Vec<ProductCount> {
    let mut counts: Vec<ProductCount> = Vec::new();

    for line in orders.iter().flat_map(|order| &order.lines) {
        let name = line.product_name().unwrap_or(UNKNOWN_PRODUCT);
        match counts.iter_mut().find(|entry| entry.name == name) {
            Some(entry) => entry.count += line.quantity,
            None => counts.push(ProductCount {
                name: name.to_string(),
                count: line.quantity,
            }),
        }
    }

    // stable: equal counts stay in first-seen order
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts.truncate(limit);
    counts
}

/// Month bucket key for a timestamp (UTC).
#[must_use]
pub fn month_key(at: &DateTime<Utc>) -> String {
    format!("{}/{}", at.month(), at.year())
}

/// Order totals summed per calendar month, buckets in first-seen order.
#[must_use]
pub fn monthly_spending(orders: &[Order]) -> Vec<MonthlySpend> {
    let mut buckets: Vec<MonthlySpend> = Vec::new();

    for order in orders {
        let key = month_key(&order.created_at);
        match buckets.iter_mut().find(|bucket| bucket.month == key) {
            Some(bucket) => bucket.amount = bucket.amount + order.total_amount,
            None => buckets.push(MonthlySpend {
                month: key,
                amount: order.total_amount,
            }),
        }
    }

    buckets
}

/// Card numbers. `orders` is expected newest first, as the gateway
/// returns them.
#[must_use]
pub fn order_summary(orders: &[Order]) -> OrderSummary {
    OrderSummary {
        total_orders: orders.len(),
        lifetime_spend: orders.iter().map(|order| order.total_amount).sum(),
        latest: orders.first().map(|order| (order.created_at, order.status)),
    }
}
