//! Customer dashboard: order history and spending charts.

use askama::Template;
use askama_web::WebTemplate;
use axum::{extract::State, response::IntoResponse};
use tower_sessions::Session;
use tracing::instrument;

use orchard_core::{Order, OrderLine, Price};
use orchard_core::analytics::{
    MonthlySpend, OrderSummary, ProductCount, TOP_PRODUCTS_LIMIT, UNKNOWN_PRODUCT,
    monthly_spending, order_summary, top_products,
};

use crate::filters;
use crate::layout::Shell;
use crate::middleware::RequireAuth;
use crate::services::IdentityStore;
use crate::state::AppState;

/// Dashboard page template.
#[derive(Template, WebTemplate)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    pub shell: Shell,
    pub orders: Vec<Order>,
    pub summary: OrderSummary,
    pub top_products: Vec<ProductCount>,
    pub monthly: Vec<MonthlySpend>,
    /// Largest monthly amount, for scaling the bar chart.
    pub monthly_peak: Price,
    pub error: Option<String>,
}

impl DashboardTemplate {
    /// Bar width for a month, as a percentage of the busiest month.
    #[must_use]
    pub fn bar_percent(&self, spend: &MonthlySpend) -> u32 {
        spend.amount.percent_of(self.monthly_peak)
    }

    /// Name for an order line whose product may have been deleted since.
    #[must_use]
    pub fn line_name<'a>(&self, line: &'a OrderLine) -> &'a str {
        line.product_name().unwrap_or(UNKNOWN_PRODUCT)
    }

    /// "Mar 4, 2025 (paid)" for the most recent order.
    #[must_use]
    pub fn latest_order(&self) -> Option<String> {
        self.summary
            .latest
            .map(|(at, status)| format!("{} ({status})", at.format("%b %-d, %Y")))
    }
}

/// Display the signed-in user's dashboard.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    shell: Shell,
    session: Session,
) -> impl IntoResponse {
    let token = IdentityStore::access_token(&session).await;
    let (orders, error) = match state.gateway().list_orders(token.as_ref(), user.id).await {
        Ok(orders) => (orders, None),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load order history");
            (
                Vec::new(),
                Some("Failed to load your orders. Please try again.".to_string()),
            )
        }
    };

    let monthly = monthly_spending(&orders);
    DashboardTemplate {
        shell,
        summary: order_summary(&orders),
        top_products: top_products(&orders, TOP_PRODUCTS_LIMIT),
        monthly_peak: monthly.iter().map(|m| m.amount).max().unwrap_or(Price::ZERO),
        monthly,
        orders,
        error,
    }
}
