//! Product route handlers.
//!
//! The listing fetches the whole catalog once per request and narrows it
//! locally, so search and sort never add backend round-trips.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::instrument;

use orchard_core::catalog::browse;
use orchard_core::{Product, ProductId, SortOption};

use super::not_found;
use crate::filters;
use crate::layout::Shell;
use crate::state::AppState;

/// Most units that can be added from the detail page at once.
pub const MAX_QUANTITY: u32 = 10;

/// Listing query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct BrowseQuery {
    pub q: Option<String>,
    pub sort: Option<String>,
}

/// One entry of the sort dropdown.
pub struct SortChoice {
    pub value: &'static str,
    pub label: &'static str,
    pub selected: bool,
}

fn sort_choices(current: SortOption) -> Vec<SortChoice> {
    SortOption::ALL
        .into_iter()
        .map(|option| SortChoice {
            value: option.as_str(),
            label: option.label(),
            selected: option == current,
        })
        .collect()
}

/// Product listing page template.
#[derive(Template, WebTemplate)]
#[template(path = "products/index.html")]
pub struct ProductsIndexTemplate {
    pub shell: Shell,
    pub products: Vec<Product>,
    pub query: String,
    pub sort_options: Vec<SortChoice>,
    pub error: Option<String>,
}

/// Product detail page template.
#[derive(Template, WebTemplate)]
#[template(path = "products/show.html")]
pub struct ProductShowTemplate {
    pub shell: Shell,
    pub product: Product,
    pub quantities: Vec<u32>,
}

/// Display the product listing.
#[instrument(skip(state, shell))]
pub async fn index(
    State(state): State<AppState>,
    shell: Shell,
    Query(query): Query<BrowseQuery>,
) -> impl IntoResponse {
    let sort = SortOption::parse_or_default(query.sort.as_deref());
    let term = query.q.unwrap_or_default();

    let (products, error) = match state.gateway().list_products().await {
        Ok(all) => (browse(&all, &term, sort).into_iter().cloned().collect(), None),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load products");
            (
                Vec::new(),
                Some("Failed to load products. Please try again.".to_string()),
            )
        }
    };

    ProductsIndexTemplate {
        shell,
        products,
        query: term,
        sort_options: sort_choices(sort),
        error,
    }
}

/// Display the product detail page.
#[instrument(skip(state, shell))]
pub async fn show(
    State(state): State<AppState>,
    shell: Shell,
    Path(id): Path<String>,
) -> crate::error::Result<Response> {
    let Ok(id) = id.parse::<ProductId>() else {
        return Ok(not_found(shell, "Product not found"));
    };

    match state.gateway().get_product(id).await {
        Ok(product) => Ok(ProductShowTemplate {
            shell,
            product,
            quantities: (1..=MAX_QUANTITY).collect(),
        }
        .into_response()),
        Err(e) if e.is_not_found() => Ok(not_found(shell, "Product not found")),
        Err(e) => Err(e.into()),
    }
}
