//! Home page route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{extract::State, response::IntoResponse};
use tracing::instrument;

use orchard_core::Product;
use orchard_core::catalog::featured;

use crate::filters;
use crate::layout::Shell;
use crate::state::AppState;

/// Products shown in the home page grid.
const FEATURED_LIMIT: usize = 4;

/// Home page template.
#[derive(Template, WebTemplate)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub shell: Shell,
    pub featured: Vec<Product>,
    pub error: Option<String>,
}

/// Display the home page.
#[instrument(skip(state, shell))]
pub async fn home(State(state): State<AppState>, shell: Shell) -> impl IntoResponse {
    let (featured, error) = match state.gateway().list_products().await {
        Ok(products) => (
            featured(&products, FEATURED_LIMIT).into_iter().cloned().collect(),
            None,
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load featured products");
            (Vec::new(), Some("Products are unavailable right now.".to_string()))
        }
    };

    HomeTemplate {
        shell,
        featured,
        error,
    }
}
