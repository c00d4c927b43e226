//! HTTP route handlers for the storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                          - Home page (featured products)
//! GET  /health                    - Liveness check
//!
//! # Catalog
//! GET  /products                  - Product listing (?q=&sort=)
//! GET  /products/{id}             - Product detail
//!
//! # Cart (HTMX fragments, redirects without HTMX)
//! GET  /cart                      - Cart page
//! POST /cart/add                  - Add a product (returns badge, triggers cart-updated)
//! POST /cart/decrement            - One fewer unit (returns cart_items fragment)
//! POST /cart/remove               - Drop a line (returns cart_items fragment)
//! POST /cart/update               - Set a quantity (returns cart_items fragment)
//! POST /cart/clear                - Empty the cart
//! GET  /cart/count                - Cart count badge (fragment)
//!
//! # Checkout (signed in, non-empty cart)
//! GET  /checkout                  - Shipping form
//! POST /checkout                  - Pay and place the order
//! GET  /order-success             - Confirmation (?order_id=)
//!
//! # Account (signed in)
//! GET  /dashboard                 - Order history and spending charts
//!
//! # Admin (signed in admin)
//! GET  /admin                     - Product table (?q=)
//! POST /admin/products            - Create (returns row fragment)
//! POST /admin/products/{id}       - Update (returns row fragment)
//! POST /admin/products/{id}/delete - Delete (returns empty body)
//!
//! # Auth
//! GET  /signin, POST /signin      - Sign in
//! GET  /signup, POST /signup      - Sign up
//! GET  /signup-success            - Confirmation pending
//! POST /signout                   - Sign out
//! ```

pub mod admin;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod dashboard;
pub mod home;
pub mod products;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Router,
    http::{HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use tower_sessions::Session;

use crate::filters;
use crate::flash::set_flash;
use crate::layout::Shell;
use crate::models::Flash;
use crate::state::AppState;

/// Header HTMX sets on every request it issues.
const HX_REQUEST: &str = "hx-request";

/// Event the navigation badge listens for.
pub const CART_UPDATED: &str = "cart-updated";

/// Whether the request came from HTMX (and so wants a fragment back).
#[must_use]
pub fn is_htmx(headers: &HeaderMap) -> bool {
    headers.contains_key(HX_REQUEST)
}

/// Notification fragment, swapped into `#notice` by HTMX.
#[derive(Template, WebTemplate)]
#[template(path = "partials/notice.html")]
pub struct NoticeTemplate {
    pub flash: Flash,
}

/// Tell the visitor something: an in-page notice for HTMX requests, a
/// flash plus redirect to `fallback` otherwise.
pub async fn notify(session: &Session, htmx: bool, flash: Flash, fallback: &str) -> Response {
    if htmx {
        (
            AppendHeaders([("HX-Retarget", "#notice"), ("HX-Reswap", "innerHTML")]),
            NoticeTemplate { flash },
        )
            .into_response()
    } else {
        set_flash(session, flash).await;
        Redirect::to(fallback).into_response()
    }
}

/// Not-found page.
#[derive(Template, WebTemplate)]
#[template(path = "not_found.html")]
pub struct NotFoundTemplate {
    pub shell: Shell,
    pub message: String,
}

/// Render the not-found page with a 404 status.
pub fn not_found(shell: Shell, message: impl Into<String>) -> Response {
    (
        StatusCode::NOT_FOUND,
        NotFoundTemplate {
            shell,
            message: message.into(),
        },
    )
        .into_response()
}

/// Create the catalog routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/{id}", get(products::show))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/decrement", post(cart::decrement))
        .route("/remove", post(cart::remove))
        .route("/update", post(cart::update))
        .route("/clear", post(cart::clear))
        .route("/count", get(cart::count))
}

/// Create the admin routes router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(admin::index))
        .route("/products", post(admin::create))
        .route("/products/{id}", post(admin::update))
        .route("/products/{id}/delete", post(admin::delete))
}

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/signin", get(auth::sign_in_page).post(auth::sign_in))
        .route("/signup", get(auth::sign_up_page).post(auth::sign_up))
        .route("/signup-success", get(auth::sign_up_success))
        .route("/signout", post(auth::sign_out))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home::home))
        .nest("/products", product_routes())
        .nest("/cart", cart_routes())
        .route("/checkout", get(checkout::page).post(checkout::submit))
        .route("/order-success", get(checkout::success))
        .route("/dashboard", get(dashboard::index))
        .nest("/admin", admin_routes())
        .merge(auth_routes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_htmx_detection() {
        let mut headers = HeaderMap::new();
        assert!(!is_htmx(&headers));
        headers.insert(HX_REQUEST, axum::http::HeaderValue::from_static("true"));
        assert!(is_htmx(&headers));
    }
}
