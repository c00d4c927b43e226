//! Cart route handlers.
//!
//! Cart operations use HTMX for dynamic updates without full page reloads.
//! Every mutation fires `cart-updated` so the navigation badge refreshes.
//! Without HTMX the same endpoints redirect back to the cart page.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    http::HeaderMap,
    response::{AppendHeaders, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use orchard_core::{Cart, CartError, ProductId};

use super::{CART_UPDATED, is_htmx, notify};
use crate::error::{Result, add_breadcrumb};
use crate::filters;
use crate::layout::Shell;
use crate::models::Flash;
use crate::services::CartStore;
use crate::state::AppState;

/// Add to cart form data.
#[derive(Debug, Deserialize)]
pub struct AddToCartForm {
    pub product_id: ProductId,
    pub quantity: Option<u32>,
}

/// Form naming a single cart line.
#[derive(Debug, Deserialize)]
pub struct LineForm {
    pub product_id: ProductId,
}

/// Update cart form data.
#[derive(Debug, Deserialize)]
pub struct UpdateCartForm {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Cart page template.
#[derive(Template, WebTemplate)]
#[template(path = "cart/show.html")]
pub struct CartShowTemplate {
    pub shell: Shell,
    pub cart: Cart,
}

/// Cart items fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_items.html")]
pub struct CartItemsTemplate {
    pub cart: Cart,
}

/// Cart count badge fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_count.html")]
pub struct CartCountTemplate {
    pub count: u32,
}

/// Answer a cart-page mutation: the refreshed items fragment for HTMX,
/// a redirect to the cart page otherwise.
fn cart_changed(headers: &HeaderMap, cart: Cart) -> Response {
    if is_htmx(headers) {
        (
            AppendHeaders([("HX-Trigger", CART_UPDATED)]),
            CartItemsTemplate { cart },
        )
            .into_response()
    } else {
        Redirect::to("/cart").into_response()
    }
}

/// Display cart page.
#[instrument(skip(shell, store))]
pub async fn show(shell: Shell, store: CartStore) -> Result<impl IntoResponse> {
    let cart = store.load().await?;
    Ok(CartShowTemplate { shell, cart })
}

/// Add a product to the cart.
///
/// The product is re-read from the backend so the cart snapshot carries
/// current name and price; out-of-stock products are refused.
#[instrument(skip(state, session, store, headers))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    store: CartStore,
    headers: HeaderMap,
    Form(form): Form<AddToCartForm>,
) -> Result<Response> {
    let htmx = is_htmx(&headers);

    let product = match state.gateway().get_product(form.product_id).await {
        Ok(product) => product,
        Err(e) if e.is_not_found() => {
            return Ok(notify(&session, htmx, Flash::error("Product not found"), "/products").await);
        }
        Err(e) => return Err(e.into()),
    };

    if !product.in_stock {
        let message = format!("{} is out of stock", product.name);
        return Ok(notify(&session, htmx, Flash::error(message), "/products").await);
    }

    let quantity = form.quantity.unwrap_or(1).max(1);
    let (cart, ()) = store.update(|cart| cart.add(&product, quantity)).await?;

    let product_id = product.id.to_string();
    add_breadcrumb("cart", "Added to cart", Some(&[("product_id", &product_id)]));
    tracing::info!(product_id = %product.id, quantity, "Added to cart");

    if htmx {
        Ok((
            AppendHeaders([("HX-Trigger", CART_UPDATED)]),
            CartCountTemplate {
                count: cart.item_count(),
            },
        )
            .into_response())
    } else {
        Ok(notify(
            &session,
            false,
            Flash::success(format!("Added {} to cart", product.name)),
            "/cart",
        )
        .await)
    }
}

/// Take one unit off a line; the line goes away at zero.
#[instrument(skip(store, headers))]
pub async fn decrement(
    store: CartStore,
    headers: HeaderMap,
    Form(form): Form<LineForm>,
) -> Result<Response> {
    let (cart, _) = store.update(|cart| cart.decrement(form.product_id)).await?;
    Ok(cart_changed(&headers, cart))
}

/// Remove a line outright.
#[instrument(skip(store, headers))]
pub async fn remove(
    store: CartStore,
    headers: HeaderMap,
    Form(form): Form<LineForm>,
) -> Result<Response> {
    let (cart, _) = store.update(|cart| cart.remove_line(form.product_id)).await?;
    Ok(cart_changed(&headers, cart))
}

/// Set a line's quantity. Zero removes the line.
#[instrument(skip(store, headers))]
pub async fn update(
    store: CartStore,
    headers: HeaderMap,
    Form(form): Form<UpdateCartForm>,
) -> Result<Response> {
    let (cart, outcome) = store
        .update(|cart| {
            if form.quantity == 0 {
                cart.remove_line(form.product_id);
                Ok(())
            } else {
                cart.set_quantity(form.product_id, form.quantity)
            }
        })
        .await?;

    if let Err(CartError::NotInCart(id)) = outcome {
        tracing::debug!(product_id = %id, "Quantity update for a line not in the cart");
    }

    Ok(cart_changed(&headers, cart))
}

/// Empty the cart.
#[instrument(skip(store, headers))]
pub async fn clear(store: CartStore, headers: HeaderMap) -> Result<Response> {
    store.clear().await?;
    Ok(cart_changed(&headers, Cart::new()))
}

/// Get cart count badge (HTMX).
#[instrument(skip(store))]
pub async fn count(store: CartStore) -> impl IntoResponse {
    CartCountTemplate {
        count: store.count().await,
    }
}
