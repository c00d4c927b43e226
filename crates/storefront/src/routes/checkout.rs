//! Checkout route handlers.
//!
//! Both the form and its submission sit behind the checkout gate: a visitor
//! must be signed in and have something in the cart. A failed submission
//! re-renders the form with the visitor's input and leaves the cart alone.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use orchard_core::checkout::{CheckoutBlock, checkout_gate};
use orchard_core::forms::{ShippingForm, ValidationErrors};
use orchard_core::{Cart, Order, OrderId};

use super::not_found;
use crate::error::{Result, add_breadcrumb};
use crate::filters;
use crate::flash::set_flash;
use crate::layout::Shell;
use crate::middleware::OptionalAuth;
use crate::models::Flash;
use crate::services::{CartStore, CheckoutError, IdentityStore};
use crate::state::AppState;

/// Checkout page template.
#[derive(Template, WebTemplate)]
#[template(path = "checkout.html")]
pub struct CheckoutTemplate {
    pub shell: Shell,
    pub cart: Cart,
    pub form: ShippingForm,
    pub errors: ValidationErrors,
    pub error: Option<String>,
}

/// Order confirmation template.
#[derive(Template, WebTemplate)]
#[template(path = "order_success.html")]
pub struct OrderSuccessTemplate {
    pub shell: Shell,
    pub order: Order,
}

/// Confirmation query parameters.
#[derive(Debug, Deserialize)]
pub struct SuccessQuery {
    pub order_id: Option<String>,
}

/// Redirect away from checkout with the gate's message.
async fn blocked(session: &Session, block: CheckoutBlock) -> Response {
    tracing::info!(reason = ?block, "Checkout blocked");
    set_flash(session, Flash::info(block.message())).await;
    Redirect::to(block.redirect_to()).into_response()
}

/// Display the checkout form.
#[instrument(skip_all)]
pub async fn page(
    shell: Shell,
    session: Session,
    store: CartStore,
    OptionalAuth(user): OptionalAuth,
) -> Result<Response> {
    let cart = store.load().await?;
    if let Err(block) = checkout_gate(user.as_ref().map(|u| u.id), &cart) {
        return Ok(blocked(&session, block).await);
    }

    Ok(CheckoutTemplate {
        shell,
        cart,
        form: ShippingForm::default(),
        errors: ValidationErrors::new(),
        error: None,
    }
    .into_response())
}

/// Pay for the cart and place the order.
#[instrument(skip_all)]
pub async fn submit(
    State(state): State<AppState>,
    shell: Shell,
    session: Session,
    store: CartStore,
    OptionalAuth(user): OptionalAuth,
    Form(form): Form<ShippingForm>,
) -> Result<Response> {
    let cart = store.load().await?;
    let user = match (checkout_gate(user.as_ref().map(|u| u.id), &cart), user) {
        (Ok(_), Some(user)) => user,
        (Err(block), _) => return Ok(blocked(&session, block).await),
        (Ok(_), None) => return Ok(blocked(&session, CheckoutBlock::SignInRequired).await),
    };

    let token = IdentityStore::access_token(&session).await;
    match state
        .checkout()
        .place_order(&user, token.as_ref(), &cart, &form)
        .await
    {
        Ok(order) => {
            store.clear().await?;
            let order_id = order.id.to_string();
            add_breadcrumb("checkout", "Order placed", Some(&[("order_id", &order_id)]));
            Ok(Redirect::to(&format!("/order-success?order_id={order_id}")).into_response())
        }
        Err(CheckoutError::Blocked(block)) => Ok(blocked(&session, block).await),
        Err(e) => {
            let errors = match &e {
                CheckoutError::Validation(errors) => errors.clone(),
                _ => ValidationErrors::new(),
            };
            Ok(CheckoutTemplate {
                shell,
                cart,
                error: Some(e.user_message()),
                form,
                errors,
            }
            .into_response())
        }
    }
}

/// Display the order confirmation.
#[instrument(skip(state, shell, session))]
pub async fn success(
    State(state): State<AppState>,
    shell: Shell,
    session: Session,
    Query(query): Query<SuccessQuery>,
) -> Result<Response> {
    let Some(order_id) = query
        .order_id
        .as_deref()
        .and_then(|id| id.parse::<OrderId>().ok())
    else {
        return Ok(not_found(shell, "Order not found"));
    };

    let token = IdentityStore::access_token(&session).await;
    match state.gateway().get_order(token.as_ref(), order_id).await {
        Ok(order) => Ok(OrderSuccessTemplate { shell, order }.into_response()),
        Err(e) if e.is_not_found() => Ok(not_found(shell, "Order not found")),
        Err(e) => Err(e.into()),
    }
}
