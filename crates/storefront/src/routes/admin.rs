//! Admin catalog panel.
//!
//! Every mutation answers with just the fragment HTMX swaps in: the new or
//! replaced table row, or nothing for a delete. The table is never
//! re-fetched after a change. Failures that have no form to re-render go to
//! the `#notice` area. Without HTMX every mutation flashes its outcome and
//! redirects back to `/admin`.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use orchard_core::catalog::search_by_name;
use orchard_core::forms::{ProductForm, ValidationErrors};
use orchard_core::{Product, ProductId};

use super::{is_htmx, notify};
use crate::error::{AppError, Result, add_breadcrumb};
use crate::filters;
use crate::layout::Shell;
use crate::middleware::RequireAdmin;
use crate::models::Flash;
use crate::services::IdentityStore;
use crate::state::AppState;

/// Admin table query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct AdminQuery {
    pub q: Option<String>,
}

/// Admin product table page.
#[derive(Template, WebTemplate)]
#[template(path = "admin/index.html")]
pub struct AdminIndexTemplate {
    pub shell: Shell,
    pub products: Vec<Product>,
    pub query: String,
    /// Pre-rendered create form, shared with the fragment HTMX swaps in.
    pub create_form: String,
    pub error: Option<String>,
}

/// One table row (fragment).
#[derive(Template, WebTemplate)]
#[template(path = "partials/admin_product_row.html")]
pub struct ProductRowTemplate {
    pub product: Product,
}

/// Product form with validation messages (fragment).
#[derive(Template, WebTemplate)]
#[template(path = "partials/admin_product_form.html")]
pub struct ProductFormTemplate {
    /// `None` for the create form.
    pub product_id: Option<ProductId>,
    pub form: ProductForm,
    pub errors: ValidationErrors,
    pub error: Option<String>,
}

impl ProductFormTemplate {
    fn action(&self) -> String {
        self.product_id
            .map_or_else(|| "/admin/products".to_string(), |id| format!("/admin/products/{id}"))
    }

    fn form_id(&self) -> String {
        self.product_id
            .map_or_else(|| "product-form".to_string(), |id| format!("product-form-{id}"))
    }
}

/// Re-render the form in place of the row that HTMX would have swapped.
fn form_response(
    product_id: Option<ProductId>,
    form: ProductForm,
    errors: ValidationErrors,
    error: Option<String>,
) -> Response {
    let template = ProductFormTemplate {
        product_id,
        form,
        errors,
        error,
    };
    let target = format!("#{}", template.form_id());
    (
        [("HX-Retarget", target), ("HX-Reswap", "outerHTML".to_string())],
        template,
    )
        .into_response()
}

/// One-line version of the field messages, for the flash shown without HTMX.
fn error_summary(errors: &ValidationErrors) -> String {
    errors
        .iter()
        .map(|(_, message)| message)
        .collect::<Vec<_>>()
        .join(". ")
}

fn parse_id(raw: &str) -> Result<ProductId> {
    raw.parse()
        .map_err(|_| AppError::NotFound(format!("product {raw}")))
}

/// Display the product table.
#[instrument(skip(state, shell, _admin))]
pub async fn index(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    shell: Shell,
    Query(query): Query<AdminQuery>,
) -> Result<impl IntoResponse> {
    let term = query.q.unwrap_or_default();
    let (products, error) = match state.gateway().list_products().await {
        Ok(all) => (search_by_name(&all, &term).into_iter().cloned().collect(), None),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load products for admin");
            (Vec::new(), Some("Failed to load products.".to_string()))
        }
    };

    let create_form = ProductFormTemplate {
        product_id: None,
        form: ProductForm::blank(),
        errors: ValidationErrors::new(),
        error: None,
    }
    .render()
    .map_err(|e| AppError::Internal(format!("Failed to render product form: {e}")))?;

    Ok(AdminIndexTemplate {
        shell,
        products,
        query: term,
        create_form,
        error,
    })
}

/// Create a product; answers with its table row.
#[instrument(skip(state, session, admin, headers, form), fields(admin_id = %admin.0.id))]
pub async fn create(
    State(state): State<AppState>,
    admin: RequireAdmin,
    session: Session,
    headers: HeaderMap,
    Form(form): Form<ProductForm>,
) -> Result<Response> {
    let htmx = is_htmx(&headers);
    let draft = match form.validate() {
        Ok(draft) => draft,
        Err(errors) if htmx => return Ok(form_response(None, form, errors, None)),
        Err(errors) => {
            return Ok(notify(&session, false, Flash::error(error_summary(&errors)), "/admin").await);
        }
    };

    let token = IdentityStore::access_token(&session).await;
    match state.gateway().create_product(token.as_ref(), &draft).await {
        Ok(product) => {
            let product_id = product.id.to_string();
            add_breadcrumb("admin", "Product created", Some(&[("product_id", &product_id)]));
            tracing::info!(product_id = %product.id, "Product created");
            if htmx {
                Ok(ProductRowTemplate { product }.into_response())
            } else {
                let flash = Flash::success(format!("Added {}", product.name));
                Ok(notify(&session, false, flash, "/admin").await)
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to create product");
            let message = "Failed to save product. Please try again.";
            if htmx {
                Ok(form_response(None, form, ValidationErrors::new(), Some(message.to_string())))
            } else {
                Ok(notify(&session, false, Flash::error(message), "/admin").await)
            }
        }
    }
}

/// Update a product; answers with the replaced row.
#[instrument(skip(state, session, admin, headers, form), fields(admin_id = %admin.0.id))]
pub async fn update(
    State(state): State<AppState>,
    admin: RequireAdmin,
    session: Session,
    headers: HeaderMap,
    Path(id): Path<String>,
    Form(form): Form<ProductForm>,
) -> Result<Response> {
    let htmx = is_htmx(&headers);
    let id = parse_id(&id)?;
    let draft = match form.validate() {
        Ok(draft) => draft,
        Err(errors) if htmx => return Ok(form_response(Some(id), form, errors, None)),
        Err(errors) => {
            return Ok(notify(&session, false, Flash::error(error_summary(&errors)), "/admin").await);
        }
    };

    let token = IdentityStore::access_token(&session).await;
    match state.gateway().update_product(token.as_ref(), id, &draft).await {
        Ok(product) => {
            tracing::info!(product_id = %product.id, "Product updated");
            if htmx {
                Ok(ProductRowTemplate { product }.into_response())
            } else {
                let flash = Flash::success(format!("Saved {}", product.name));
                Ok(notify(&session, false, flash, "/admin").await)
            }
        }
        Err(e) if e.is_not_found() => {
            tracing::warn!(product_id = %id, "Update of a missing product");
            Ok(notify(&session, htmx, Flash::error("Product not found"), "/admin").await)
        }
        Err(e) => {
            tracing::error!(product_id = %id, error = %e, "Failed to update product");
            let message = "Failed to save product. Please try again.";
            if htmx {
                Ok(form_response(
                    Some(id),
                    form,
                    ValidationErrors::new(),
                    Some(message.to_string()),
                ))
            } else {
                Ok(notify(&session, false, Flash::error(message), "/admin").await)
            }
        }
    }
}

/// Delete a product; answers with an empty body so HTMX drops the row.
///
/// A failed delete leaves the row in place and reports through `#notice`.
#[instrument(skip(state, session, admin, headers), fields(admin_id = %admin.0.id))]
pub async fn delete(
    State(state): State<AppState>,
    admin: RequireAdmin,
    session: Session,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response> {
    let htmx = is_htmx(&headers);
    let id = parse_id(&id)?;
    let token = IdentityStore::access_token(&session).await;

    match state.gateway().delete_product(token.as_ref(), id).await {
        Ok(()) => {
            let product_id = id.to_string();
            add_breadcrumb("admin", "Product deleted", Some(&[("product_id", &product_id)]));
            tracing::info!(product_id = %id, "Product deleted");
            if htmx {
                Ok(StatusCode::OK.into_response())
            } else {
                Ok(notify(&session, false, Flash::success("Product deleted"), "/admin").await)
            }
        }
        Err(e) if e.is_not_found() => {
            tracing::warn!(product_id = %id, "Delete matched no product");
            Ok(notify(&session, htmx, Flash::error("Product not found"), "/admin").await)
        }
        Err(e) => {
            tracing::error!(product_id = %id, error = %e, "Failed to delete product");
            let flash = Flash::error("Failed to delete product. Please try again.");
            Ok(notify(&session, htmx, flash, "/admin").await)
        }
    }
}
