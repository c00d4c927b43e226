//! REST client for a Supabase-style backend.
//!
//! Table calls go to `{url}/rest/v1/{table}` (PostgREST query syntax), auth
//! calls to `{url}/auth/v1/*` (GoTrue). Every request carries the `apikey`
//! header; the bearer token is the caller's access token when given and the
//! configured API key otherwise.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::instrument;

use orchard_core::{
    NewOrder, NewOrderLine, Order, OrderId, OrderLine, Product, ProductDraft, ProductId, UserId,
};

use super::types::{SignUpResponse, TokenResponse};
use super::{
    AccessToken, AuthEvent, AuthEventBus, AuthService, AuthSession, AuthUser, BackendError,
    Gateway, NewProfile, Profile, SignUpOutcome,
};
use crate::config::BackendConfig;

const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Ask PostgREST for one object instead of an array; zero rows is an error.
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// PostgREST code for "single object requested, zero rows matched".
const NO_ROWS_CODE: &str = "PGRST116";

const PRODUCT_SELECT: &str = "*";
const ORDER_SELECT: &str = "*,order_line_items(*,products(*))";
const PROFILE_SELECT: &str = "id,email,is_admin";

/// Longest slice of a raw error body echoed into messages and logs.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Client for the backend's table API and auth service.
#[derive(Clone)]
pub struct SupabaseClient {
    inner: Arc<SupabaseClientInner>,
}

struct SupabaseClientInner {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    events: AuthEventBus,
}

impl SupabaseClient {
    /// Create a new backend client.
    ///
    /// # Errors
    ///
    /// Returns error if the API key is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let mut apikey = HeaderValue::from_str(config.api_key.expose_secret())
            .map_err(|e| BackendError::Config(format!("Invalid API key format: {e}")))?;
        apikey.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert("apikey", apikey);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            inner: Arc::new(SupabaseClientInner {
                client,
                base_url: config.url.trim_end_matches('/').to_string(),
                api_key: config.api_key.clone(),
                events: AuthEventBus::new(),
            }),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.inner.base_url)
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.inner.base_url)
    }

    fn request(&self, method: Method, url: &str, auth: Option<&AccessToken>) -> RequestBuilder {
        let bearer = match auth {
            Some(token) => token.expose(),
            None => self.inner.api_key.expose_secret(),
        };
        self.inner.client.request(method, url).bearer_auth(bearer)
    }

    /// Send and decode a JSON body.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BackendError> {
        let body = self.send_raw(request).await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %truncate(&body),
                "Failed to parse backend response"
            );
            BackendError::Parse(e)
        })
    }

    /// Send and discard the body.
    async fn send_empty(&self, request: RequestBuilder) -> Result<(), BackendError> {
        self.send_raw(request).await.map(|_| ())
    }

    async fn send_raw(&self, request: RequestBuilder) -> Result<String, BackendError> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(BackendError::RateLimited(retry_after));
        }

        let body = response.text().await?;
        if !status.is_success() {
            tracing::warn!(
                status = %status,
                body = %truncate(&body),
                "Backend returned non-success status"
            );
            return Err(error_from_body(status.as_u16(), &body));
        }
        Ok(body)
    }

    /// Set or clear a user's admin flag. Needs a service-role key, so it is
    /// only used by operator tooling.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the user has no profile row.
    #[instrument(skip(self))]
    pub async fn set_admin_flag(&self, user: UserId, is_admin: bool) -> Result<Profile, BackendError> {
        let request = self
            .request(Method::PATCH, &self.table_url("profiles"), None)
            .query(&[("id", eq(user))])
            .query(&[("select", PROFILE_SELECT)])
            .header("Prefer", "return=representation")
            .header(ACCEPT, SINGLE_OBJECT)
            .json(&serde_json::json!({ "is_admin": is_admin }));
        self.send(request).await
    }

    /// Best-effort removal of an order whose lines could not be written.
    async fn discard_order(&self, auth: Option<&AccessToken>, id: OrderId) {
        let request = self
            .request(Method::DELETE, &self.table_url("orders"), auth)
            .query(&[("id", eq(id))]);
        if let Err(e) = self.send_empty(request).await {
            tracing::error!(order_id = %id, error = %e, "Failed to remove order without lines");
        }
    }
}

/// PostgREST equality filter value.
fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

fn truncate(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

/// Error body shapes used by the table API (`message`, `code`) and the auth
/// service (`msg`, or `error` + `error_description`).
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    msg: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
    code: Option<serde_json::Value>,
}

/// Map a non-success response to a [`BackendError`].
fn error_from_body(status: u16, body: &str) -> BackendError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let no_rows = parsed
        .code
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .is_some_and(|code| code == NO_ROWS_CODE);

    let message = parsed
        .message
        .or(parsed.msg)
        .or(parsed.error_description)
        .or(parsed.error)
        .unwrap_or_else(|| {
            let raw = truncate(body.trim());
            if raw.is_empty() { format!("HTTP {status}") } else { raw }
        });

    match status {
        401 | 403 => BackendError::Unauthorized(message),
        404 => BackendError::NotFound(message),
        406 if no_rows => BackendError::NotFound(message),
        _ => BackendError::Api { status, message },
    }
}

/// One `order_line_items` insert row.
#[derive(Serialize)]
struct LineInsert<'a> {
    order_id: OrderId,
    #[serde(flatten)]
    line: &'a NewOrderLine,
}

/// Row echoed back by a delete with `return=representation`.
#[derive(Debug, Deserialize)]
struct DeletedRow {
    id: ProductId,
}

/// A delete that row-level security filters out, or that matches nothing,
/// still answers 2xx with an empty array.
fn ensure_deleted(rows: &[DeletedRow], id: ProductId) -> Result<(), BackendError> {
    if rows.iter().any(|row| row.id == id) {
        Ok(())
    } else {
        Err(BackendError::NotFound(format!("product {id}")))
    }
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[async_trait]
impl Gateway for SupabaseClient {
    #[instrument(skip(self))]
    async fn list_products(&self) -> Result<Vec<Product>, BackendError> {
        let request = self
            .request(Method::GET, &self.table_url("products"), None)
            .query(&[("select", PRODUCT_SELECT), ("order", "name.asc")]);
        self.send(request).await
    }

    #[instrument(skip(self))]
    async fn get_product(&self, id: ProductId) -> Result<Product, BackendError> {
        let request = self
            .request(Method::GET, &self.table_url("products"), None)
            .query(&[("select", PRODUCT_SELECT)])
            .query(&[("id", eq(id))])
            .header(ACCEPT, SINGLE_OBJECT);
        self.send(request).await
    }

    #[instrument(skip(self, auth, draft), fields(name = %draft.name))]
    async fn create_product(
        &self,
        auth: Option<&AccessToken>,
        draft: &ProductDraft,
    ) -> Result<Product, BackendError> {
        let request = self
            .request(Method::POST, &self.table_url("products"), auth)
            .header("Prefer", "return=representation")
            .header(ACCEPT, SINGLE_OBJECT)
            .json(draft);
        self.send(request).await
    }

    #[instrument(skip(self, auth, draft))]
    async fn update_product(
        &self,
        auth: Option<&AccessToken>,
        id: ProductId,
        draft: &ProductDraft,
    ) -> Result<Product, BackendError> {
        let request = self
            .request(Method::PATCH, &self.table_url("products"), auth)
            .query(&[("id", eq(id))])
            .header("Prefer", "return=representation")
            .header(ACCEPT, SINGLE_OBJECT)
            .json(draft);
        self.send(request).await
    }

    #[instrument(skip(self, auth))]
    async fn delete_product(
        &self,
        auth: Option<&AccessToken>,
        id: ProductId,
    ) -> Result<(), BackendError> {
        let request = self
            .request(Method::DELETE, &self.table_url("products"), auth)
            .query(&[("id", eq(id))])
            .query(&[("select", "id")])
            .header("Prefer", "return=representation");
        let deleted: Vec<DeletedRow> = self.send(request).await?;
        ensure_deleted(&deleted, id)
    }

    #[instrument(skip(self, auth, order), fields(user_id = %order.user_id, lines = order.lines.len()))]
    async fn create_order(
        &self,
        auth: Option<&AccessToken>,
        order: &NewOrder,
    ) -> Result<Order, BackendError> {
        let request = self
            .request(Method::POST, &self.table_url("orders"), auth)
            .header("Prefer", "return=representation")
            .header(ACCEPT, SINGLE_OBJECT)
            .json(order);
        let mut created: Order = self.send(request).await?;

        if order.lines.is_empty() {
            return Ok(created);
        }

        let rows: Vec<LineInsert<'_>> = order
            .lines
            .iter()
            .map(|line| LineInsert {
                order_id: created.id,
                line,
            })
            .collect();
        let request = self
            .request(Method::POST, &self.table_url("order_line_items"), auth)
            .header("Prefer", "return=representation")
            .json(&rows);

        match self.send::<Vec<OrderLine>>(request).await {
            Ok(lines) => {
                created.lines = lines;
                Ok(created)
            }
            Err(e) => {
                self.discard_order(auth, created.id).await;
                Err(e)
            }
        }
    }

    #[instrument(skip(self, auth))]
    async fn list_orders(
        &self,
        auth: Option<&AccessToken>,
        user: UserId,
    ) -> Result<Vec<Order>, BackendError> {
        let request = self
            .request(Method::GET, &self.table_url("orders"), auth)
            .query(&[("select", ORDER_SELECT), ("order", "created_at.desc")])
            .query(&[("user_id", eq(user))]);
        self.send(request).await
    }

    #[instrument(skip(self, auth))]
    async fn get_order(
        &self,
        auth: Option<&AccessToken>,
        id: OrderId,
    ) -> Result<Order, BackendError> {
        let request = self
            .request(Method::GET, &self.table_url("orders"), auth)
            .query(&[("select", ORDER_SELECT)])
            .query(&[("id", eq(id))])
            .header(ACCEPT, SINGLE_OBJECT);
        self.send(request).await
    }

    #[instrument(skip(self, auth))]
    async fn get_profile(
        &self,
        auth: Option<&AccessToken>,
        user: UserId,
    ) -> Result<Profile, BackendError> {
        let request = self
            .request(Method::GET, &self.table_url("profiles"), auth)
            .query(&[("select", PROFILE_SELECT)])
            .query(&[("id", eq(user))])
            .header(ACCEPT, SINGLE_OBJECT);
        self.send(request).await
    }

    #[instrument(skip(self, auth, profile), fields(user_id = %profile.id))]
    async fn create_profile(
        &self,
        auth: Option<&AccessToken>,
        profile: &NewProfile,
    ) -> Result<(), BackendError> {
        let request = self
            .request(Method::POST, &self.table_url("profiles"), auth)
            .header("Prefer", "return=minimal")
            .json(profile);
        self.send_empty(request).await
    }
}

#[async_trait]
impl AuthService for SupabaseClient {
    #[instrument(skip(self, password))]
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, BackendError> {
        let request = self
            .request(Method::POST, &self.auth_url("signup"), None)
            .json(&Credentials { email, password });
        let outcome = SignUpOutcome::from(self.send::<SignUpResponse>(request).await?);

        if let Some(session) = &outcome.session {
            self.inner.events.emit(AuthEvent::SignedIn(session.clone()));
        }
        Ok(outcome)
    }

    #[instrument(skip(self, password))]
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, BackendError> {
        let request = self
            .request(Method::POST, &self.auth_url("token"), None)
            .query(&[("grant_type", "password")])
            .json(&Credentials { email, password });

        let session = match self.send::<TokenResponse>(request).await {
            Ok(tokens) => AuthSession::from(tokens),
            // the token endpoint answers bad credentials with 400
            Err(BackendError::Api {
                status: 400,
                message,
            }) => return Err(BackendError::Unauthorized(message)),
            Err(e) => return Err(e),
        };

        self.inner.events.emit(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    #[instrument(skip(self, token))]
    async fn sign_out(&self, user: UserId, token: &AccessToken) -> Result<(), BackendError> {
        let request = self.request(Method::POST, &self.auth_url("logout"), Some(token));
        self.send_empty(request).await?;
        self.inner.events.emit(AuthEvent::SignedOut(user));
        Ok(())
    }

    #[instrument(skip(self, token))]
    async fn get_user(&self, token: &AccessToken) -> Result<AuthUser, BackendError> {
        let request = self.request(Method::GET, &self.auth_url("user"), Some(token));
        self.send(request).await
    }

    #[instrument(skip(self, refresh_token))]
    async fn refresh(&self, refresh_token: &str) -> Result<AuthSession, BackendError> {
        let request = self
            .request(Method::POST, &self.auth_url("token"), None)
            .query(&[("grant_type", "refresh_token")])
            .json(&serde_json::json!({ "refresh_token": refresh_token }));

        let session = match self.send::<TokenResponse>(request).await {
            Ok(tokens) => AuthSession::from(tokens),
            Err(BackendError::Api {
                status: 400,
                message,
            }) => return Err(BackendError::Unauthorized(message)),
            Err(e) => return Err(e),
        };

        self.inner
            .events
            .emit(AuthEvent::TokenRefreshed(session.clone()));
        Ok(session)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }
}
