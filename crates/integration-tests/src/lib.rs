//! Integration test harness for the Orchard storefront.
//!
//! The full router is driven in-process with `tower::ServiceExt::oneshot`;
//! no sockets, no hosted backend. [`FakeBackend`] stands in for both the
//! table API and the auth service, keeping every row in memory.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p orchard-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `catalog` - Home page, listing search/sort, product pages
//! - `cart_checkout` - Cart mutations, checkout gate, order placement
//! - `accounts` - Sign-in/out, dashboard, admin panel gating

#![allow(clippy::missing_panics_doc, clippy::expect_used)]

use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use chrono::Utc;
use secrecy::SecretString;
use tokio::sync::broadcast;
use tower::ServiceExt;

use orchard_core::{
    NewOrder, Order, OrderId, OrderLine, OrderLineId, Price, Product, ProductDraft, ProductId,
    UserId,
};
use orchard_storefront::backend::{
    AccessToken, AuthEvent, AuthEventBus, AuthService, AuthSession, AuthUser, BackendError,
    Gateway, NewProfile, Profile, SessionTokens, SignUpOutcome,
};
use orchard_storefront::config::{BackendConfig, StorefrontConfig};
use orchard_storefront::services::{
    PaymentError, PaymentMethod, PaymentProcessor, PaymentReference, SimulatedPayment,
};
use orchard_storefront::state::AppState;

/// Name of the storefront session cookie.
const SESSION_COOKIE: &str = "orchard_session";

const TOKEN_LIFETIME_SECS: i64 = 3600;

/// Password every fixture account is created with.
pub const PASSWORD: &str = "orchard-pass-1";

// =============================================================================
// Fake backend
// =============================================================================

struct Account {
    id: UserId,
    email: String,
    password: String,
}

#[derive(Default)]
struct Tables {
    products: Vec<Product>,
    next_product_id: i64,
    orders: Vec<Order>,
    next_line_id: i64,
    accounts: Vec<Account>,
    profiles: Vec<Profile>,
    access_tokens: Vec<(String, UserId)>,
    refresh_tokens: Vec<(String, UserId)>,
}

impl Tables {
    fn owner(&self, token: Option<&AccessToken>) -> Option<UserId> {
        let token = token?;
        self.access_tokens
            .iter()
            .find(|(t, _)| t == token.expose())
            .map(|(_, user)| *user)
    }

    fn is_admin(&self, token: Option<&AccessToken>) -> bool {
        self.owner(token).is_some_and(|user| {
            self.profiles
                .iter()
                .any(|profile| profile.id == user && profile.is_admin)
        })
    }

    /// Attach the current product rows to an order's lines.
    fn joined(&self, order: &Order) -> Order {
        let mut order = order.clone();
        for line in &mut order.lines {
            line.product = self
                .products
                .iter()
                .find(|p| p.id == line.product_id)
                .cloned();
        }
        order
    }

    fn issue_session(&mut self, user: &Account) -> AuthSession {
        let access = format!("access-{}", uuid::Uuid::new_v4());
        let refresh = format!("refresh-{}", uuid::Uuid::new_v4());
        self.access_tokens.push((access.clone(), user.id));
        self.refresh_tokens.push((refresh.clone(), user.id));
        AuthSession {
            tokens: SessionTokens {
                access_token: access,
                refresh_token: refresh,
                expires_at: Utc::now().timestamp() + TOKEN_LIFETIME_SECS,
            },
            user: AuthUser {
                id: user.id,
                email: Some(user.email.clone()),
            },
        }
    }
}

/// In-memory stand-in for the hosted backend.
///
/// Row-level security is approximated: catalog writes need an admin's
/// token, and orders are only visible to the user who placed them.
pub struct FakeBackend {
    tables: Mutex<Tables>,
    events: AuthEventBus,
    fail_order_saves: AtomicBool,
    fail_catalog_writes: AtomicBool,
    confirm_sign_ups: AtomicBool,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables {
                next_product_id: 1,
                next_line_id: 1,
                ..Tables::default()
            }),
            events: AuthEventBus::new(),
            fail_order_saves: AtomicBool::new(false),
            fail_catalog_writes: AtomicBool::new(false),
            confirm_sign_ups: AtomicBool::new(false),
        }
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a product priced in cents.
    pub fn add_product(&self, name: &str, cents: u32, in_stock: bool) -> Product {
        let mut tables = self.tables();
        let id = ProductId::new(tables.next_product_id);
        tables.next_product_id += 1;
        let product = Product {
            id,
            name: name.to_string(),
            description: format!("Fresh {name} from the orchard"),
            price: Price::from_cents(cents),
            image: format!("https://img.orchard.test/{id}.jpg"),
            in_stock,
            created_at: Some(Utc::now()),
        };
        tables.products.push(product.clone());
        product
    }

    /// Create a confirmed account with its profile row.
    pub fn add_account(&self, email: &str, is_admin: bool) -> UserId {
        let mut tables = self.tables();
        let id = UserId::random();
        tables.accounts.push(Account {
            id,
            email: email.to_string(),
            password: PASSWORD.to_string(),
        });
        tables.profiles.push(Profile {
            id,
            email: Some(email.to_string()),
            is_admin,
        });
        id
    }

    /// Make every order insert fail, as if the table were unreachable.
    pub fn fail_order_saves(&self, fail: bool) {
        self.fail_order_saves.store(fail, Ordering::SeqCst);
    }

    /// Make product creates, updates and deletes fail with a server error.
    pub fn fail_catalog_writes(&self, fail: bool) {
        self.fail_catalog_writes.store(fail, Ordering::SeqCst);
    }

    fn catalog_write_error(&self) -> Option<BackendError> {
        self.fail_catalog_writes
            .load(Ordering::SeqCst)
            .then(|| BackendError::Api {
                status: 500,
                message: "products table unavailable".to_string(),
            })
    }

    /// Require email confirmation for new sign-ups (no session issued).
    pub fn require_confirmation(&self, required: bool) {
        self.confirm_sign_ups.store(required, Ordering::SeqCst);
    }

    #[must_use]
    pub fn orders(&self) -> Vec<Order> {
        self.tables().orders.clone()
    }

    #[must_use]
    pub fn products(&self) -> Vec<Product> {
        self.tables().products.clone()
    }

    #[must_use]
    pub fn profile(&self, user: UserId) -> Option<Profile> {
        self.tables().profiles.iter().find(|p| p.id == user).cloned()
    }

    /// Flip an admin flag directly, without any auth event.
    pub fn set_admin(&self, user: UserId, is_admin: bool) {
        if let Some(profile) = self.tables().profiles.iter_mut().find(|p| p.id == user) {
            profile.is_admin = is_admin;
        }
    }

    /// Publish an auth event as the hosted service would.
    pub fn emit(&self, event: AuthEvent) {
        self.events.emit(event);
    }
}

fn permission_denied() -> BackendError {
    BackendError::Api {
        status: 403,
        message: "permission denied".to_string(),
    }
}

#[async_trait]
impl Gateway for FakeBackend {
    async fn list_products(&self) -> Result<Vec<Product>, BackendError> {
        let mut products = self.tables().products.clone();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }

    async fn get_product(&self, id: ProductId) -> Result<Product, BackendError> {
        self.tables()
            .products
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("product {id}")))
    }

    async fn create_product(
        &self,
        auth: Option<&AccessToken>,
        draft: &ProductDraft,
    ) -> Result<Product, BackendError> {
        if let Some(e) = self.catalog_write_error() {
            return Err(e);
        }
        let mut tables = self.tables();
        if !tables.is_admin(auth) {
            return Err(permission_denied());
        }
        let id = ProductId::new(tables.next_product_id);
        tables.next_product_id += 1;
        let mut product = draft.clone().into_product(id);
        product.created_at = Some(Utc::now());
        tables.products.push(product.clone());
        Ok(product)
    }

    async fn update_product(
        &self,
        auth: Option<&AccessToken>,
        id: ProductId,
        draft: &ProductDraft,
    ) -> Result<Product, BackendError> {
        if let Some(e) = self.catalog_write_error() {
            return Err(e);
        }
        let mut tables = self.tables();
        if !tables.is_admin(auth) {
            return Err(permission_denied());
        }
        let row = tables
            .products
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| BackendError::NotFound(format!("product {id}")))?;
        let created_at = row.created_at;
        *row = draft.clone().into_product(id);
        row.created_at = created_at;
        Ok(row.clone())
    }

    async fn delete_product(
        &self,
        auth: Option<&AccessToken>,
        id: ProductId,
    ) -> Result<(), BackendError> {
        if let Some(e) = self.catalog_write_error() {
            return Err(e);
        }
        let mut tables = self.tables();
        if !tables.is_admin(auth) {
            return Err(permission_denied());
        }
        let before = tables.products.len();
        tables.products.retain(|p| p.id != id);
        if tables.products.len() == before {
            return Err(BackendError::NotFound(format!("product {id}")));
        }
        Ok(())
    }

    async fn create_order(
        &self,
        auth: Option<&AccessToken>,
        order: &NewOrder,
    ) -> Result<Order, BackendError> {
        if self.fail_order_saves.load(Ordering::SeqCst) {
            return Err(BackendError::Api {
                status: 500,
                message: "orders table unavailable".to_string(),
            });
        }

        let mut tables = self.tables();
        if tables.owner(auth) != Some(order.user_id) {
            return Err(permission_denied());
        }

        let mut lines = Vec::with_capacity(order.lines.len());
        for line in &order.lines {
            lines.push(OrderLine {
                id: OrderLineId::new(tables.next_line_id),
                product_id: line.product_id,
                quantity: line.quantity,
                price: line.price,
                product: None,
            });
            tables.next_line_id += 1;
        }

        let stored = Order {
            id: OrderId::random(),
            user_id: order.user_id,
            total_amount: order.total_amount,
            shipping_address: order.shipping_address.clone(),
            status: order.status,
            payment_id: order.payment_id.clone(),
            created_at: Utc::now(),
            lines,
        };
        tables.orders.push(stored.clone());
        Ok(stored)
    }

    async fn list_orders(
        &self,
        auth: Option<&AccessToken>,
        user: UserId,
    ) -> Result<Vec<Order>, BackendError> {
        let tables = self.tables();
        if tables.owner(auth) != Some(user) {
            return Ok(Vec::new());
        }
        let mut orders: Vec<Order> = tables
            .orders
            .iter()
            .filter(|o| o.user_id == user)
            .map(|o| tables.joined(o))
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn get_order(
        &self,
        auth: Option<&AccessToken>,
        id: OrderId,
    ) -> Result<Order, BackendError> {
        let tables = self.tables();
        let owner = tables.owner(auth);
        tables
            .orders
            .iter()
            .find(|o| o.id == id && Some(o.user_id) == owner)
            .map(|o| tables.joined(o))
            .ok_or_else(|| BackendError::NotFound(format!("order {id}")))
    }

    async fn get_profile(
        &self,
        _auth: Option<&AccessToken>,
        user: UserId,
    ) -> Result<Profile, BackendError> {
        self.profile(user)
            .ok_or_else(|| BackendError::NotFound(format!("profile {user}")))
    }

    async fn create_profile(
        &self,
        _auth: Option<&AccessToken>,
        profile: &NewProfile,
    ) -> Result<(), BackendError> {
        self.tables().profiles.push(Profile {
            id: profile.id,
            email: Some(profile.email.clone()),
            is_admin: profile.is_admin,
        });
        Ok(())
    }
}

#[async_trait]
impl AuthService for FakeBackend {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, BackendError> {
        let mut tables = self.tables();
        if tables.accounts.iter().any(|a| a.email == email) {
            return Err(BackendError::Api {
                status: 422,
                message: "User already registered".to_string(),
            });
        }

        let account = Account {
            id: UserId::random(),
            email: email.to_string(),
            password: password.to_string(),
        };
        let user = AuthUser {
            id: account.id,
            email: Some(account.email.clone()),
        };
        let session = if self.confirm_sign_ups.load(Ordering::SeqCst) {
            None
        } else {
            Some(tables.issue_session(&account))
        };
        tables.accounts.push(account);
        drop(tables);

        if let Some(session) = &session {
            self.events.emit(AuthEvent::SignedIn(session.clone()));
        }
        Ok(SignUpOutcome { user, session })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, BackendError> {
        let mut tables = self.tables();
        let Some(index) = tables
            .accounts
            .iter()
            .position(|a| a.email == email && a.password == password)
        else {
            return Err(BackendError::Unauthorized(
                "Invalid login credentials".to_string(),
            ));
        };
        let account = tables.accounts.swap_remove(index);
        let session = tables.issue_session(&account);
        tables.accounts.push(account);
        drop(tables);

        self.events.emit(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self, user: UserId, token: &AccessToken) -> Result<(), BackendError> {
        let mut tables = self.tables();
        tables.access_tokens.retain(|(t, _)| t != token.expose());
        tables.refresh_tokens.retain(|(_, owner)| *owner != user);
        drop(tables);

        self.events.emit(AuthEvent::SignedOut(user));
        Ok(())
    }

    async fn get_user(&self, token: &AccessToken) -> Result<AuthUser, BackendError> {
        let tables = self.tables();
        let id = tables
            .owner(Some(token))
            .ok_or_else(|| BackendError::Unauthorized("invalid JWT".to_string()))?;
        let email = tables
            .accounts
            .iter()
            .find(|a| a.id == id)
            .map(|a| a.email.clone());
        Ok(AuthUser { id, email })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthSession, BackendError> {
        let mut tables = self.tables();
        let Some(user) = tables
            .refresh_tokens
            .iter()
            .find(|(t, _)| t == refresh_token)
            .map(|(_, user)| *user)
        else {
            return Err(BackendError::Unauthorized(
                "Invalid refresh token".to_string(),
            ));
        };
        tables.refresh_tokens.retain(|(t, _)| t != refresh_token);
        let Some(index) = tables.accounts.iter().position(|a| a.id == user) else {
            return Err(BackendError::Unauthorized("User not found".to_string()));
        };
        let account = tables.accounts.swap_remove(index);
        let session = tables.issue_session(&account);
        tables.accounts.push(account);
        drop(tables);

        self.events.emit(AuthEvent::TokenRefreshed(session.clone()));
        Ok(session)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

// =============================================================================
// Payment processors
// =============================================================================

/// Processor that refuses every charge.
pub struct DecliningPayment;

#[async_trait]
impl PaymentProcessor for DecliningPayment {
    async fn authorize(
        &self,
        _amount: Price,
        _method: &PaymentMethod,
    ) -> Result<PaymentReference, PaymentError> {
        Err(PaymentError::Declined("card refused".to_string()))
    }
}

// =============================================================================
// Test app
// =============================================================================

/// Storefront configuration for in-process tests.
#[must_use]
pub fn test_config() -> StorefrontConfig {
    StorefrontConfig {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        base_url: "http://localhost:3000".to_string(),
        session_secret: SecretString::from(
            "pT7vQ2mX9kR4wL8nB3cF6hJ1sD5gZ0aY-integration-signing-material-4u7e".to_string(),
        ),
        backend: BackendConfig {
            url: "http://backend.invalid".to_string(),
            api_key: SecretString::from("anon-key".to_string()),
        },
        payment_delay: Duration::ZERO,
        sentry_dsn: None,
        sentry_environment: None,
    }
}

/// `application/x-www-form-urlencoded` body for `fields`.
fn encode_form(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(name, value)| {
            format!(
                "{}={}",
                urlencoding::encode(name),
                urlencoding::encode(value)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// A response with its body read to a string.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Redirect target, if this is a redirect.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.header(header::LOCATION.as_str())
    }
}

/// The storefront router over a [`FakeBackend`], with a one-visitor
/// cookie jar.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub backend: Arc<FakeBackend>,
    cookie: Option<String>,
}

impl TestApp {
    /// Build an app over an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::with_backend(Arc::new(FakeBackend::new()))
    }

    #[must_use]
    pub fn with_backend(backend: Arc<FakeBackend>) -> Self {
        Self::with_parts(backend, Arc::new(SimulatedPayment::new(Duration::ZERO)))
    }

    /// Build an app over an empty backend that pays through `payments`.
    #[must_use]
    pub fn with_payments(payments: Arc<dyn PaymentProcessor>) -> Self {
        Self::with_parts(Arc::new(FakeBackend::new()), payments)
    }

    fn with_parts(backend: Arc<FakeBackend>, payments: Arc<dyn PaymentProcessor>) -> Self {
        let state = AppState::new(test_config(), backend.clone(), backend.clone(), payments);
        let router = orchard_storefront::app(state.clone()).expect("Failed to build router");
        Self {
            router,
            state,
            backend,
            cookie: None,
        }
    }

    /// Drop the session cookie, as a fresh browser would.
    pub fn forget_cookie(&mut self) {
        self.cookie = None;
    }

    pub async fn get(&mut self, uri: &str) -> TestResponse {
        self.send(Method::GET, uri, None, false).await
    }

    pub async fn get_htmx(&mut self, uri: &str) -> TestResponse {
        self.send(Method::GET, uri, None, true).await
    }

    pub async fn post(&mut self, uri: &str, form: &[(&str, &str)]) -> TestResponse {
        self.send(Method::POST, uri, Some(form), false).await
    }

    pub async fn post_htmx(&mut self, uri: &str, form: &[(&str, &str)]) -> TestResponse {
        self.send(Method::POST, uri, Some(form), true).await
    }

    /// Sign in through the form and return the redirect response.
    pub async fn sign_in(&mut self, email: &str) -> TestResponse {
        self.post("/signin", &[("email", email), ("password", PASSWORD)])
            .await
    }

    /// Sign in as a freshly created account.
    pub async fn sign_in_as_new(&mut self, email: &str, is_admin: bool) -> UserId {
        let id = self.backend.add_account(email, is_admin);
        let response = self.sign_in(email).await;
        assert_eq!(response.status, StatusCode::SEE_OTHER, "sign-in failed");
        id
    }

    /// Add `quantity` of a product through the cart form.
    pub async fn add_to_cart(&mut self, product: ProductId, quantity: u32) -> TestResponse {
        let id = product.to_string();
        let quantity = quantity.to_string();
        self.post("/cart/add", &[("product_id", id.as_str()), ("quantity", quantity.as_str())])
            .await
    }

    /// Follow a redirect with a GET.
    pub async fn follow(&mut self, response: &TestResponse) -> TestResponse {
        let location = response
            .location()
            .expect("response is not a redirect")
            .to_string();
        self.get(&location).await
    }

    async fn send(
        &mut self,
        method: Method,
        uri: &str,
        form: Option<&[(&str, &str)]>,
        htmx: bool,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = &self.cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        if htmx {
            builder = builder.header("hx-request", "true");
        }

        let body = match form {
            Some(fields) => {
                builder = builder.header(
                    header::CONTENT_TYPE,
                    "application/x-www-form-urlencoded",
                );
                Body::from(encode_form(fields))
            }
            None => Body::empty(),
        };
        let request = builder.body(body).expect("Failed to build request");

        let response = match self.router.clone().oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        };

        self.store_cookie(response.headers());
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");

        TestResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        }
    }

    fn store_cookie(&mut self, headers: &HeaderMap) {
        for value in headers.get_all(header::SET_COOKIE) {
            let Ok(value) = value.to_str() else { continue };
            let Some(pair) = value.split(';').next() else { continue };
            if !pair.starts_with(&format!("{SESSION_COOKIE}=")) {
                continue;
            }
            if value.contains("Max-Age=0") {
                self.cookie = None;
            } else {
                self.cookie = Some(pair.to_string());
            }
        }
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}
