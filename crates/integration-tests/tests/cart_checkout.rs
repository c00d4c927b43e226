//! Integration tests for the cart and checkout flow.
//!
//! Run with: cargo test -p orchard-integration-tests --test cart_checkout

use std::sync::Arc;

use axum::http::StatusCode;
use orchard_core::{MAX_LINE_QUANTITY, OrderStatus, Product};
use orchard_integration_tests::{DecliningPayment, TestApp};

const SHIPPING: &[(&str, &str)] = &[
    ("full_name", "Ada Grower"),
    ("address", "12 Orchard Lane"),
    ("city", "Fresno"),
    ("state", "CA"),
    ("zip_code", "93650"),
];

fn app_with_fruit() -> (TestApp, Product, Product) {
    let app = TestApp::new();
    let apple = app.backend.add_product("Apple", 150, true);
    let quince = app.backend.add_product("Quince", 275, false);
    (app, apple, quince)
}

/// Current badge count, as the navigation would fetch it.
async fn badge(app: &mut TestApp) -> String {
    let resp = app.get("/cart/count").await;
    assert_eq!(resp.status, StatusCode::OK);
    resp.body
}

fn shows_count(badge: &str, count: u32) -> bool {
    badge.contains(&format!(">{count}</span>"))
}

// ============================================================================
// Cart
// ============================================================================

#[tokio::test]
async fn test_add_redirects_to_cart_with_flash() {
    let (mut app, apple, _) = app_with_fruit();

    let resp = app.add_to_cart(apple.id, 2).await;
    assert_eq!(resp.status, StatusCode::SEE_OTHER);
    assert_eq!(resp.location(), Some("/cart"));

    let page = app.follow(&resp).await;
    assert_eq!(page.status, StatusCode::OK);
    assert!(page.body.contains("Added Apple to cart"));
    assert!(page.body.contains(r#"name="quantity" min="0" value="2""#));
}

#[tokio::test]
async fn test_adding_same_product_merges_lines() {
    let (mut app, apple, _) = app_with_fruit();

    app.add_to_cart(apple.id, 2).await;
    app.add_to_cart(apple.id, 3).await;

    assert!(shows_count(&badge(&mut app).await, 5));
    let page = app.get("/cart").await;
    assert_eq!(page.body.matches(r#"href="/products/1">Apple</a>"#).count(), 1);
}

#[tokio::test]
async fn test_htmx_add_returns_badge_and_trigger() {
    let (mut app, apple, _) = app_with_fruit();
    let id = apple.id.to_string();

    let resp = app.post_htmx("/cart/add", &[("product_id", id.as_str())]).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.header("hx-trigger"), Some("cart-updated"));
    assert!(shows_count(&resp.body, 1));
    assert!(resp.body.contains(r#"id="cart-count""#));
}

#[tokio::test]
async fn test_out_of_stock_add_is_refused() {
    let (mut app, _, quince) = app_with_fruit();
    let id = quince.id.to_string();

    let resp = app.post_htmx("/cart/add", &[("product_id", id.as_str())]).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.header("hx-retarget"), Some("#notice"));
    assert!(resp.body.contains("Quince is out of stock"));
    assert!(shows_count(&badge(&mut app).await, 0));
}

#[tokio::test]
async fn test_missing_product_add_redirects_to_catalog() {
    let (mut app, _, _) = app_with_fruit();

    let resp = app.post("/cart/add", &[("product_id", "404")]).await;
    assert_eq!(resp.status, StatusCode::SEE_OTHER);
    assert_eq!(resp.location(), Some("/products"));

    let page = app.follow(&resp).await;
    assert!(page.body.contains("Product not found"));
}

#[tokio::test]
async fn test_decrement_removes_line_at_zero() {
    let (mut app, apple, _) = app_with_fruit();
    let id = apple.id.to_string();
    app.add_to_cart(apple.id, 2).await;

    let resp = app.post_htmx("/cart/decrement", &[("product_id", id.as_str())]).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.header("hx-trigger"), Some("cart-updated"));
    assert!(resp.body.contains(r#"id="cart-items""#));
    assert!(shows_count(&badge(&mut app).await, 1));

    let resp = app.post_htmx("/cart/decrement", &[("product_id", id.as_str())]).await;
    assert!(resp.body.contains("Your cart is empty."));
}

#[tokio::test]
async fn test_update_sets_quantity_and_zero_removes() {
    let (mut app, apple, _) = app_with_fruit();
    let id = apple.id.to_string();
    app.add_to_cart(apple.id, 1).await;

    let resp = app
        .post("/cart/update", &[("product_id", id.as_str()), ("quantity", "4")])
        .await;
    assert_eq!(resp.location(), Some("/cart"));
    assert!(shows_count(&badge(&mut app).await, 4));

    app.post("/cart/update", &[("product_id", id.as_str()), ("quantity", "0")])
        .await;
    assert!(shows_count(&badge(&mut app).await, 0));
}

#[tokio::test]
async fn test_remove_and_clear() {
    let (mut app, apple, _) = app_with_fruit();
    let pear = app.backend.add_product("Pear", 200, true);
    let id = apple.id.to_string();
    app.add_to_cart(apple.id, 1).await;
    app.add_to_cart(pear.id, 2).await;

    app.post("/cart/remove", &[("product_id", id.as_str())]).await;
    assert!(shows_count(&badge(&mut app).await, 2));

    let resp = app.post_htmx("/cart/clear", &[]).await;
    assert!(resp.body.contains("Your cart is empty."));
    assert!(shows_count(&badge(&mut app).await, 0));
}

#[tokio::test]
async fn test_oversized_quantities_are_clamped() {
    let (mut app, apple, _) = app_with_fruit();
    let kiwi = app.backend.add_product("Kiwi", 45, true);
    let id = kiwi.id.to_string();

    let resp = app.add_to_cart(apple.id, u32::MAX).await;
    assert_eq!(resp.status, StatusCode::SEE_OTHER);
    app.add_to_cart(kiwi.id, 1).await;
    assert!(shows_count(&badge(&mut app).await, MAX_LINE_QUANTITY + 1));

    let max = u32::MAX.to_string();
    app.post("/cart/update", &[("product_id", id.as_str()), ("quantity", max.as_str())])
        .await;
    assert!(shows_count(&badge(&mut app).await, 2 * MAX_LINE_QUANTITY));

    let page = app.get("/cart").await;
    assert_eq!(page.status, StatusCode::OK);
}

// ============================================================================
// Checkout gate
// ============================================================================

#[tokio::test]
async fn test_anonymous_checkout_redirects_to_sign_in() {
    let (mut app, apple, _) = app_with_fruit();
    app.add_to_cart(apple.id, 1).await;

    let resp = app.get("/checkout").await;
    assert_eq!(resp.status, StatusCode::SEE_OTHER);
    assert_eq!(resp.location(), Some("/signin"));

    let page = app.follow(&resp).await;
    assert!(page.body.contains("Please sign in to proceed to checkout"));
}

#[tokio::test]
async fn test_empty_cart_checkout_redirects_to_catalog() {
    let (mut app, _, _) = app_with_fruit();
    app.sign_in_as_new("grower@orchard.test", false).await;

    let resp = app.get("/checkout").await;
    assert_eq!(resp.status, StatusCode::SEE_OTHER);
    assert_eq!(resp.location(), Some("/products"));

    let resp = app.post("/checkout", SHIPPING).await;
    assert_eq!(resp.location(), Some("/products"));
    assert!(app.backend.orders().is_empty());
}

#[tokio::test]
async fn test_cart_survives_sign_in() {
    let (mut app, apple, _) = app_with_fruit();
    app.add_to_cart(apple.id, 3).await;
    app.sign_in_as_new("grower@orchard.test", false).await;

    assert!(shows_count(&badge(&mut app).await, 3));
    let resp = app.get("/checkout").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.body.contains("Shipping details"));
}

// ============================================================================
// Placing orders
// ============================================================================

#[tokio::test]
async fn test_checkout_places_paid_order_and_clears_cart() {
    let (mut app, apple, _) = app_with_fruit();
    let user = app.sign_in_as_new("grower@orchard.test", false).await;
    app.add_to_cart(apple.id, 2).await;

    let resp = app.post("/checkout", SHIPPING).await;
    assert_eq!(resp.status, StatusCode::SEE_OTHER);
    let location = resp.location().unwrap_or_default().to_string();
    assert!(location.starts_with("/order-success?order_id="));

    let orders = app.backend.orders();
    assert_eq!(orders.len(), 1);
    let order = &orders[0];
    assert_eq!(order.user_id, user);
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.total_amount, apple.price * 2);
    assert!(order.payment_id.as_deref().is_some_and(|p| p.starts_with("pay_")));
    assert_eq!(order.lines.len(), 1);
    assert_eq!(order.lines[0].quantity, 2);
    assert!(order.shipping_address.contains("Fresno"));

    let page = app.follow(&resp).await;
    assert_eq!(page.status, StatusCode::OK);
    assert!(page.body.contains("Thank you for your order!"));
    assert!(page.body.contains("Apple"));

    assert!(shows_count(&badge(&mut app).await, 0));
}

#[tokio::test]
async fn test_invalid_shipping_keeps_cart_and_input() {
    let (mut app, apple, _) = app_with_fruit();
    app.sign_in_as_new("grower@orchard.test", false).await;
    app.add_to_cart(apple.id, 1).await;

    let resp = app
        .post("/checkout", &[("full_name", "Ada Grower"), ("zip_code", "93")])
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.body.contains("Please correct the highlighted fields."));
    assert!(resp.body.contains("Valid ZIP code is required"));
    assert!(resp.body.contains(r#"value="Ada Grower""#));

    assert!(app.backend.orders().is_empty());
    assert!(shows_count(&badge(&mut app).await, 1));
}

#[tokio::test]
async fn test_failed_save_keeps_cart() {
    let (mut app, apple, _) = app_with_fruit();
    app.sign_in_as_new("grower@orchard.test", false).await;
    app.add_to_cart(apple.id, 2).await;
    app.backend.fail_order_saves(true);

    let resp = app.post("/checkout", SHIPPING).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.body.contains("Failed to save your order. Please try again."));
    assert!(shows_count(&badge(&mut app).await, 2));

    app.backend.fail_order_saves(false);
    let resp = app.post("/checkout", SHIPPING).await;
    assert_eq!(resp.status, StatusCode::SEE_OTHER);
    assert_eq!(app.backend.orders().len(), 1);
}

#[tokio::test]
async fn test_declined_payment_saves_nothing_and_keeps_cart() {
    let mut app = TestApp::with_payments(Arc::new(DecliningPayment));
    let apple = app.backend.add_product("Apple", 150, true);
    app.sign_in_as_new("grower@orchard.test", false).await;
    app.add_to_cart(apple.id, 3).await;

    let resp = app.post("/checkout", SHIPPING).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.body.contains("Payment failed. Please try again."));
    assert!(resp.body.contains("Shipping details"));
    assert!(resp.body.contains(r#"value="Ada Grower""#));

    assert!(app.backend.orders().is_empty());
    assert!(shows_count(&badge(&mut app).await, 3));
}

#[tokio::test]
async fn test_order_success_for_unknown_order_is_not_found() {
    let (mut app, _, _) = app_with_fruit();
    app.sign_in_as_new("grower@orchard.test", false).await;

    let resp = app
        .get("/order-success?order_id=5f0c8a3e-1111-4a6b-9c1d-000000000001")
        .await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert!(resp.body.contains("Order not found"));

    let resp = app.get("/order-success").await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}
