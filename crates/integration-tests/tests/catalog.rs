//! Integration tests for catalog browsing.
//!
//! Run with: cargo test -p orchard-integration-tests --test catalog

use axum::http::StatusCode;
use orchard_integration_tests::TestApp;

/// Seed the four-fruit catalog used throughout these tests.
fn stocked_app() -> TestApp {
    let app = TestApp::new();
    app.backend.add_product("Strawberry", 450, true);
    app.backend.add_product("Apple", 120, true);
    app.backend.add_product("Blueberry", 600, true);
    app.backend.add_product("Cherry", 300, false);
    app
}

fn card_position(body: &str, name: &str) -> usize {
    body.find(&format!("<h3>{name}</h3>"))
        .unwrap_or_else(|| panic!("{name} not listed"))
}

// ============================================================================
// Health and home
// ============================================================================

#[tokio::test]
async fn test_health_check() {
    let mut app = TestApp::new();
    let resp = app.get("/health").await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body, "ok");
    assert!(resp.header("x-request-id").is_some());
}

#[tokio::test]
async fn test_home_features_in_stock_fruit_only() {
    let mut app = stocked_app();
    let resp = app.get("/").await;

    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.body.contains("<h3>Apple</h3>"));
    assert!(!resp.body.contains("<h3>Cherry</h3>"));
}

// ============================================================================
// Listing
// ============================================================================

#[tokio::test]
async fn test_listing_defaults_to_name_order() {
    let mut app = stocked_app();
    let resp = app.get("/products").await;

    assert_eq!(resp.status, StatusCode::OK);
    let apple = card_position(&resp.body, "Apple");
    let blueberry = card_position(&resp.body, "Blueberry");
    let cherry = card_position(&resp.body, "Cherry");
    let strawberry = card_position(&resp.body, "Strawberry");
    assert!(apple < blueberry && blueberry < cherry && cherry < strawberry);
}

#[tokio::test]
async fn test_listing_search_and_price_sort() {
    let mut app = stocked_app();
    let resp = app.get("/products?q=BERRY&sort=price-desc").await;

    assert_eq!(resp.status, StatusCode::OK);
    assert!(!resp.body.contains("<h3>Apple</h3>"));
    assert!(card_position(&resp.body, "Blueberry") < card_position(&resp.body, "Strawberry"));
    assert!(resp.body.contains(r#"value="BERRY""#));
}

#[tokio::test]
async fn test_listing_unknown_sort_falls_back() {
    let mut app = stocked_app();
    let resp = app.get("/products?sort=sideways").await;

    assert_eq!(resp.status, StatusCode::OK);
    assert!(card_position(&resp.body, "Apple") < card_position(&resp.body, "Strawberry"));
}

#[tokio::test]
async fn test_listing_with_no_match_says_so() {
    let mut app = stocked_app();
    let resp = app.get("/products?q=durian").await;

    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.body.contains("No products match your search."));
}

// ============================================================================
// Product page
// ============================================================================

#[tokio::test]
async fn test_product_page_shows_details() {
    let mut app = stocked_app();
    let product = app.backend.add_product("Pear", 175, true);

    let resp = app.get(&format!("/products/{}", product.id)).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.body.contains("Pear"));
    assert!(resp.body.contains(&product.price.to_string()));
}

#[tokio::test]
async fn test_missing_product_renders_not_found() {
    let mut app = stocked_app();

    let resp = app.get("/products/999").await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert!(resp.body.contains("Product not found"));

    let resp = app.get("/products/not-a-number").await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}
