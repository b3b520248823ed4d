use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use opensase_cart::api::{self, AppState, USER_HEADER};
use opensase_cart::domain::aggregates::Product;
use opensase_cart::domain::value_objects::{Money, ProductId, UserId};
use opensase_cart::store::MemoryStore;
use opensase_cart::{CartEngine, EngineSettings};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn app() -> (Router, MemoryStore, ProductId) {
    let store = MemoryStore::new();
    let product = Product::create("Desk Lamp", Money::usd(Decimal::new(2500, 2)), 10).with_image("https://cdn.example/lamp.png");
    let id = product.id();
    store.insert_product(product).await;
    let engine = CartEngine::new(Arc::new(store.clone()), EngineSettings::default());
    (api::router(AppState { engine: Arc::new(engine) }), store, id)
}

async fn send(app: &Router, method: &str, uri: &str, user: Option<UserId>, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        req = req.header(USER_HEADER, user.to_string());
    }
    let req = match body {
        Some(b) => req.header("content-type", "application/json").body(Body::from(b.to_string())).unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let (app, _, _) = app().await;
    let (status, body) = send(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_requires_user_header() {
    let (app, _, _) = app().await;
    let (status, body) = send(&app, "GET", "/api/v1/cart", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthenticated");
}

#[tokio::test]
async fn test_cart_lifecycle() {
    let (app, store, p) = app().await;
    let user = Some(UserId::new());

    let (status, body) = send(&app, "GET", "/api/v1/cart", user, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_null());

    let (status, body) = send(&app, "POST", "/api/v1/cart/items", user, Some(json!({"product_id": p, "quantity": 3}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"][0]["quantity"], 3);
    assert_eq!(body["items"][0]["title"], "Desk Lamp");
    assert_eq!(body["items"][0]["display_source"], "live");
    assert_eq!(body["total_before_discount"], "75.00");
    assert_eq!(store.product(p).await.unwrap().inventory_available(), 7);

    let (status, body) = send(&app, "PUT", &format!("/api/v1/cart/items/{p}"), user, Some(json!({"quantity": 1}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"][0]["quantity"], 1);

    let (status, body) = send(&app, "POST", "/api/v1/cart/checkout", user, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "CheckedOut");
    let product = store.product(p).await.unwrap();
    assert_eq!((product.inventory_total(), product.inventory_available()), (9, 9));
}

#[tokio::test]
async fn test_error_mapping() {
    let (app, _, p) = app().await;
    let user = Some(UserId::new());

    let (status, body) = send(&app, "POST", "/api/v1/cart/items", user, Some(json!({"product_id": p, "quantity": 11}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "insufficient_stock");

    let (status, body) = send(&app, "POST", "/api/v1/cart/items", user, Some(json!({"product_id": p, "quantity": 0}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");

    let (status, body) = send(&app, "DELETE", &format!("/api/v1/cart/items/{p}"), user, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "cart_not_found");

    let (status, _) = send(&app, "POST", "/api/v1/cart", user, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&app, "POST", "/api/v1/cart/checkout", user, None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "Cannot checkout empty cart");

    let (status, body) = send(&app, "PUT", &format!("/api/v1/cart/items/{p}"), user, Some(json!({"quantity": 2}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Product not found in cart");
}

#[tokio::test]
async fn test_quantities_are_bounded_by_stock_only() {
    let (app, _, p) = app().await;
    let user = Some(UserId::new());

    let (status, body) = send(&app, "PUT", &format!("/api/v1/cart/items/{p}"), user, Some(json!({"quantity": 3}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "item_not_in_cart");

    let (status, body) = send(&app, "POST", "/api/v1/cart/items", user, Some(json!({"product_id": p, "quantity": 10001}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "insufficient_stock");

    let (status, _) = send(&app, "POST", "/api/v1/cart/items", user, Some(json!({"product_id": p, "quantity": 1}))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&app, "PUT", &format!("/api/v1/cart/items/{p}"), user, Some(json!({"quantity": 10001}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "insufficient_stock");
}

#[tokio::test]
async fn test_clear_abandon_and_warnings() {
    let (app, store, p) = app().await;
    let user = Some(UserId::new());

    send(&app, "POST", "/api/v1/cart/items", user, Some(json!({"product_id": p, "quantity": 6}))).await;
    let (status, body) = send(&app, "GET", "/api/v1/cart/warnings", user, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["kind"], "low_stock");

    let (status, body) = send(&app, "DELETE", "/api/v1/cart", user, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["item_count"], 0);
    assert_eq!(store.product(p).await.unwrap().inventory_available(), 10);

    send(&app, "POST", "/api/v1/cart/items", user, Some(json!({"product_id": p, "quantity": 2}))).await;
    let (status, body) = send(&app, "POST", "/api/v1/cart/abandon", user, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Abandoned");
    assert_eq!(store.product(p).await.unwrap().inventory_available(), 10);
}
