//! HTTP controller for the cart engine.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;
use validator::Validate;

use crate::domain::value_objects::{ProductId, UserId};
use crate::engine::{CartEngine, CartSnapshot, InventoryWarning};
use crate::error::CartError;

pub const USER_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AppState { pub engine: Arc<CartEngine> }

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "opensase-cart"})) }))
        .route("/api/v1/cart", get(get_cart).post(create_cart).delete(clear_cart))
        .route("/api/v1/cart/items", post(add_item))
        .route("/api/v1/cart/items/:product_id", put(update_item).delete(remove_item))
        .route("/api/v1/cart/checkout", post(checkout))
        .route("/api/v1/cart/abandon", post(abandon))
        .route("/api/v1/cart/warnings", get(warnings))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
        .with_state(state)
}

/// Caller identity taken from the `X-User-Id` header.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub UserId);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.headers.get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<UserId>().ok())
            .map(CurrentUser)
            .ok_or(ApiError::Unauthenticated)
    }
}

#[derive(Debug)]
pub enum ApiError {
    Unauthenticated,
    Validation(String),
    Cart(CartError),
}

impl From<CartError> for ApiError {
    fn from(e: CartError) -> Self { Self::Cart(e) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            Self::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated", "Missing or invalid X-User-Id header".to_string()),
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, "validation", msg),
            Self::Cart(e) => {
                let status = match &e {
                    CartError::ProductNotFound | CartError::CartNotFound | CartError::ItemNotInCart => StatusCode::NOT_FOUND,
                    CartError::InsufficientStock { .. } | CartError::ConcurrencyConflict => StatusCode::CONFLICT,
                    CartError::EmptyCart | CartError::CurrencyMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                    CartError::InvalidQuantity => StatusCode::BAD_REQUEST,
                    CartError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.code(), e.to_string())
            }
        };
        (status, Json(serde_json::json!({"error": message, "code": code}))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: u32,
}

fn validate(req: &impl Validate) -> Result<(), ApiError> {
    req.validate().map_err(|e| ApiError::Validation(e.to_string()))
}

async fn get_cart(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> ApiResult<Option<CartSnapshot>> {
    Ok(Json(s.engine.get_active_cart(user).await?))
}

async fn create_cart(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> ApiResult<CartSnapshot> {
    Ok(Json(s.engine.create_empty_cart(user).await?))
}

async fn clear_cart(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> ApiResult<CartSnapshot> {
    Ok(Json(s.engine.clear_cart(user).await?))
}

async fn add_item(State(s): State<AppState>, CurrentUser(user): CurrentUser, Json(r): Json<AddItemRequest>) -> ApiResult<CartSnapshot> {
    validate(&r)?;
    Ok(Json(s.engine.add_item(user, ProductId::from_uuid(r.product_id), r.quantity).await?))
}

async fn update_item(State(s): State<AppState>, CurrentUser(user): CurrentUser, Path(product_id): Path<Uuid>, Json(r): Json<UpdateItemRequest>) -> ApiResult<CartSnapshot> {
    Ok(Json(s.engine.update_item_quantity(user, ProductId::from_uuid(product_id), r.quantity).await?))
}

async fn remove_item(State(s): State<AppState>, CurrentUser(user): CurrentUser, Path(product_id): Path<Uuid>) -> ApiResult<CartSnapshot> {
    Ok(Json(s.engine.remove_item(user, ProductId::from_uuid(product_id)).await?))
}

async fn checkout(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> ApiResult<CartSnapshot> {
    Ok(Json(s.engine.checkout_cart(user).await?))
}

async fn abandon(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> ApiResult<CartSnapshot> {
    Ok(Json(s.engine.abandon_cart(user).await?))
}

async fn warnings(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> ApiResult<Vec<InventoryWarning>> {
    Ok(Json(s.engine.get_inventory_warnings(user).await?))
}
