use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, put},
};
use common::validation::validate_quantity;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult, ValidJson},
    middleware::{AuthUser, auth_middleware},
    models::{AddToCartRequest, CartLine, UpdateCartRequest, cart_subtotal},
    state::AppState,
};

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/api/cart", get(get_cart).post(add_to_cart).delete(clear_cart))
        .route("/api/cart/:id", put(update_cart_line).delete(remove_cart_line))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
}

fn cart_body(lines: Vec<CartLine>) -> serde_json::Value {
    let subtotal = cart_subtotal(&lines);
    let item_count: i64 = lines.iter().map(|l| i64::from(l.quantity)).sum();
    json!({
        "success": true,
        "data": {
            "items": lines,
            "subtotal": subtotal,
            "itemCount": item_count,
        }
    })
}

fn stock_error(stock: i32) -> ApiError {
    ApiError::BadRequest(format!("Only {} items left in stock", stock))
}

pub async fn get_cart(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let lines = state.repositories.cart.lines(user.id).await?;
    Ok(Json(cart_body(lines)))
}

/// Add a product; an existing line for the same product grows instead
pub async fn add_to_cart(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidJson(payload): ValidJson<AddToCartRequest>,
) -> ApiResult<impl IntoResponse> {
    let quantity = payload.quantity.unwrap_or(1);
    validate_quantity(quantity).map_err(ApiError::Validation)?;

    let product = state
        .repositories
        .products
        .find_by_id(payload.product_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Product not found".to_string()))?;

    let in_cart = state
        .repositories
        .cart
        .quantity_of(user.id, product.id)
        .await?;
    if in_cart + quantity > product.stock {
        return Err(stock_error(product.stock));
    }

    state
        .repositories
        .cart
        .add(user.id, product.id, quantity)
        .await?;
    info!("User {} added {} x {} to cart", user.id, quantity, product.id);

    let lines = state.repositories.cart.lines(user.id).await?;
    Ok((StatusCode::CREATED, Json(cart_body(lines))))
}

pub async fn update_cart_line(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    ValidJson(payload): ValidJson<UpdateCartRequest>,
) -> ApiResult<impl IntoResponse> {
    validate_quantity(payload.quantity).map_err(ApiError::Validation)?;

    let line = state
        .repositories
        .cart
        .find_line(id, user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Cart item not found".to_string()))?;
    if payload.quantity > line.stock {
        return Err(stock_error(line.stock));
    }

    state
        .repositories
        .cart
        .set_quantity(id, user.id, payload.quantity)
        .await?;

    let lines = state.repositories.cart.lines(user.id).await?;
    Ok(Json(cart_body(lines)))
}

pub async fn remove_cart_line(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    if !state.repositories.cart.remove(id, user.id).await? {
        return Err(ApiError::NotFound("Cart item not found".to_string()));
    }

    let lines = state.repositories.cart.lines(user.id).await?;
    Ok(Json(cart_body(lines)))
}

pub async fn clear_cart(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let removed = state.repositories.cart.clear(user.id).await?;
    info!("Cleared {} cart lines for user {}", removed, user.id);

    Ok(Json(json!({ "success": true, "message": "Cart cleared" })))
}
