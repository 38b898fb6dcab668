//! Checkout and customer order routes

use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult, ValidJson, ValidQuery},
    listing::{Paginated, Pagination},
    middleware::{AuthUser, auth_middleware},
    models::{cart_subtotal, order::{CheckoutRequest, CreateOrderRequest}},
    shipping::calculate_shipping,
    state::AppState,
};

const MAX_MY_ORDERS: i64 = 50;

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/api/checkout", get(checkout_summary).post(checkout))
        .route("/api/orders", post(create_order))
        .route("/api/orders/my", get(my_orders))
        .route("/api/orders/:id", get(get_order))
        .route("/api/orders/:id/cancel", put(cancel_order))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryQuery {
    pub address: Option<String>,
}

/// What the cart would cost if checked out now
pub async fn checkout_summary(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidQuery(query): ValidQuery<SummaryQuery>,
) -> ApiResult<impl IntoResponse> {
    let lines = state.repositories.cart.lines(user.id).await?;
    if lines.is_empty() {
        return Err(ApiError::BadRequest("Cart is empty".to_string()));
    }

    let subtotal = cart_subtotal(&lines);
    let shipping = calculate_shipping(query.address.as_deref().unwrap_or(""), subtotal);

    Ok(Json(json!({
        "success": true,
        "data": {
            "items": lines,
            "subtotal": subtotal,
            "shippingFee": shipping.fee,
            "shipping": shipping,
            "total": subtotal + shipping.fee,
        }
    })))
}

/// Place the cart as an order; a replayed idempotency key returns the first receipt
pub async fn checkout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidJson(payload): ValidJson<CheckoutRequest>,
) -> ApiResult<impl IntoResponse> {
    let outcome = state.orders.checkout(user.id, &user.email, &payload).await?;

    if outcome.duplicate {
        return Ok((
            StatusCode::OK,
            Json(json!({
                "success": true,
                "duplicate": true,
                "data": outcome.receipt,
            })),
        ));
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Order placed",
            "data": outcome.receipt,
        })),
    ))
}

pub async fn create_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidJson(payload): ValidJson<CreateOrderRequest>,
) -> ApiResult<impl IntoResponse> {
    let order = state
        .orders
        .create_order(user.id, &user.email, &payload)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": order })),
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct MyOrdersQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn my_orders(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidQuery(query): ValidQuery<MyOrdersQuery>,
) -> ApiResult<impl IntoResponse> {
    let pagination = Pagination::new(query.page, query.limit, MAX_MY_ORDERS);
    let (orders, total) = state
        .repositories
        .orders
        .list_for_user(user.id, pagination)
        .await?;

    Ok(Json(Paginated::new(orders, total, pagination)))
}

/// Owners see their own orders; staff see any order
pub async fn get_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let detail = state
        .repositories
        .orders
        .detail(id)
        .await?
        .filter(|d| user.is_staff() || d.order.user_id == Some(user.id))
        .ok_or_else(|| ApiError::NotFound("Order not found".to_string()))?;

    Ok(Json(json!({ "success": true, "data": detail })))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let order = state.orders.cancel(id, user.id).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Order cancelled",
        "data": order,
    })))
}
