use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, put},
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult, ValidJson, ValidQuery},
    listing::{MAX_LIMIT, Paginated, Pagination, search_term},
    models::order::{OrderListQuery, UpdateOrderStatusRequest},
    repositories::{OrderFilter, order::ADMIN_ORDER_SORT},
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/orders", get(list_orders))
        .route("/api/admin/orders/:id", get(get_order))
        .route("/api/admin/orders/:id/status", put(update_status))
}

pub async fn list_orders(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<OrderListQuery>,
) -> ApiResult<impl IntoResponse> {
    let pagination = Pagination::new(query.page, query.limit, MAX_LIMIT);
    let sort = ADMIN_ORDER_SORT.resolve(query.sort.as_deref(), query.order.as_deref());
    let filter = OrderFilter {
        search: search_term(query.search.as_deref()),
        status: query.status,
        from: query.from,
        to: query.to,
        ..Default::default()
    };

    let (orders, total) = state
        .repositories
        .orders
        .list(&filter, pagination, sort)
        .await?;

    Ok(Json(Paginated::new(orders, total, pagination)))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let detail = state
        .repositories
        .orders
        .detail(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Order not found".to_string()))?;

    Ok(Json(json!({ "success": true, "data": detail })))
}

pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidJson(payload): ValidJson<UpdateOrderStatusRequest>,
) -> ApiResult<impl IntoResponse> {
    let order = state.orders.update_status(id, payload.status).await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("Order status updated to {}", order.status),
        "data": order,
    })))
}
