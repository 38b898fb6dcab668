//! Point of sale

use axum::{
    Extension, Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;

use crate::{
    error::{ApiResult, ValidJson, ValidQuery},
    listing::{MAX_LIMIT, Paginated, Pagination, search_term},
    middleware::{AuthUser, auth_middleware, require_sales},
    models::order::{PosHistoryQuery, PosOrderRequest},
    repositories::OrderFilter,
    state::AppState,
};

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/api/pos/order", post(create_pos_order))
        .route("/api/pos/orders", get(todays_orders))
        .route("/api/pos/history", get(order_history))
        .route_layer(middleware::from_fn(require_sales))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
}

pub async fn create_pos_order(
    State(state): State<AppState>,
    Extension(staff): Extension<AuthUser>,
    ValidJson(payload): ValidJson<PosOrderRequest>,
) -> ApiResult<impl IntoResponse> {
    let order = state
        .orders
        .create_pos_order(staff.id, &staff.email, &payload)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": order })),
    ))
}

pub async fn todays_orders(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let orders = state.repositories.orders.pos_today().await?;
    let revenue: i64 = orders
        .iter()
        .filter(|o| o.order.status != crate::models::OrderStatus::Cancelled)
        .map(|o| o.order.total)
        .sum();

    Ok(Json(json!({
        "success": true,
        "data": orders,
        "summary": { "count": orders.len(), "revenue": revenue },
    })))
}

pub async fn order_history(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<PosHistoryQuery>,
) -> ApiResult<impl IntoResponse> {
    let pagination = Pagination::new(query.page, query.limit, MAX_LIMIT);
    let filter = OrderFilter {
        search: search_term(query.search.as_deref()),
        payment_method: search_term(query.payment.as_deref()),
        from: query.from,
        to: query.to,
        ..Default::default()
    };

    let (orders, total) = state
        .repositories
        .orders
        .pos_history(filter, pagination)
        .await?;

    Ok(Json(Paginated::new(orders, total, pagination)))
}

#[cfg(test)]
mod tests {
    use crate::routes::{
        create_router,
        test_helpers::{body_json, request},
    };
    use crate::state::test_support;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_pos_needs_authentication() {
        let app = create_router(test_support::state());
        let response = app
            .oneshot(request(
                "POST",
                "/api/pos/order",
                None,
                Some(r#"{"items":[]}"#),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["success"], false);
    }
}
