//! Warehouse stock and inventory endpoints

use axum::{
    Extension, Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult, ValidJson, ValidQuery},
    inventory::MovementNote,
    listing::{MAX_LIMIT, Paginated, Pagination, search_term},
    middleware::AuthUser,
    models::inventory::{
        AdjustStockRequest, LowStockQuery, Movement, MovementKind, StockHistoryQuery,
        StockListQuery, StockMoveRequest,
    },
    repositories::inventory::{HistoryFilter, StockFilter},
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/warehouse/stock", get(list_stock))
        .route("/api/warehouse/stock/import", post(import_stock))
        .route("/api/warehouse/stock/export", post(export_stock))
        .route("/api/warehouse/stock/adjust", post(adjust_stock))
        .route("/api/warehouse/stock/history", get(stock_history))
        .route("/api/warehouse/inventory/summary", get(inventory_summary))
        .route("/api/warehouse/inventory/low-stock", get(low_stock))
        .route("/api/warehouse/inventory/report", get(category_report))
}

pub async fn list_stock(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<StockListQuery>,
) -> ApiResult<impl IntoResponse> {
    let pagination = Pagination::new(query.page, query.limit, MAX_LIMIT);
    let filter = StockFilter {
        search: search_term(query.search.as_deref()),
        low_stock_only: query.low_stock.unwrap_or(false),
    };

    let (levels, total) = state
        .repositories
        .inventory
        .list_levels(&filter, pagination)
        .await?;

    Ok(Json(Paginated::new(levels, total, pagination)))
}

async fn record(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    movement: Movement,
    note: MovementNote<'_>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let transaction = state
        .inventory
        .apply(product_id, movement, note, user.id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": transaction })),
    ))
}

pub async fn import_stock(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidJson(payload): ValidJson<StockMoveRequest>,
) -> ApiResult<impl IntoResponse> {
    let note = MovementNote {
        reason: payload.reason.as_deref(),
        reference: payload.reference.as_deref(),
    };
    record(&state, &user, payload.product_id, Movement::Import(payload.quantity), note).await
}

pub async fn export_stock(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidJson(payload): ValidJson<StockMoveRequest>,
) -> ApiResult<impl IntoResponse> {
    let note = MovementNote {
        reason: payload.reason.as_deref(),
        reference: payload.reference.as_deref(),
    };
    record(&state, &user, payload.product_id, Movement::Export(payload.quantity), note).await
}

/// Replace the stock with a counted level
pub async fn adjust_stock(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidJson(payload): ValidJson<AdjustStockRequest>,
) -> ApiResult<impl IntoResponse> {
    if payload.reason.as_deref().map(str::trim).unwrap_or("").is_empty() {
        return Err(ApiError::Validation(
            "A reason is required for stock adjustments".to_string(),
        ));
    }
    let note = MovementNote {
        reason: payload.reason.as_deref(),
        reference: None,
    };
    record(&state, &user, payload.product_id, Movement::Adjust(payload.new_stock), note).await
}

pub async fn stock_history(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<StockHistoryQuery>,
) -> ApiResult<impl IntoResponse> {
    let pagination = Pagination::new(query.page, query.limit, MAX_LIMIT);
    let kind = search_term(query.kind.as_deref())
        .map(|raw| raw.parse::<MovementKind>())
        .transpose()
        .map_err(ApiError::Validation)?;
    let filter = HistoryFilter {
        product_id: query.product_id,
        kind,
        from: query.from,
        to: query.to,
    };

    let (transactions, total) = state
        .repositories
        .inventory
        .history(&filter, pagination)
        .await?;

    Ok(Json(Paginated::new(transactions, total, pagination)))
}

pub async fn inventory_summary(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let summary = state.repositories.inventory.summary(Utc::now()).await?;
    Ok(Json(json!({ "success": true, "data": summary })))
}

pub async fn low_stock(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<LowStockQuery>,
) -> ApiResult<impl IntoResponse> {
    if query.threshold.is_some_and(|t| t < 0) {
        return Err(ApiError::Validation(
            "Threshold must be zero or greater".to_string(),
        ));
    }
    let products = state.repositories.inventory.low_stock(query.threshold).await?;
    Ok(Json(json!({ "success": true, "data": products })))
}

pub async fn category_report(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let report = state.repositories.inventory.category_report().await?;
    Ok(Json(json!({ "success": true, "data": report })))
}

#[cfg(test)]
mod tests {
    use crate::routes::{
        create_router,
        test_helpers::{body_json, request},
    };
    use crate::state::test_support;
    use axum::http::StatusCode;
    use common::jwt::Role;
    use tower::ServiceExt;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_stock_moves_require_login() {
        let app = create_router(test_support::state());
        let response = app
            .oneshot(request(
                "POST",
                "/api/warehouse/stock/export",
                None,
                Some(r#"{"productId":"00000000-0000-0000-0000-000000000001","quantity":1}"#),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL database"]
    async fn test_sales_staff_cannot_move_stock() {
        let state = test_support::db_state().await;
        let (sales_id, email) = test_support::seed_user(&state, Role::Sales).await;
        let token = test_support::token_for(&state, sales_id, &email, Role::Sales);

        let response = create_router(state)
            .oneshot(request(
                "POST",
                "/api/warehouse/stock/import",
                Some(&token),
                Some(r#"{"productId":"00000000-0000-0000-0000-000000000001","quantity":1}"#),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL database"]
    async fn test_export_over_stock_is_refused() {
        let state = test_support::db_state().await;
        let (staff_id, email) = test_support::seed_user(&state, Role::Warehouse).await;
        let token = test_support::token_for(&state, staff_id, &email, Role::Warehouse);
        let product_id: Uuid = sqlx::query_scalar(
            "INSERT INTO products (name, slug, price, stock) VALUES ('Crate Beans', $1, 500, 2) RETURNING id",
        )
        .bind(format!("crate-beans-{}", Uuid::new_v4()))
        .fetch_one(&state.db_pool)
        .await
        .unwrap();

        let body = format!(r#"{{"productId":"{}","quantity":3}}"#, product_id);
        let response = create_router(state.clone())
            .oneshot(request(
                "POST",
                "/api/warehouse/stock/export",
                Some(&token),
                Some(&body),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["error"],
            "Not enough stock. Currently in stock: 2"
        );

        let body = format!(r#"{{"productId":"{}","quantity":2}}"#, product_id);
        let response = create_router(state.clone())
            .oneshot(request(
                "POST",
                "/api/warehouse/stock/export",
                Some(&token),
                Some(&body),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let json = body_json(response).await;
        assert_eq!(json["data"]["type"], "export");
        assert_eq!(json["data"]["stockAfter"], 0);
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL database"]
    async fn test_adjust_needs_a_reason() {
        let state = test_support::db_state().await;
        let (staff_id, email) = test_support::seed_user(&state, Role::Admin).await;
        let token = test_support::token_for(&state, staff_id, &email, Role::Admin);

        let response = create_router(state)
            .oneshot(request(
                "POST",
                "/api/warehouse/stock/adjust",
                Some(&token),
                Some(r#"{"productId":"00000000-0000-0000-0000-000000000001","newStock":4}"#),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
