use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult, ValidQuery},
    middleware::{AuthUser, auth_middleware, require_staff},
    models::NotificationQuery,
    state::AppState,
};

pub fn router(state: &AppState) -> Router<AppState> {
    let staff = Router::new()
        .route("/api/notifications/send-stock-alerts", post(send_stock_alerts))
        .route_layer(middleware::from_fn(require_staff));

    Router::new()
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/unread-count", get(unread_count))
        .route("/api/notifications/read-all", put(mark_all_read))
        .route("/api/notifications/:id/read", put(mark_read))
        .route("/api/notifications/:id", delete(delete_notification))
        .merge(staff)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidQuery(query): ValidQuery<NotificationQuery>,
) -> ApiResult<impl IntoResponse> {
    let notifications = state
        .repositories
        .notifications
        .list(user.id, query.limit(), query.unread_only())
        .await?;
    let unread = state.repositories.notifications.unread_count(user.id).await?;

    Ok(Json(json!({
        "success": true,
        "data": notifications,
        "unreadCount": unread,
    })))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let count = state.repositories.notifications.unread_count(user.id).await?;
    Ok(Json(json!({ "success": true, "data": { "count": count } })))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    if !state.repositories.notifications.mark_read(id, user.id).await? {
        return Err(ApiError::NotFound("Notification not found".to_string()));
    }
    Ok(Json(json!({ "success": true, "message": "Notification marked as read" })))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let updated = state.repositories.notifications.mark_all_read(user.id).await?;
    Ok(Json(json!({ "success": true, "data": { "updated": updated } })))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    if !state.repositories.notifications.delete(id, user.id).await? {
        return Err(ApiError::NotFound("Notification not found".to_string()));
    }
    Ok(Json(json!({ "success": true, "message": "Notification deleted" })))
}

/// Run the low-stock sweep now instead of waiting for the worker
pub async fn send_stock_alerts(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let sent = state.notifier.send_low_stock_alerts().await?;
    Ok(Json(json!({ "success": true, "data": { "sent": sent } })))
}
