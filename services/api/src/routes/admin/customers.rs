//! Customer accounts as managed by admins

use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, put},
};
use common::{jwt::Role, validation::sanitize_text};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::staff::is_last_active_admin;
use crate::{
    error::{ApiError, ApiResult, ValidJson, ValidQuery},
    listing::{ListParams, Paginated},
    middleware::AuthUser,
    models::user::{SetStatusRequest, UpdateCustomerRequest},
    repositories::user::CUSTOMER_SORT,
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/users", get(list_users))
        .route("/api/admin/users/:id", get(get_user).put(update_user))
        .route("/api/admin/users/:id/status", put(set_status))
}

pub async fn list_users(
    State(state): State<AppState>,
    ValidQuery(params): ValidQuery<ListParams>,
) -> ApiResult<impl IntoResponse> {
    let pagination = params.pagination();
    let search = params.search_term();

    let (users, total) = state
        .repositories
        .users
        .list_customers(search.as_deref(), pagination, params.sort_by(&CUSTOMER_SORT))
        .await?;

    Ok(Json(Paginated::new(users, total, pagination)))
}

/// Profile with the full order history
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let detail = state
        .repositories
        .users
        .customer_detail(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(json!({ "success": true, "data": detail })))
}

/// Profile and role changes; an admin cannot demote themselves or the last active admin
pub async fn update_user(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    ValidJson(payload): ValidJson<UpdateCustomerRequest>,
) -> ApiResult<impl IntoResponse> {
    let role = payload.validate().map_err(ApiError::Validation)?;

    if role.is_some_and(|r| r != Role::Admin) {
        if id == admin.id {
            return Err(ApiError::BadRequest(
                "You cannot change your own role".to_string(),
            ));
        }

        let target = state
            .repositories
            .users
            .find_customer(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
        if is_last_active_admin(&state, target.role, target.is_active).await? {
            return Err(ApiError::BadRequest(
                "Cannot change the role of the last active admin".to_string(),
            ));
        }
    }

    let name = payload.name.as_deref().map(sanitize_text);
    let address = payload.address.as_deref().map(sanitize_text);

    let user = state
        .repositories
        .users
        .update_customer(
            id,
            name.as_deref(),
            payload.phone.as_deref().map(str::trim),
            address.as_deref(),
            role,
        )
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    info!("Updated user {}", id);
    Ok(Json(json!({ "success": true, "data": user })))
}

/// Admin accounts cannot be switched off from here
pub async fn set_status(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    ValidJson(payload): ValidJson<SetStatusRequest>,
) -> ApiResult<impl IntoResponse> {
    if id == admin.id {
        return Err(ApiError::BadRequest(
            "You cannot change your own status".to_string(),
        ));
    }

    let user = state
        .repositories
        .users
        .find_customer(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    if !payload.is_active && user.role == Role::Admin {
        return Err(ApiError::BadRequest(
            "Admin accounts cannot be deactivated".to_string(),
        ));
    }

    state
        .repositories
        .users
        .set_active(id, payload.is_active)
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": { "id": id, "isActive": payload.is_active },
    })))
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

    #[tokio::test]
    async fn test_user_update_requires_admin() {
        let state = test_support::state();
        let app = create_router(state);
        let response = app
            .oneshot(request(
                "PUT",
                "/api/admin/users/00000000-0000-0000-0000-000000000001",
                None,
                Some(r#"{"role":"user"}"#),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL database"]
    async fn test_admin_cannot_demote_themselves() {
        let state = test_support::db_state().await;
        let (admin_id, email) = test_support::seed_user(&state, Role::Admin).await;
        let token = test_support::token_for(&state, admin_id, &email, Role::Admin);

        let app = create_router(state.clone());
        let response = app
            .oneshot(request(
                "PUT",
                &format!("/api/admin/users/{}", admin_id),
                Some(&token),
                Some(r#"{"role":"user"}"#),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "You cannot change your own role");

        let role: String = sqlx::query_scalar("SELECT role FROM users WHERE id = $1")
            .bind(admin_id)
            .fetch_one(&state.db_pool)
            .await
            .unwrap();
        assert_eq!(role, "admin");
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL database"]
    async fn test_admin_can_demote_another_admin() {
        let state = test_support::db_state().await;
        let (admin_id, email) = test_support::seed_user(&state, Role::Admin).await;
        let (other_id, _) = test_support::seed_user(&state, Role::Admin).await;
        let token = test_support::token_for(&state, admin_id, &email, Role::Admin);

        let app = create_router(state);
        let response = app
            .oneshot(request(
                "PUT",
                &format!("/api/admin/users/{}", other_id),
                Some(&token),
                Some(r#"{"role":"user"}"#),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["data"]["role"], "user");
    }
}
