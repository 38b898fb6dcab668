use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
};
use common::{
    error::DatabaseError,
    jwt::Role,
    validation::{normalize_email, sanitize_text, validate_staff_password},
};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult, ValidJson, ValidQuery, is_unique_violation},
    listing::{MAX_LIMIT, Paginated, Pagination, search_term},
    middleware::AuthUser,
    models::{
        StaffMember,
        user::{
            CreateStaffRequest, ResetStaffPasswordRequest, SetStatusRequest, StaffListQuery,
            UpdateStaffRequest, is_sole_active_admin, parse_staff_role,
        },
    },
    repositories::user::STAFF_SORT,
    state::AppState,
};

pub const BCRYPT_COST: u32 = 12;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/staff", get(list_staff).post(create_staff))
        .route(
            "/api/admin/staff/:id",
            get(get_staff).put(update_staff).delete(delete_staff),
        )
        .route("/api/admin/staff/:id/password", put(reset_password))
        .route("/api/admin/staff/:id/status", put(set_status))
}

async fn hash_password(password: &str) -> ApiResult<String> {
    let password = password.to_string();
    let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, BCRYPT_COST))
        .await
        .map_err(|e| ApiError::Internal(format!("hashing task failed: {}", e)))??;
    Ok(hash)
}

async fn find_staff(state: &AppState, id: Uuid) -> ApiResult<StaffMember> {
    state
        .repositories
        .users
        .find_staff(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Staff member not found".to_string()))
}

/// Whether taking an account with `role` out of the active admins would leave none.
///
/// The count is read without a lock, so two concurrent requests can both pass.
pub(super) async fn is_last_active_admin(
    state: &AppState,
    role: Role,
    is_active: bool,
) -> ApiResult<bool> {
    if role != Role::Admin || !is_active {
        return Ok(false);
    }
    let active_admins = state.repositories.users.count_active_admins().await?;
    Ok(is_sole_active_admin(role, is_active, active_admins))
}

pub async fn list_staff(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<StaffListQuery>,
) -> ApiResult<impl IntoResponse> {
    let role = query
        .role
        .as_deref()
        .filter(|r| !r.trim().is_empty())
        .map(parse_staff_role)
        .transpose()
        .map_err(ApiError::Validation)?;

    let pagination = Pagination::new(query.page, query.limit, MAX_LIMIT);
    let sort = STAFF_SORT.resolve(query.sort.as_deref(), query.order.as_deref());
    let search = search_term(query.search.as_deref());

    let (staff, total) = state
        .repositories
        .users
        .list_staff(search.as_deref(), role, pagination, sort)
        .await?;

    Ok(Json(Paginated::new(staff, total, pagination)))
}

pub async fn get_staff(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let staff = find_staff(&state, id).await?;
    Ok(Json(json!({ "success": true, "data": staff })))
}

pub async fn create_staff(
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<CreateStaffRequest>,
) -> ApiResult<impl IntoResponse> {
    let role = payload.validate().map_err(ApiError::Validation)?;
    let email = normalize_email(&payload.email);

    if state.repositories.users.email_taken(&email).await? {
        return Err(ApiError::Conflict("Email is already in use".to_string()));
    }

    let password_hash = hash_password(&payload.password).await?;
    let name = sanitize_text(&payload.name);
    let phone = payload
        .phone
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());

    let staff = state
        .repositories
        .users
        .create_staff(&email, &password_hash, &name, role, phone)
        .await
        .map_err(|e| match &e {
            DatabaseError::Query(err) if is_unique_violation(err) => {
                ApiError::Conflict("Email is already in use".to_string())
            }
            _ => e.into(),
        })?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": staff })),
    ))
}

pub async fn update_staff(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidJson(payload): ValidJson<UpdateStaffRequest>,
) -> ApiResult<impl IntoResponse> {
    let role = payload.validate().map_err(ApiError::Validation)?;
    let target = find_staff(&state, id).await?;

    if role.is_some_and(|r| r != Role::Admin) && is_last_active_admin(&state, target.role, target.is_active).await? {
        return Err(ApiError::BadRequest(
            "Cannot change the role of the last active admin".to_string(),
        ));
    }

    let name = payload.name.as_deref().map(sanitize_text);
    let phone = payload.phone.as_deref().map(str::trim);
    let staff = state
        .repositories
        .users
        .update_staff(id, name.as_deref(), role, phone)
        .await?
        .ok_or_else(|| ApiError::NotFound("Staff member not found".to_string()))?;

    info!("Updated staff member {}", id);
    Ok(Json(json!({ "success": true, "data": staff })))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidJson(payload): ValidJson<ResetStaffPasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    validate_staff_password(&payload.password).map_err(ApiError::Validation)?;
    find_staff(&state, id).await?;

    let password_hash = hash_password(&payload.password).await?;
    state
        .repositories
        .users
        .set_password(id, &password_hash)
        .await?;
    info!("Password reset for staff member {}", id);

    Ok(Json(json!({ "success": true, "message": "Password updated" })))
}

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

    let target = find_staff(&state, id).await?;
    if !payload.is_active && is_last_active_admin(&state, target.role, target.is_active).await? {
        return Err(ApiError::BadRequest(
            "Cannot deactivate the last active admin".to_string(),
        ));
    }

    state
        .repositories
        .users
        .set_active(id, payload.is_active)
        .await?;
    info!(
        "Staff member {} {} by {}",
        id,
        if payload.is_active { "activated" } else { "deactivated" },
        admin.id
    );

    Ok(Json(json!({
        "success": true,
        "data": { "id": id, "isActive": payload.is_active },
    })))
}

pub async fn delete_staff(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    if id == admin.id {
        return Err(ApiError::BadRequest(
            "You cannot delete your own account".to_string(),
        ));
    }

    let target = find_staff(&state, id).await?;
    if target.role == Role::Admin && state.repositories.users.count_admins().await? <= 1 {
        return Err(ApiError::BadRequest(
            "Cannot delete the last admin".to_string(),
        ));
    }
    if is_last_active_admin(&state, target.role, target.is_active).await? {
        return Err(ApiError::BadRequest(
            "Cannot delete the last active admin".to_string(),
        ));
    }

    state.repositories.users.delete(id).await?;
    info!("Staff member {} deleted by {}", id, admin.id);

    Ok(Json(json!({ "success": true, "message": "Staff member deleted" })))
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
    async fn test_staff_routes_require_token() {
        let app = create_router(test_support::state());
        let response = app
            .oneshot(request(
                "POST",
                "/api/admin/staff",
                None,
                Some(r#"{"email":"a@b.co","password":"secret1","name":"An","role":"sales"}"#),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["success"], false);
    }
}
