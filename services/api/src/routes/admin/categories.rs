use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
};
use common::error::DatabaseError;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult, ValidJson, is_unique_violation},
    models::category::{CreateCategoryRequest, UpdateCategoryRequest},
    routes::invalidate_catalog,
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/categories", get(list_categories).post(create_category))
        .route(
            "/api/admin/categories/:id",
            put(update_category).delete(delete_category),
        )
}

fn slug_conflict() -> ApiError {
    ApiError::Conflict("A category with this slug already exists".to_string())
}

fn duplicate_slug(err: DatabaseError) -> ApiError {
    match &err {
        DatabaseError::Query(e) if is_unique_violation(e) => slug_conflict(),
        _ => err.into(),
    }
}

pub async fn list_categories(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let categories = state.repositories.categories.list().await?;
    Ok(Json(json!({ "success": true, "data": categories })))
}

pub async fn create_category(
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<CreateCategoryRequest>,
) -> ApiResult<impl IntoResponse> {
    let slug = payload.validate().map_err(ApiError::Validation)?;
    if state.repositories.categories.slug_taken(&slug, None).await? {
        return Err(slug_conflict());
    }

    let category = state
        .repositories
        .categories
        .create(&payload, &slug)
        .await
        .map_err(duplicate_slug)?;
    info!("Created category {} ({})", category.id, category.slug);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": category })),
    ))
}

pub async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidJson(payload): ValidJson<UpdateCategoryRequest>,
) -> ApiResult<impl IntoResponse> {
    let slug = payload.validate().map_err(ApiError::Validation)?;
    if let Some(slug) = &slug {
        if state.repositories.categories.slug_taken(slug, Some(id)).await? {
            return Err(slug_conflict());
        }
    }

    let category = state
        .repositories
        .categories
        .update(id, &payload, slug.as_deref())
        .await
        .map_err(duplicate_slug)?
        .ok_or_else(|| ApiError::NotFound("Category not found".to_string()))?;

    invalidate_catalog(&state.cache).await;
    Ok(Json(json!({ "success": true, "data": category })))
}

pub async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let category = state
        .repositories
        .categories
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Category not found".to_string()))?;

    if category.product_count > 0 || !state.repositories.categories.delete_if_empty(id).await? {
        return Err(ApiError::BadRequest(format!(
            "Category still has {} products; move them first",
            category.product_count.max(1)
        )));
    }

    invalidate_catalog(&state.cache).await;
    info!("Deleted category {} ({})", id, category.slug);

    Ok(Json(json!({ "success": true, "message": "Category deleted" })))
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
    async fn test_category_admin_requires_login() {
        let app = create_router(test_support::state());
        let response = app
            .oneshot(request(
                "POST",
                "/api/admin/categories",
                None,
                Some(r#"{"name":"Beans"}"#),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL database"]
    async fn test_category_lifecycle() {
        let state = test_support::db_state().await;
        let (admin_id, email) = test_support::seed_user(&state, Role::Admin).await;
        let token = test_support::token_for(&state, admin_id, &email, Role::Admin);
        let name = format!("Single Origin {}", Uuid::new_v4());
        let body = format!(r#"{{"name":"{}"}}"#, name);

        let created = create_router(state.clone())
            .oneshot(request("POST", "/api/admin/categories", Some(&token), Some(&body)))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);
        let category = body_json(created).await["data"].clone();
        let id: Uuid = category["id"].as_str().unwrap().parse().unwrap();

        let duplicate = create_router(state.clone())
            .oneshot(request("POST", "/api/admin/categories", Some(&token), Some(&body)))
            .await
            .unwrap();
        assert_eq!(duplicate.status(), StatusCode::CONFLICT);

        sqlx::query(
            "INSERT INTO products (name, slug, price, category_id) VALUES ('Filed Beans', $1, 100, $2)",
        )
        .bind(format!("filed-beans-{}", Uuid::new_v4()))
        .bind(id)
        .execute(&state.db_pool)
        .await
        .unwrap();

        let uri = format!("/api/admin/categories/{}", id);
        let refused = create_router(state.clone())
            .oneshot(request("DELETE", &uri, Some(&token), None))
            .await
            .unwrap();
        assert_eq!(refused.status(), StatusCode::BAD_REQUEST);

        sqlx::query("UPDATE products SET status = 'deleted' WHERE category_id = $1")
            .bind(id)
            .execute(&state.db_pool)
            .await
            .unwrap();
        let deleted = create_router(state)
            .oneshot(request("DELETE", &uri, Some(&token), None))
            .await
            .unwrap();
        assert_eq!(deleted.status(), StatusCode::OK);
    }
}
