use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get},
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult, ValidJson},
    middleware::{AuthUser, auth_middleware},
    models::wishlist::AddToWishlistRequest,
    state::AppState,
};

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/api/wishlist", get(get_wishlist).post(add_to_wishlist))
        .route("/api/wishlist/:product_id", delete(remove_from_wishlist))
        .route("/api/wishlist/check/:product_id", get(check_wishlist))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
}

pub async fn get_wishlist(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let items = state.repositories.wishlist.list(user.id).await?;
    Ok(Json(json!({ "success": true, "data": items })))
}

pub async fn add_to_wishlist(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidJson(payload): ValidJson<AddToWishlistRequest>,
) -> ApiResult<impl IntoResponse> {
    if state
        .repositories
        .products
        .find_by_id(payload.product_id)
        .await?
        .is_none()
    {
        return Err(ApiError::NotFound("Product not found".to_string()));
    }

    if !state
        .repositories
        .wishlist
        .add(user.id, payload.product_id)
        .await?
    {
        return Err(ApiError::BadRequest(
            "Product is already in your wishlist".to_string(),
        ));
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "message": "Added to wishlist" })),
    ))
}

pub async fn remove_from_wishlist(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(product_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    if !state.repositories.wishlist.remove(user.id, product_id).await? {
        return Err(ApiError::NotFound(
            "Product is not in your wishlist".to_string(),
        ));
    }
    Ok(Json(json!({ "success": true, "message": "Removed from wishlist" })))
}

pub async fn check_wishlist(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(product_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let saved = state.repositories.wishlist.contains(user.id, product_id).await?;
    Ok(Json(json!({ "success": true, "inWishlist": saved })))
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
    async fn test_wishlist_requires_login() {
        let app = create_router(test_support::state());
        let response = app
            .oneshot(request("GET", "/api/wishlist", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    async fn seed_product(state: &crate::state::AppState, discount: i32) -> Uuid {
        sqlx::query_scalar(
            "INSERT INTO products (name, slug, price, stock, discount) \
             VALUES ('Wish Grinder', $1, 90000, 5, $2) RETURNING id",
        )
        .bind(format!("wish-grinder-{}", Uuid::new_v4()))
        .bind(discount)
        .fetch_one(&state.db_pool)
        .await
        .unwrap()
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL database"]
    async fn test_add_twice_then_remove() {
        let state = test_support::db_state().await;
        let (user_id, email) = test_support::seed_user(&state, Role::User).await;
        let token = test_support::token_for(&state, user_id, &email, Role::User);
        let product_id = seed_product(&state, 0).await;
        let body = format!(r#"{{"productId":"{}"}}"#, product_id);

        let first = create_router(state.clone())
            .oneshot(request("POST", "/api/wishlist", Some(&token), Some(&body)))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);

        let again = create_router(state.clone())
            .oneshot(request("POST", "/api/wishlist", Some(&token), Some(&body)))
            .await
            .unwrap();
        assert_eq!(again.status(), StatusCode::BAD_REQUEST);

        let check = create_router(state.clone())
            .oneshot(request(
                "GET",
                &format!("/api/wishlist/check/{}", product_id),
                Some(&token),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(body_json(check).await["inWishlist"], true);

        let uri = format!("/api/wishlist/{}", product_id);
        let removed = create_router(state.clone())
            .oneshot(request("DELETE", &uri, Some(&token), None))
            .await
            .unwrap();
        assert_eq!(removed.status(), StatusCode::OK);

        let missing = create_router(state)
            .oneshot(request("DELETE", &uri, Some(&token), None))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL database"]
    async fn test_raised_discount_notifies_wishlist_once() {
        let state = test_support::db_state().await;
        let (user_id, _) = test_support::seed_user(&state, Role::User).await;
        let (admin_id, admin_email) = test_support::seed_user(&state, Role::Admin).await;
        let admin_token = test_support::token_for(&state, admin_id, &admin_email, Role::Admin);
        let product_id = seed_product(&state, 0).await;
        state
            .repositories
            .wishlist
            .add(user_id, product_id)
            .await
            .unwrap();

        for discount in [20, 30] {
            let response = create_router(state.clone())
                .oneshot(request(
                    "PUT",
                    &format!("/api/admin/products/{}", product_id),
                    Some(&admin_token),
                    Some(&format!(r#"{{"discount":{}}}"#, discount)),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let sent: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND type = 'wishlist_sale'",
        )
        .bind(user_id)
        .fetch_one(&state.db_pool)
        .await
        .unwrap();
        assert_eq!(sent, 1);
    }
}
