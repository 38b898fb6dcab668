//! Per-user compare list kept in the cache

use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    middleware,
    response::IntoResponse,
    routing::{delete, get},
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    compare::{self, AddOutcome, CompareList, MAX_COMPARE_ITEMS},
    error::{ApiError, ApiResult, ValidJson},
    middleware::{AuthUser, auth_middleware},
    state::AppState,
};

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/api/compare",
            get(get_list).post(add_product).delete(clear_list),
        )
        .route("/api/compare/:product_id", delete(remove_product))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct AddCompareRequest {
    pub product_id: Uuid,
}

/// The list with its products; ids whose product is gone are dropped from storage
async fn list_body(state: &AppState, user_id: Uuid, list: CompareList) -> ApiResult<serde_json::Value> {
    let products = state.repositories.products.find_many(list.ids()).await?;

    if products.len() != list.len() {
        let live = CompareList::from_ids(products.iter().map(|p| p.id));
        compare::save(&state.cache, user_id, &live).await;
    }

    Ok(json!({
        "success": true,
        "data": {
            "items": products.iter().map(|p| p.id).collect::<Vec<_>>(),
            "products": products,
            "count": products.len(),
            "max": MAX_COMPARE_ITEMS,
        }
    }))
}

pub async fn get_list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let list = compare::load(&state.cache, user.id).await;
    Ok(Json(list_body(&state, user.id, list).await?))
}

pub async fn add_product(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidJson(payload): ValidJson<AddCompareRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .repositories
        .products
        .find_by_id(payload.product_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Product not found".to_string()))?;

    let mut list = compare::load(&state.cache, user.id).await;
    match list.add(payload.product_id) {
        AddOutcome::Full => {
            return Err(ApiError::BadRequest(format!(
                "You can compare at most {} products",
                MAX_COMPARE_ITEMS
            )));
        }
        AddOutcome::Added => compare::save(&state.cache, user.id, &list).await,
        AddOutcome::AlreadyPresent => {}
    }

    Ok(Json(list_body(&state, user.id, list).await?))
}

pub async fn remove_product(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(product_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let mut list = compare::load(&state.cache, user.id).await;
    if list.remove(product_id) {
        compare::save(&state.cache, user.id, &list).await;
    }

    Ok(Json(list_body(&state, user.id, list).await?))
}

pub async fn clear_list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    compare::save(&state.cache, user.id, &CompareList::new()).await;
    Ok(Json(json!({ "success": true, "message": "Compare list cleared" })))
}
