use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, patch},
};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult, ValidJson, ValidQuery},
    listing::{MAX_LIMIT, Paginated, Pagination},
    middleware::{auth_middleware, require_staff},
    models::promotion::{
        CreatePromotionRequest, PromotionListQuery, UpdatePromotionRequest, ValidatePromotionQuery,
    },
    repositories::PromotionState,
    state::AppState,
};

pub fn router(state: &AppState) -> Router<AppState> {
    let staff = Router::new()
        .route("/api/promotions", get(list_promotions).post(create_promotion))
        .route(
            "/api/promotions/:id",
            get(get_promotion)
                .put(update_promotion)
                .delete(delete_promotion),
        )
        .route("/api/promotions/:id/toggle", patch(toggle_promotion))
        .route_layer(middleware::from_fn(require_staff))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/api/promotions/validate/:code", get(validate_code))
        .merge(staff)
}

/// Discount a code would give on `orderTotal`
pub async fn validate_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
    ValidQuery(query): ValidQuery<ValidatePromotionQuery>,
) -> ApiResult<impl IntoResponse> {
    let promotion = state
        .repositories
        .promotions
        .find_redeemable_by_code(&code)
        .await?
        .ok_or_else(|| ApiError::NotFound("Invalid or expired promotion code".to_string()))?;

    let order_total = query.order_total.unwrap_or(0).max(0);
    let discount = promotion
        .discount_for(order_total)
        .map_err(ApiError::BadRequest)?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "promotion": promotion,
            "discount": discount,
            "finalTotal": order_total - discount,
        }
    })))
}

pub async fn list_promotions(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<PromotionListQuery>,
) -> ApiResult<impl IntoResponse> {
    let pagination = Pagination::new(query.page, query.limit, MAX_LIMIT);
    let filter = PromotionState::parse(query.status.as_deref());

    let (promotions, total) = state
        .repositories
        .promotions
        .list(filter, pagination)
        .await?;

    Ok(Json(Paginated::new(promotions, total, pagination)))
}

pub async fn get_promotion(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let promotion = state
        .repositories
        .promotions
        .find(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Promotion not found".to_string()))?;

    Ok(Json(json!({ "success": true, "data": promotion })))
}

pub async fn create_promotion(
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<CreatePromotionRequest>,
) -> ApiResult<impl IntoResponse> {
    payload.validate().map_err(ApiError::Validation)?;

    if state
        .repositories
        .promotions
        .code_taken(&payload.code, None)
        .await?
    {
        return Err(ApiError::Conflict("Promotion code already exists".to_string()));
    }

    let promotion = state.repositories.promotions.create(&payload).await?;
    info!("Created promotion {}", promotion.code);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": promotion })),
    ))
}

pub async fn update_promotion(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidJson(payload): ValidJson<UpdatePromotionRequest>,
) -> ApiResult<impl IntoResponse> {
    payload.validate().map_err(ApiError::Validation)?;

    if let Some(code) = payload.code.as_deref() {
        if state
            .repositories
            .promotions
            .code_taken(code, Some(id))
            .await?
        {
            return Err(ApiError::Conflict("Promotion code already exists".to_string()));
        }
    }

    let promotion = state
        .repositories
        .promotions
        .update(id, &payload)
        .await?
        .ok_or_else(|| ApiError::NotFound("Promotion not found".to_string()))?;

    Ok(Json(json!({ "success": true, "data": promotion })))
}

pub async fn delete_promotion(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    if !state.repositories.promotions.delete(id).await? {
        return Err(ApiError::NotFound("Promotion not found".to_string()));
    }
    info!("Deleted promotion {}", id);

    Ok(Json(json!({ "success": true, "message": "Promotion deleted" })))
}

pub async fn toggle_promotion(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let promotion = state
        .repositories
        .promotions
        .toggle(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Promotion not found".to_string()))?;

    Ok(Json(json!({ "success": true, "data": promotion })))
}
