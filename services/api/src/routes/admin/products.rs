use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::Utc;
use common::error::DatabaseError;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult, ValidJson, ValidQuery, is_unique_violation},
    listing::{MAX_LIMIT, Paginated, Pagination, search_term},
    models::{
        ProductQuery,
        product::{CreateProductRequest, UpdateProductRequest},
        wishlist::sale_started,
    },
    repositories::{ProductFilter, product::ADMIN_PRODUCT_SORT},
    routes::invalidate_catalog,
    slug::{deleted_slug, slugify, with_suffix},
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/products", get(list_products).post(create_product))
        .route(
            "/api/admin/products/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
}

fn duplicate_slug(err: DatabaseError) -> ApiError {
    match &err {
        DatabaseError::Query(e) if is_unique_violation(e) => {
            ApiError::Conflict("A product with this name already exists".to_string())
        }
        _ => err.into(),
    }
}

/// Slug for `name`, suffixed with the current time when already taken
async fn unique_slug(state: &AppState, name: &str, except: Option<Uuid>) -> ApiResult<String> {
    let base = match slugify(name) {
        slug if slug.is_empty() => "product".to_string(),
        slug => slug,
    };

    if state
        .repositories
        .products
        .slug_exists(&base, except)
        .await?
    {
        Ok(with_suffix(&base, Utc::now().timestamp_millis()))
    } else {
        Ok(base)
    }
}

async fn ensure_category(state: &AppState, category_id: Option<Uuid>) -> ApiResult<()> {
    if let Some(id) = category_id {
        if !state.repositories.categories.exists(id).await? {
            return Err(ApiError::BadRequest("Category does not exist".to_string()));
        }
    }
    Ok(())
}

pub async fn list_products(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<ProductQuery>,
) -> ApiResult<impl IntoResponse> {
    let pagination = Pagination::new(query.page, query.limit, MAX_LIMIT);
    let sort = ADMIN_PRODUCT_SORT.resolve(query.sort.as_deref(), query.order.as_deref());
    let filter = ProductFilter {
        search: search_term(query.search.as_deref()),
        search_brand: true,
        category_slug: search_term(query.category.as_deref()),
        featured: query.featured,
        is_new: query.is_new,
    };

    let (products, total) = state
        .repositories
        .products
        .list(&filter, pagination, sort)
        .await?;

    Ok(Json(Paginated::new(products, total, pagination)))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let product = state
        .repositories
        .products
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Product not found".to_string()))?;

    Ok(Json(json!({ "success": true, "data": product })))
}

pub async fn create_product(
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<CreateProductRequest>,
) -> ApiResult<impl IntoResponse> {
    payload.validate().map_err(ApiError::Validation)?;
    ensure_category(&state, payload.category_id).await?;

    let slug = unique_slug(&state, &payload.name, None).await?;
    let product = state
        .repositories
        .products
        .create(&payload, &slug)
        .await
        .map_err(duplicate_slug)?;

    invalidate_catalog(&state.cache).await;
    info!("Created product {} ({})", product.id, product.slug);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": product })),
    ))
}

/// Partial update; renaming regenerates the slug
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidJson(payload): ValidJson<UpdateProductRequest>,
) -> ApiResult<impl IntoResponse> {
    payload.validate().map_err(ApiError::Validation)?;
    ensure_category(&state, payload.category_id).await?;

    let previous_discount = state
        .repositories
        .products
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Product not found".to_string()))?
        .discount;

    let slug = match payload.name.as_deref() {
        Some(name) => Some(unique_slug(&state, name, Some(id)).await?),
        None => None,
    };

    let product = state
        .repositories
        .products
        .update(id, &payload, slug.as_deref())
        .await
        .map_err(duplicate_slug)?
        .ok_or_else(|| ApiError::NotFound("Product not found".to_string()))?;

    invalidate_catalog(&state.cache).await;

    if sale_started(previous_discount, product.discount) {
        if let Err(e) = state
            .notifier
            .wishlist_sale(product.id, &product.slug, &product.name, product.discount)
            .await
        {
            warn!("Wishlist sale notifications for {} failed: {}", product.id, e);
        }
    }

    Ok(Json(json!({ "success": true, "data": product })))
}

/// Soft delete: the row stays so past orders keep their product
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let product = state
        .repositories
        .products
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Product not found".to_string()))?;

    let slug = deleted_slug(&product.slug, Utc::now().timestamp_millis());
    if !state.repositories.products.soft_delete(id, &slug).await? {
        return Err(ApiError::NotFound("Product not found".to_string()));
    }

    invalidate_catalog(&state.cache).await;
    info!("Product {} marked deleted", id);

    Ok(Json(json!({ "success": true, "message": "Product deleted" })))
}
