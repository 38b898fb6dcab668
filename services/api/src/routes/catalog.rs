//! Public storefront: products, categories, shipping quotes and product comparison

use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
};
use common::cache::CacheStore;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::{
    compare::{MAX_COMPARE_ITEMS, detect_spec_differences, spec_rows},
    error::{ApiError, ApiResult, ValidJson, ValidQuery},
    listing::{MAX_LIMIT, Paginated, Pagination},
    models::{Product, ProductQuery},
    repositories::{ProductFilter, product::PUBLIC_PRODUCT_SORT},
    shipping::{SHIPPING_RATES, calculate_shipping},
    state::AppState,
};

const LIST_TTL: Duration = Duration::from_secs(5 * 60);
const DETAIL_TTL: Duration = Duration::from_secs(10 * 60);

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/products", get(list_products))
        .route("/api/products/compare", post(compare_products))
        .route("/api/products/:slug", get(get_product))
        .route("/api/categories", get(list_categories))
        .route("/api/categories/:slug", get(get_category))
        .route("/api/shipping/rates", get(shipping_rates))
        .route("/api/shipping/calculate", get(shipping_quote))
}

/// Drop every cached product list and detail
pub(crate) async fn invalidate_catalog(cache: &CacheStore) {
    cache.delete_pattern("products:*").await;
}

pub async fn list_products(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<ProductQuery>,
) -> ApiResult<impl IntoResponse> {
    let cache_key = query.cache_key();
    if let Some(cached) = state.cache.get_json::<serde_json::Value>(&cache_key).await {
        debug!("Product list served from cache: {}", cache_key);
        return Ok(Json(cached));
    }

    let pagination = Pagination::new(query.page, query.limit, MAX_LIMIT);
    let sort = PUBLIC_PRODUCT_SORT.resolve(query.sort.as_deref(), query.order.as_deref());
    let filter = ProductFilter {
        search: crate::listing::search_term(query.search.as_deref()),
        search_brand: false,
        category_slug: crate::listing::search_term(query.category.as_deref()),
        featured: query.featured,
        is_new: query.is_new,
    };

    let (products, total) = state
        .repositories
        .products
        .list(&filter, pagination, sort)
        .await?;
    let body = serde_json::to_value(Paginated::new(products, total, pagination))
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    state.cache.set_json(&cache_key, &body, LIST_TTL).await;
    Ok(Json(body))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let cache_key = format!("products:detail:{}", slug);
    if let Some(product) = state.cache.get_json::<Product>(&cache_key).await {
        return Ok(Json(json!({ "success": true, "data": product })));
    }

    let product = state
        .repositories
        .products
        .find_by_slug(&slug)
        .await?
        .ok_or_else(|| ApiError::NotFound("Product not found".to_string()))?;

    state.cache.set_json(&cache_key, &product, DETAIL_TTL).await;
    Ok(Json(json!({ "success": true, "data": product })))
}

pub async fn list_categories(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let categories = state.repositories.categories.list().await?;
    Ok(Json(json!({ "success": true, "data": categories })))
}

pub async fn get_category(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let category = state
        .repositories
        .categories
        .find_by_slug(&slug)
        .await?
        .ok_or_else(|| ApiError::NotFound("Category not found".to_string()))?;

    Ok(Json(json!({ "success": true, "data": category })))
}

pub async fn shipping_rates() -> impl IntoResponse {
    Json(json!({ "success": true, "data": SHIPPING_RATES }))
}

#[derive(Debug, Deserialize)]
pub struct ShippingQuery {
    pub address: Option<String>,
    pub subtotal: Option<i64>,
}

pub async fn shipping_quote(
    ValidQuery(query): ValidQuery<ShippingQuery>,
) -> ApiResult<impl IntoResponse> {
    let subtotal = query.subtotal.unwrap_or(0);
    if subtotal < 0 {
        return Err(ApiError::Validation(
            "Subtotal must be zero or greater".to_string(),
        ));
    }

    let quote = calculate_shipping(query.address.as_deref().unwrap_or(""), subtotal);
    Ok(Json(json!({ "success": true, "data": quote })))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CompareProductsRequest {
    pub product_ids: Vec<Uuid>,
}

/// Side-by-side specs for up to four products
pub async fn compare_products(
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<CompareProductsRequest>,
) -> ApiResult<impl IntoResponse> {
    if payload.product_ids.is_empty() {
        return Err(ApiError::Validation("productIds is required".to_string()));
    }
    if payload.product_ids.len() > MAX_COMPARE_ITEMS {
        return Err(ApiError::Validation(format!(
            "At most {} products can be compared",
            MAX_COMPARE_ITEMS
        )));
    }

    let products = state
        .repositories
        .products
        .find_many(&payload.product_ids)
        .await?;

    let empty = serde_json::Map::new();
    let specs: Vec<&serde_json::Map<String, serde_json::Value>> = products
        .iter()
        .map(|p| p.specs.as_object().unwrap_or(&empty))
        .collect();

    Ok(Json(json!({
        "success": true,
        "data": {
            "products": products,
            "differences": detect_spec_differences(&specs),
            "specs": spec_rows(&specs),
        }
    })))
}
