//! Catalog product models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Lifecycle of a product row; deleted rows stay for order history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Active,
    Deleted,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Active => "active",
            ProductStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ProductStatus::Active),
            "deleted" => Ok(ProductStatus::Deleted),
            other => Err(format!("unknown product status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price: i64,
    pub original_price: Option<i64>,
    pub images: serde_json::Value,
    pub category_id: Option<Uuid>,
    pub category_name: Option<String>,
    pub category_slug: Option<String>,
    pub brand: Option<String>,
    pub specs: serde_json::Value,
    pub stock: i32,
    pub low_stock_threshold: i32,
    pub rating: f64,
    pub review_count: i32,
    pub is_new: bool,
    pub is_featured: bool,
    pub discount: i32,
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// First image URL, if any
    pub fn primary_image(&self) -> Option<String> {
        self.images
            .as_array()
            .and_then(|images| images.first())
            .and_then(|image| image.as_str())
            .map(str::to_string)
    }
}

/// Storefront and back-office list filters
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    /// Category slug
    pub category: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub featured: Option<bool>,
    pub is_new: Option<bool>,
}

impl ProductQuery {
    /// Stable cache key for a public listing
    pub fn cache_key(&self) -> String {
        format!(
            "products:list:{}:{}:{}:{}:{}:{}:{}:{}",
            self.page.unwrap_or(1),
            self.limit.unwrap_or(0),
            self.search.as_deref().unwrap_or("").trim().to_lowercase(),
            self.category.as_deref().unwrap_or(""),
            self.sort.as_deref().unwrap_or(""),
            self.order.as_deref().unwrap_or(""),
            self.featured.map(|f| f.to_string()).unwrap_or_default(),
            self.is_new.map(|f| f.to_string()).unwrap_or_default(),
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub original_price: Option<i64>,
    pub images: Option<Vec<String>>,
    pub category_id: Option<Uuid>,
    pub brand: Option<String>,
    pub specs: Option<serde_json::Map<String, serde_json::Value>>,
    pub stock: Option<i32>,
    pub low_stock_threshold: Option<i32>,
    pub is_new: Option<bool>,
    pub is_featured: Option<bool>,
    pub discount: Option<i32>,
}

impl CreateProductRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Product name is required".to_string());
        }
        validate_amounts(
            Some(self.price),
            self.original_price,
            self.stock,
            self.low_stock_threshold,
            self.discount,
        )?;
        validate_images(self.images.as_deref())
    }
}

/// Partial product update; absent fields keep their value
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
    pub original_price: Option<i64>,
    pub images: Option<Vec<String>>,
    pub category_id: Option<Uuid>,
    pub brand: Option<String>,
    pub specs: Option<serde_json::Map<String, serde_json::Value>>,
    pub stock: Option<i32>,
    pub low_stock_threshold: Option<i32>,
    pub is_new: Option<bool>,
    pub is_featured: Option<bool>,
    pub discount: Option<i32>,
}

impl UpdateProductRequest {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err("Product name cannot be empty".to_string());
            }
        }
        validate_amounts(
            self.price,
            self.original_price,
            self.stock,
            self.low_stock_threshold,
            self.discount,
        )?;
        validate_images(self.images.as_deref())
    }
}

fn validate_amounts(
    price: Option<i64>,
    original_price: Option<i64>,
    stock: Option<i32>,
    low_stock_threshold: Option<i32>,
    discount: Option<i32>,
) -> Result<(), String> {
    if let Some(price) = price {
        common::validation::validate_price(price)?;
    }
    if original_price.is_some_and(|p| p < 0) {
        return Err("Original price must be zero or greater".to_string());
    }
    if original_price.is_some_and(|p| p > common::validation::MAX_PRICE) {
        return Err("Original price is too large".to_string());
    }
    if stock.is_some_and(|s| s < 0) {
        return Err("Stock must be zero or greater".to_string());
    }
    if low_stock_threshold.is_some_and(|t| t < 0) {
        return Err("Low stock threshold must be zero or greater".to_string());
    }
    if discount.is_some_and(|d| !(0..=100).contains(&d)) {
        return Err("Discount must be between 0 and 100".to_string());
    }
    Ok(())
}

fn validate_images(images: Option<&[String]>) -> Result<(), String> {
    for image in images.unwrap_or_default() {
        common::validation::validate_image_url(image)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        assert_eq!("active".parse::<ProductStatus>(), Ok(ProductStatus::Active));
        assert_eq!(ProductStatus::Deleted.to_string(), "deleted");
        assert!("archived".parse::<ProductStatus>().is_err());
    }

    #[test]
    fn test_create_rejects_negative_price() {
        let req: CreateProductRequest =
            serde_json::from_str(r#"{"name":"Latte","price":-1}"#).unwrap();
        assert_eq!(req.validate(), Err("Price must be zero or greater".to_string()));
    }

    #[test]
    fn test_create_rejects_huge_price() {
        let req: CreateProductRequest =
            serde_json::from_str(r#"{"name":"Latte","price":9000000000000}"#).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_create_rejects_unknown_fields() {
        let result = serde_json::from_str::<CreateProductRequest>(
            r#"{"name":"Latte","price":45000,"status":"deleted"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_update_discount_range() {
        let req = UpdateProductRequest {
            discount: Some(120),
            ..Default::default()
        };
        assert!(req.validate().is_err());

        let req = UpdateProductRequest {
            discount: Some(20),
            ..Default::default()
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_cache_key_is_normalized() {
        let a = ProductQuery {
            search: Some(" Latte ".to_string()),
            ..Default::default()
        };
        let b = ProductQuery {
            search: Some("latte".to_string()),
            ..Default::default()
        };
        assert_eq!(a.cache_key(), b.cache_key());
    }
}
