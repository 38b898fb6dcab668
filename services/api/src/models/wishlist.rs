use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const WISHLIST_SALE_TYPE: &str = "wishlist_sale";

/// Saved product as shown on the wishlist page
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub slug: String,
    pub price: i64,
    pub original_price: Option<i64>,
    pub image: Option<String>,
    pub discount: i32,
    pub stock: i32,
    pub rating: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct AddToWishlistRequest {
    pub product_id: Uuid,
}

/// A sale starts when the discount goes up from whatever it was
pub fn sale_started(previous_discount: i32, discount: i32) -> bool {
    discount > 0 && discount > previous_discount
}

pub fn sale_text(product_name: &str, discount: i32) -> (String, String) {
    (
        "A product on your wishlist is on sale".to_string(),
        format!("{} is now {}% off", product_name, discount),
    )
}
