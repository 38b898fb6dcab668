use common::error::DatabaseResult;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::models::WishlistItem;

#[derive(Clone)]
pub struct WishlistRepository {
    pool: PgPool,
}

fn map_item(row: &PgRow) -> WishlistItem {
    WishlistItem {
        id: row.get("id"),
        product_id: row.get("product_id"),
        name: row.get("name"),
        slug: row.get("slug"),
        price: row.get("price"),
        original_price: row.get("original_price"),
        image: row.get("image"),
        discount: row.get("discount"),
        stock: row.get("stock"),
        rating: row.get("rating"),
        created_at: row.get("created_at"),
    }
}

impl WishlistRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Saved active products, newest first
    pub async fn list(&self, user_id: Uuid) -> DatabaseResult<Vec<WishlistItem>> {
        let rows = sqlx::query(
            "SELECT w.id, w.product_id, p.name, p.slug, p.price, p.original_price, \
             p.images->>0 AS image, p.discount, p.stock, p.rating, w.created_at \
             FROM wishlist w JOIN products p ON p.id = w.product_id \
             WHERE w.user_id = $1 AND p.status = 'active' \
             ORDER BY w.created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(map_item).collect())
    }

    /// `false` when the product was already saved
    pub async fn add(&self, user_id: Uuid, product_id: Uuid) -> DatabaseResult<bool> {
        let result = sqlx::query(
            "INSERT INTO wishlist (user_id, product_id) VALUES ($1, $2) \
             ON CONFLICT (user_id, product_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(product_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn remove(&self, user_id: Uuid, product_id: Uuid) -> DatabaseResult<bool> {
        let result = sqlx::query("DELETE FROM wishlist WHERE user_id = $1 AND product_id = $2")
            .bind(user_id)
            .bind(product_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn contains(&self, user_id: Uuid, product_id: Uuid) -> DatabaseResult<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM wishlist WHERE user_id = $1 AND product_id = $2) AS found",
        )
        .bind(user_id)
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("found"))
    }
}
