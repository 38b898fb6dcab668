use common::error::DatabaseResult;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::models::CartLine;

const CART_SELECT: &str = "SELECT ci.id, ci.product_id, p.name, p.slug, p.price, \
     p.images->>0 AS image, p.stock, ci.quantity \
     FROM cart_items ci JOIN products p ON p.id = ci.product_id";

#[derive(Clone)]
pub struct CartRepository {
    pool: PgPool,
}

fn map_line(row: &PgRow) -> CartLine {
    CartLine {
        id: row.get("id"),
        product_id: row.get("product_id"),
        name: row.get("name"),
        slug: row.get("slug"),
        price: row.get("price"),
        image: row.get("image"),
        stock: row.get("stock"),
        quantity: row.get("quantity"),
    }
}

impl CartRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lines for active products, oldest first
    pub async fn lines(&self, user_id: Uuid) -> DatabaseResult<Vec<CartLine>> {
        let rows = sqlx::query(&format!(
            "{} WHERE ci.user_id = $1 AND p.status = 'active' ORDER BY ci.created_at ASC",
            CART_SELECT
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(map_line).collect())
    }

    pub async fn find_line(&self, id: Uuid, user_id: Uuid) -> DatabaseResult<Option<CartLine>> {
        let row = sqlx::query(&format!(
            "{} WHERE ci.id = $1 AND ci.user_id = $2 AND p.status = 'active'",
            CART_SELECT
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(map_line))
    }

    /// Quantity of a product already in the cart
    pub async fn quantity_of(&self, user_id: Uuid, product_id: Uuid) -> DatabaseResult<i32> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(quantity), 0)::INT AS quantity FROM cart_items \
             WHERE user_id = $1 AND product_id = $2",
        )
        .bind(user_id)
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("quantity"))
    }

    /// Add to an existing line or start a new one
    pub async fn add(&self, user_id: Uuid, product_id: Uuid, quantity: i32) -> DatabaseResult<Uuid> {
        let row = sqlx::query(
            "INSERT INTO cart_items (user_id, product_id, quantity) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, product_id) \
             DO UPDATE SET quantity = cart_items.quantity + EXCLUDED.quantity \
             RETURNING id",
        )
        .bind(user_id)
        .bind(product_id)
        .bind(quantity)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("id"))
    }

    pub async fn set_quantity(&self, id: Uuid, user_id: Uuid, quantity: i32) -> DatabaseResult<bool> {
        let result =
            sqlx::query("UPDATE cart_items SET quantity = $3 WHERE id = $1 AND user_id = $2")
                .bind(id)
                .bind(user_id)
                .bind(quantity)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn remove(&self, id: Uuid, user_id: Uuid) -> DatabaseResult<bool> {
        let result = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn clear(&self, user_id: Uuid) -> DatabaseResult<u64> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
