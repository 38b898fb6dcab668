//! Warehouse stock movements
//!
//! A movement locks the product row, computes the new level, writes it and
//! appends the ledger row in one transaction. Exports never take stock below
//! zero: the check runs against the locked row and the update repeats it.

use common::cache::CacheStore;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::inventory::{Movement, StockTransaction},
    repositories::inventory::{TRANSACTION_COLUMNS, map_transaction},
    routes::invalidate_catalog,
};

const REASON_MAX: usize = 500;
const REFERENCE_MAX: usize = 255;

/// Who asked for a movement and why
#[derive(Debug, Clone, Default)]
pub struct MovementNote<'a> {
    pub reason: Option<&'a str>,
    pub reference: Option<&'a str>,
}

fn trimmed(raw: Option<&str>, max: usize, field: &str) -> ApiResult<Option<String>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) if value.chars().count() > max => Err(ApiError::Validation(format!(
            "{} must be at most {} characters",
            field, max
        ))),
        value => Ok(value.map(str::to_string)),
    }
}

#[derive(Clone)]
pub struct InventoryService {
    pool: PgPool,
    cache: CacheStore,
}

impl InventoryService {
    pub fn new(pool: PgPool, cache: CacheStore) -> Self {
        Self { pool, cache }
    }

    /// Apply one movement to an active product and record it in the ledger
    pub async fn apply(
        &self,
        product_id: Uuid,
        movement: Movement,
        note: MovementNote<'_>,
        staff_id: Uuid,
    ) -> ApiResult<StockTransaction> {
        movement.validate().map_err(ApiError::Validation)?;
        let reason = trimmed(note.reason, REASON_MAX, "Reason")?;
        let reference = trimmed(note.reference, REFERENCE_MAX, "Reference")?;

        let mut tx = self.pool.begin().await?;

        let (name, before) = lock_product(&mut tx, product_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Product not found".to_string()))?;
        let after = movement.apply(before).map_err(ApiError::BadRequest)?;

        let updated = sqlx::query(
            "UPDATE products SET stock = $2, updated_at = NOW() \
             WHERE id = $1 AND stock = $3",
        )
        .bind(product_id)
        .bind(after)
        .bind(before)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() != 1 {
            return Err(ApiError::Conflict(
                "Stock changed while saving, please retry".to_string(),
            ));
        }

        let row = sqlx::query(&format!(
            "WITH t AS (\
               INSERT INTO stock_transactions \
               (product_id, type, quantity, reason, reference, stock_before, stock_after, created_by) \
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *\
             ) SELECT {} FROM t \
             LEFT JOIN products p ON p.id = t.product_id \
             LEFT JOIN users u ON u.id = t.created_by",
            TRANSACTION_COLUMNS
        ))
        .bind(product_id)
        .bind(movement.kind().as_str())
        .bind(movement.recorded_quantity(before, after))
        .bind(reason)
        .bind(reference)
        .bind(before)
        .bind(after)
        .bind(staff_id)
        .fetch_one(&mut *tx)
        .await?;
        let transaction = map_transaction(&row)?;

        tx.commit().await?;
        info!(
            "Stock {} on {} ({}): {} -> {}",
            movement.kind(),
            name,
            product_id,
            before,
            after
        );

        invalidate_catalog(&self.cache).await;
        Ok(transaction)
    }
}

async fn lock_product(
    tx: &mut Transaction<'_, Postgres>,
    product_id: Uuid,
) -> ApiResult<Option<(String, i32)>> {
    let row = sqlx::query(
        "SELECT name, stock FROM products WHERE id = $1 AND status = 'active' FOR UPDATE",
    )
    .bind(product_id)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row.map(|r| (r.get("name"), r.get("stock"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::{db_state, seed_user};
    use common::jwt::Role;

    #[test]
    fn test_note_fields_are_trimmed_and_bounded() {
        assert_eq!(trimmed(Some("  restock "), 10, "Reason").unwrap(), Some("restock".to_string()));
        assert_eq!(trimmed(Some("   "), 10, "Reason").unwrap(), None);
        assert!(matches!(
            trimmed(Some("abcdefghijk"), 10, "Reason"),
            Err(ApiError::Validation(_))
        ));
    }

    async fn seed_stocked(state: &crate::state::AppState, stock: i32) -> Uuid {
        sqlx::query_scalar(
            "INSERT INTO products (name, slug, price, stock) VALUES ('Ledger Beans', $1, 1000, $2) RETURNING id",
        )
        .bind(format!("ledger-beans-{}", Uuid::new_v4()))
        .bind(stock)
        .fetch_one(&state.db_pool)
        .await
        .expect("seed product")
    }

    async fn ledger_rows(state: &crate::state::AppState, product_id: Uuid) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM stock_transactions WHERE product_id = $1")
            .bind(product_id)
            .fetch_one(&state.db_pool)
            .await
            .expect("count")
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL database"]
    async fn test_export_beyond_stock_writes_nothing() {
        let state = db_state().await;
        let (staff_id, _) = seed_user(&state, Role::Warehouse).await;
        let product_id = seed_stocked(&state, 3).await;

        let result = state
            .inventory
            .apply(product_id, Movement::Export(5), MovementNote::default(), staff_id)
            .await;

        assert!(matches!(result, Err(ApiError::BadRequest(_))));
        let stock: i32 = sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
            .bind(product_id)
            .fetch_one(&state.db_pool)
            .await
            .unwrap();
        assert_eq!(stock, 3);
        assert_eq!(ledger_rows(&state, product_id).await, 0);
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL database"]
    async fn test_import_and_adjust_are_recorded() {
        let state = db_state().await;
        let (staff_id, _) = seed_user(&state, Role::Warehouse).await;
        let product_id = seed_stocked(&state, 4).await;

        let import = state
            .inventory
            .apply(
                product_id,
                Movement::Import(6),
                MovementNote {
                    reason: Some("Supplier delivery"),
                    reference: Some("PO-118"),
                },
                staff_id,
            )
            .await
            .unwrap();
        assert_eq!(import.stock_before, Some(4));
        assert_eq!(import.stock_after, Some(10));
        assert_eq!(import.reference.as_deref(), Some("PO-118"));
        assert_eq!(import.created_by, Some(staff_id));

        let adjust = state
            .inventory
            .apply(product_id, Movement::Adjust(7), MovementNote::default(), staff_id)
            .await
            .unwrap();
        assert_eq!(adjust.quantity, 3);
        assert_eq!(adjust.stock_after, Some(7));
        assert_eq!(ledger_rows(&state, product_id).await, 2);
    }
}
