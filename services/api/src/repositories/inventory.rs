//! Warehouse reads: stock levels, the movement ledger and inventory totals

use chrono::{DateTime, Duration, Utc};
use common::error::{DatabaseError, DatabaseResult};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    listing::{Pagination, like_pattern},
    models::inventory::{
        CategoryStockReport, InventorySummary, LOW_STOCK_LIMIT, MovementKind, PeriodMovements,
        StockLevel, StockTransaction,
    },
};

/// Ledger columns over `stock_transactions t`, `products p` and `users u`
pub const TRANSACTION_COLUMNS: &str = "t.id, t.product_id, p.name AS product_name, t.type, \
     t.quantity, t.reason, t.reference, t.reference_id, t.stock_before, t.stock_after, \
     t.created_by, u.name AS created_by_name, t.created_at";

const LEVEL_SELECT: &str = "SELECT p.id, p.name, p.slug, p.images, p.brand, c.name AS category_name, \
     p.stock, p.low_stock_threshold \
     FROM products p LEFT JOIN categories c ON c.id = p.category_id";

#[derive(Debug, Clone, Default)]
pub struct StockFilter {
    pub search: Option<String>,
    pub low_stock_only: bool,
}

#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub product_id: Option<Uuid>,
    pub kind: Option<MovementKind>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

pub(crate) fn map_transaction(row: &PgRow) -> DatabaseResult<StockTransaction> {
    let kind: String = row.get("type");
    let kind = kind
        .parse::<MovementKind>()
        .map_err(|e| DatabaseError::Query(sqlx::Error::Decode(e.into())))?;

    Ok(StockTransaction {
        id: row.get("id"),
        product_id: row.get("product_id"),
        product_name: row.get("product_name"),
        kind,
        quantity: row.get("quantity"),
        reason: row.get("reason"),
        reference: row.get("reference"),
        reference_id: row.get("reference_id"),
        stock_before: row.get("stock_before"),
        stock_after: row.get("stock_after"),
        created_by: row.get("created_by"),
        created_by_name: row.get("created_by_name"),
        created_at: row.get("created_at"),
    })
}

fn map_level(row: &PgRow) -> StockLevel {
    StockLevel {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        images: row.get("images"),
        brand: row.get("brand"),
        category_name: row.get("category_name"),
        stock: row.get("stock"),
        low_stock_threshold: row.get("low_stock_threshold"),
    }
}

fn push_stock_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &StockFilter) {
    builder.push(" WHERE p.status = 'active'");

    if let Some(term) = &filter.search {
        let pattern = like_pattern(term);
        builder
            .push(" AND (p.name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR p.brand ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if filter.low_stock_only {
        builder.push(" AND p.stock <= p.low_stock_threshold");
    }
}

fn push_history_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &HistoryFilter) {
    builder.push(" WHERE TRUE");

    if let Some(product_id) = filter.product_id {
        builder.push(" AND t.product_id = ").push_bind(product_id);
    }
    if let Some(kind) = filter.kind {
        builder.push(" AND t.type = ").push_bind(kind.as_str());
    }
    if let Some(from) = filter.from {
        builder.push(" AND t.created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        builder.push(" AND t.created_at <= ").push_bind(to);
    }
}

#[derive(Clone)]
pub struct InventoryRepository {
    pool: PgPool,
}

impl InventoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Active products with their stock, lowest first
    pub async fn list_levels(
        &self,
        filter: &StockFilter,
        pagination: Pagination,
    ) -> DatabaseResult<(Vec<StockLevel>, i64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) AS count FROM products p");
        push_stock_filters(&mut count, filter);
        let total: i64 = count.build().fetch_one(&self.pool).await?.get("count");

        let mut query = QueryBuilder::<Postgres>::new(LEVEL_SELECT);
        push_stock_filters(&mut query, filter);
        query.push(" ORDER BY p.stock ASC, p.name ASC LIMIT ").push_bind(pagination.limit);
        query.push(" OFFSET ").push_bind(pagination.offset());

        let rows = query.build().fetch_all(&self.pool).await?;
        Ok((rows.iter().map(map_level).collect(), total))
    }

    /// Newest movements first
    pub async fn history(
        &self,
        filter: &HistoryFilter,
        pagination: Pagination,
    ) -> DatabaseResult<(Vec<StockTransaction>, i64)> {
        let mut count =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) AS count FROM stock_transactions t");
        push_history_filters(&mut count, filter);
        let total: i64 = count.build().fetch_one(&self.pool).await?.get("count");

        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM stock_transactions t \
             LEFT JOIN products p ON p.id = t.product_id \
             LEFT JOIN users u ON u.id = t.created_by",
            TRANSACTION_COLUMNS
        ));
        push_history_filters(&mut query, filter);
        query.push(" ORDER BY t.created_at DESC, t.id LIMIT ").push_bind(pagination.limit);
        query.push(" OFFSET ").push_bind(pagination.offset());

        let rows = query.build().fetch_all(&self.pool).await?;
        let transactions = rows
            .iter()
            .map(map_transaction)
            .collect::<DatabaseResult<Vec<_>>>()?;

        Ok((transactions, total))
    }

    pub async fn summary(&self, now: DateTime<Utc>) -> DatabaseResult<InventorySummary> {
        let totals = sqlx::query(
            "SELECT COUNT(*) AS total_products, \
                    COALESCE(SUM(stock), 0)::BIGINT AS total_stock, \
                    COUNT(*) FILTER (WHERE stock > 0 AND stock <= low_stock_threshold) AS low_stock_count, \
                    COUNT(*) FILTER (WHERE stock = 0) AS out_of_stock_count \
             FROM products WHERE status = 'active'",
        )
        .fetch_one(&self.pool)
        .await?;

        let today = self.movements_since(start_of_day(now)).await?;
        let week = self.movements_since(now - Duration::days(7)).await?;

        Ok(InventorySummary {
            total_products: totals.get("total_products"),
            total_stock: totals.get("total_stock"),
            low_stock_count: totals.get("low_stock_count"),
            out_of_stock_count: totals.get("out_of_stock_count"),
            today,
            week,
        })
    }

    async fn movements_since(&self, since: DateTime<Utc>) -> DatabaseResult<PeriodMovements> {
        let rows = sqlx::query(
            "SELECT type, COALESCE(SUM(quantity), 0)::BIGINT AS quantity, COUNT(*) AS count \
             FROM stock_transactions WHERE created_at >= $1 GROUP BY type",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(PeriodMovements::from_rows(rows.iter().map(|row| {
            (
                row.get::<String, _>("type"),
                row.get::<i64, _>("quantity"),
                row.get::<i64, _>("count"),
            )
        })))
    }

    /// Products at or under `threshold`, or under their own threshold when none is given
    pub async fn low_stock(&self, threshold: Option<i32>) -> DatabaseResult<Vec<StockLevel>> {
        let rows = sqlx::query(&format!(
            "{} WHERE p.status = 'active' AND p.stock <= COALESCE($1, p.low_stock_threshold) \
             ORDER BY p.stock ASC, p.name ASC LIMIT $2",
            LEVEL_SELECT
        ))
        .bind(threshold)
        .bind(LOW_STOCK_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(map_level).collect())
    }

    /// Stock and stock value per category, largest stock first
    pub async fn category_report(&self) -> DatabaseResult<Vec<CategoryStockReport>> {
        let rows = sqlx::query(
            "SELECT c.id, c.name, COUNT(p.id) AS product_count, \
                    COALESCE(SUM(p.stock), 0)::BIGINT AS total_stock, \
                    COALESCE(SUM(p.stock::BIGINT * p.price), 0)::BIGINT AS total_value, \
                    COUNT(p.id) FILTER (WHERE p.stock <= p.low_stock_threshold) AS low_stock_count \
             FROM categories c \
             LEFT JOIN products p ON p.category_id = c.id AND p.status = 'active' \
             GROUP BY c.id, c.name \
             ORDER BY total_stock DESC, c.name ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| CategoryStockReport {
                category_id: row.get("id"),
                category_name: row.get("name"),
                product_count: row.get("product_count"),
                total_stock: row.get("total_stock"),
                total_value: row.get("total_value"),
                low_stock_count: row.get("low_stock_count"),
            })
            .collect())
    }
}

/// Midnight UTC of the day containing `now`
fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_start_of_day() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 17, 45, 12).unwrap();
        assert_eq!(
            start_of_day(now),
            Utc.with_ymd_and_hms(2024, 3, 9, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_history_filters_bind_in_order() {
        let filter = HistoryFilter {
            product_id: Some(Uuid::nil()),
            kind: Some(MovementKind::Export),
            from: None,
            to: None,
        };
        let mut builder = QueryBuilder::<Postgres>::new("SELECT 1 FROM stock_transactions t");
        push_history_filters(&mut builder, &filter);
        assert_eq!(
            builder.sql(),
            "SELECT 1 FROM stock_transactions t WHERE TRUE AND t.product_id = $1 AND t.type = $2"
        );
    }

    #[test]
    fn test_low_stock_filter_uses_product_threshold() {
        let filter = StockFilter {
            search: None,
            low_stock_only: true,
        };
        let mut builder = QueryBuilder::<Postgres>::new("SELECT 1 FROM products p");
        push_stock_filters(&mut builder, &filter);
        assert!(builder.sql().ends_with("AND p.stock <= p.low_stock_threshold"));
    }
}
