//! Low-stock alert notifications
//!
//! Shared by the api (on demand) and the worker (scheduled). Rows are written here;
//! pushing them to connected clients is up to the caller.

use serde_json::{Value, json};
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::error::DatabaseResult;

pub const STOCK_ALERT_TYPE: &str = "stock_alert";
const MAX_PRODUCTS_PER_RUN: i64 = 10;

/// Notification row created for one recipient and one product
#[derive(Debug, Clone)]
pub struct StockAlert {
    pub notification_id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub data: Value,
}

/// Title and message for a product with `available` units left
pub fn alert_text(product_name: &str, available: i64) -> (String, String) {
    if available <= 0 {
        (
            "Out of stock".to_string(),
            format!("{} is out of stock", product_name),
        )
    } else {
        (
            "Low stock".to_string(),
            format!("{} has only {} left", product_name, available),
        )
    }
}

/// Notify active admin and warehouse accounts about products at or below their threshold.
///
/// Units sitting in carts count as reserved. A recipient is told about a given product
/// at most once every 24 hours.
pub async fn create_low_stock_alerts(pool: &PgPool) -> DatabaseResult<Vec<StockAlert>> {
    let recipients: Vec<Uuid> = sqlx::query(
        "SELECT id FROM users WHERE role IN ('admin', 'warehouse') AND is_active = TRUE",
    )
    .fetch_all(pool)
    .await?
    .iter()
    .map(|row| row.get("id"))
    .collect();

    if recipients.is_empty() {
        return Ok(Vec::new());
    }

    let products = sqlx::query(
        "SELECT p.id, p.name, p.stock, p.low_stock_threshold, \
                (p.stock - COALESCE(reserved.quantity, 0))::BIGINT AS available \
         FROM products p \
         LEFT JOIN ( \
             SELECT product_id, SUM(quantity) AS quantity FROM cart_items GROUP BY product_id \
         ) reserved ON reserved.product_id = p.id \
         WHERE p.status = 'active' \
           AND (p.stock - COALESCE(reserved.quantity, 0)) <= p.low_stock_threshold \
         ORDER BY available ASC \
         LIMIT $1",
    )
    .bind(MAX_PRODUCTS_PER_RUN)
    .fetch_all(pool)
    .await?;

    let mut alerts = Vec::new();

    for product in &products {
        let product_id: Uuid = product.get("id");
        let name: String = product.get("name");
        let stock: i32 = product.get("stock");
        let threshold: i32 = product.get("low_stock_threshold");
        let available: i64 = product.get("available");
        let (title, message) = alert_text(&name, available);
        let data = json!({
            "productId": product_id,
            "stock": stock,
            "available": available,
            "threshold": threshold,
        });

        for user_id in &recipients {
            let row = sqlx::query(
                "INSERT INTO notifications (user_id, type, title, message, data) \
                 SELECT $1, $2, $3, $4, $5 \
                 WHERE NOT EXISTS ( \
                     SELECT 1 FROM notifications \
                     WHERE user_id = $1 AND type = $2 AND data->>'productId' = $6 \
                       AND created_at > NOW() - INTERVAL '24 hours' \
                 ) \
                 RETURNING id",
            )
            .bind(user_id)
            .bind(STOCK_ALERT_TYPE)
            .bind(&title)
            .bind(&message)
            .bind(&data)
            .bind(product_id.to_string())
            .fetch_optional(pool)
            .await?;

            if let Some(row) = row {
                alerts.push(StockAlert {
                    notification_id: row.get("id"),
                    user_id: *user_id,
                    title: title.clone(),
                    message: message.clone(),
                    data: data.clone(),
                });
            }
        }
    }

    info!(
        "Low stock check: {} products below threshold, {} alerts created",
        products.len(),
        alerts.len()
    );

    Ok(alerts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_text() {
        assert_eq!(
            alert_text("Cold Brew", 0),
            ("Out of stock".to_string(), "Cold Brew is out of stock".to_string())
        );
        assert_eq!(alert_text("Cold Brew", 3).1, "Cold Brew has only 3 left");
        assert_eq!(alert_text("Cold Brew", -2).0, "Out of stock");
    }
}
