//! Stored notifications that are also pushed to connected clients

use common::{alerts, error::DatabaseResult};
use serde_json::{Value, json};
use sqlx::{PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    events::{Channel, EventBus},
    models::{
        NewNotification, Notification, OrderStatus,
        wishlist::{WISHLIST_SALE_TYPE, sale_text},
    },
    repositories::NotificationRepository,
};

pub const NOTIFICATION_EVENT: &str = "notification:new";
pub const ORDER_STATUS_EVENT: &str = "order:status_changed";

#[derive(Clone)]
pub struct NotificationService {
    pool: PgPool,
    repository: NotificationRepository,
    events: EventBus,
}

impl NotificationService {
    pub fn new(pool: PgPool, events: EventBus) -> Self {
        Self {
            repository: NotificationRepository::new(pool.clone()),
            pool,
            events,
        }
    }

    /// Store a notification and push it to the user's channel.
    ///
    /// Failures are logged and swallowed; callers have already done their real work.
    pub async fn create_and_push(&self, notification: NewNotification) -> Option<Notification> {
        match self.repository.create(&notification).await {
            Ok(stored) => {
                self.push(stored.user_id, notification_payload(&stored));
                Some(stored)
            }
            Err(e) => {
                warn!(
                    "Failed to store {} notification for {}: {}",
                    notification.kind, notification.user_id, e
                );
                None
            }
        }
    }

    /// Tell a customer their order moved to `status`
    pub async fn order_status_changed(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        status: OrderStatus,
        total: i64,
    ) {
        self.events.publish(
            Channel::User(user_id),
            ORDER_STATUS_EVENT,
            json!({
                "orderId": order_id,
                "status": status,
                "statusLabel": status.label(),
                "total": total,
                "timestamp": chrono::Utc::now(),
            }),
        );

        self.create_and_push(NewNotification {
            user_id,
            kind: "order_status".to_string(),
            title: status.label().to_string(),
            message: format!(
                "Order #{} is now {}",
                short_order_id(order_id),
                status.as_str()
            ),
            data: Some(json!({ "orderId": order_id, "status": status })),
        })
        .await;
    }

    /// Write low-stock alerts for staff and push each one
    pub async fn send_low_stock_alerts(&self) -> DatabaseResult<usize> {
        let created = alerts::create_low_stock_alerts(&self.pool).await?;
        for alert in &created {
            self.push(
                alert.user_id,
                json!({
                    "id": alert.notification_id,
                    "type": alerts::STOCK_ALERT_TYPE,
                    "title": alert.title,
                    "message": alert.message,
                    "data": alert.data,
                    "isRead": false,
                }),
            );
        }
        info!("Sent {} low stock alerts", created.len());
        Ok(created.len())
    }

    /// Tell everyone who saved a product that it went on sale.
    ///
    /// Each user hears about a given product at most once every 24 hours.
    pub async fn wishlist_sale(
        &self,
        product_id: Uuid,
        slug: &str,
        name: &str,
        discount: i32,
    ) -> DatabaseResult<usize> {
        let (title, message) = sale_text(name, discount);
        let data = json!({
            "productId": product_id,
            "productSlug": slug,
            "productName": name,
            "discount": discount,
        });

        let rows = sqlx::query(
            "INSERT INTO notifications (user_id, type, title, message, data) \
             SELECT w.user_id, $2, $3, $4, $5 FROM wishlist w \
             JOIN users u ON u.id = w.user_id AND u.is_active = TRUE \
             WHERE w.product_id = $1 \
               AND NOT EXISTS ( \
                   SELECT 1 FROM notifications n \
                   WHERE n.user_id = w.user_id AND n.type = $2 AND n.data->>'productId' = $6 \
                     AND n.created_at > NOW() - INTERVAL '24 hours' \
               ) \
             RETURNING id, user_id",
        )
        .bind(product_id)
        .bind(WISHLIST_SALE_TYPE)
        .bind(&title)
        .bind(&message)
        .bind(&data)
        .bind(product_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        for row in &rows {
            self.push(
                row.get("user_id"),
                json!({
                    "id": row.get::<Uuid, _>("id"),
                    "type": WISHLIST_SALE_TYPE,
                    "title": title,
                    "message": message,
                    "data": data,
                    "isRead": false,
                }),
            );
        }
        info!("Wishlist sale on {}: {} users notified", product_id, rows.len());
        Ok(rows.len())
    }

    fn push(&self, user_id: Uuid, payload: Value) {
        self.events
            .publish(Channel::User(user_id), NOTIFICATION_EVENT, payload);
    }
}

fn notification_payload(notification: &Notification) -> Value {
    serde_json::to_value(notification).unwrap_or_else(|_| json!({ "id": notification.id }))
}

/// First eight characters, as shown to customers
pub fn short_order_id(order_id: Uuid) -> String {
    order_id.simple().to_string()[..8].to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_order_id() {
        let id: Uuid = "7b0c5a52-3f0e-4a4e-9a57-3f4b8f3b9a10".parse().unwrap();
        assert_eq!(short_order_id(id), "7B0C5A52");
    }
}
