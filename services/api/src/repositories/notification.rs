use common::error::DatabaseResult;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::models::{NewNotification, Notification};

const NOTIFICATION_COLUMNS: &str = "id, user_id, type, title, message, data, is_read, created_at";

#[derive(Clone)]
pub struct NotificationRepository {
    pool: PgPool,
}

fn map_notification(row: &PgRow) -> Notification {
    Notification {
        id: row.get("id"),
        user_id: row.get("user_id"),
        kind: row.get("type"),
        title: row.get("title"),
        message: row.get("message"),
        data: row.get("data"),
        is_read: row.get("is_read"),
        created_at: row.get("created_at"),
    }
}

impl NotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, notification: &NewNotification) -> DatabaseResult<Notification> {
        let row = sqlx::query(&format!(
            "INSERT INTO notifications (user_id, type, title, message, data) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            NOTIFICATION_COLUMNS
        ))
        .bind(notification.user_id)
        .bind(&notification.kind)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.data)
        .fetch_one(&self.pool)
        .await?;

        Ok(map_notification(&row))
    }

    /// Newest first
    pub async fn list(
        &self,
        user_id: Uuid,
        limit: i64,
        unread_only: bool,
    ) -> DatabaseResult<Vec<Notification>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM notifications \
             WHERE user_id = $1 AND ($2 = FALSE OR is_read = FALSE) \
             ORDER BY created_at DESC LIMIT $3",
            NOTIFICATION_COLUMNS
        ))
        .bind(user_id)
        .bind(unread_only)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(map_notification).collect())
    }

    pub async fn unread_count(&self, user_id: Uuid) -> DatabaseResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM notifications WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("count"))
    }

    /// `false` when the notification does not belong to the user
    pub async fn mark_read(&self, id: Uuid, user_id: Uuid) -> DatabaseResult<bool> {
        let result =
            sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = $1 AND user_id = $2")
                .bind(id)
                .bind(user_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_all_read(&self, user_id: Uuid) -> DatabaseResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn delete(&self, id: Uuid, user_id: Uuid) -> DatabaseResult<bool> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
