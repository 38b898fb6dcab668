use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MAX_NOTIFICATIONS: i64 = 100;
const DEFAULT_NOTIFICATIONS: i64 = 20;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Notification to be stored and pushed
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationQuery {
    pub limit: Option<i64>,
    pub unread_only: Option<bool>,
}

impl NotificationQuery {
    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_NOTIFICATIONS)
            .clamp(1, MAX_NOTIFICATIONS)
    }

    pub fn unread_only(&self) -> bool {
        self.unread_only.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_is_capped() {
        let query = NotificationQuery {
            limit: Some(500),
            unread_only: None,
        };
        assert_eq!(query.limit(), MAX_NOTIFICATIONS);
        assert_eq!(NotificationQuery::default().limit(), DEFAULT_NOTIFICATIONS);
        assert!(!query.unread_only());
    }
}
