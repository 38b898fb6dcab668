//! Replay protection for checkout
//!
//! A receipt is remembered per `(user, key)` for a day. A retried checkout with the same key
//! gets the stored receipt back instead of placing a second order.

use common::cache::CacheStore;
use std::time::Duration;
use uuid::Uuid;

use crate::models::OrderReceipt;

pub const IDEMPOTENCY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

fn key_for(user_id: Uuid, key: Uuid) -> String {
    format!("idempotency:{}:{}", user_id, key)
}

pub async fn lookup(cache: &CacheStore, user_id: Uuid, key: Uuid) -> Option<OrderReceipt> {
    cache.get_json(&key_for(user_id, key)).await
}

pub async fn remember(cache: &CacheStore, user_id: Uuid, key: Uuid, receipt: &OrderReceipt) {
    cache
        .set_json(&key_for(user_id, key), receipt, IDEMPOTENCY_TTL)
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderStatus;

    #[tokio::test]
    async fn test_receipt_is_scoped_to_user() {
        let cache = CacheStore::in_memory();
        let user = Uuid::new_v4();
        let key = Uuid::new_v4();
        let receipt = OrderReceipt {
            order_id: Uuid::new_v4(),
            total: 95_000,
            status: OrderStatus::Pending,
        };

        assert!(lookup(&cache, user, key).await.is_none());
        remember(&cache, user, key, &receipt).await;

        assert_eq!(lookup(&cache, user, key).await, Some(receipt));
        assert!(lookup(&cache, Uuid::new_v4(), key).await.is_none());
    }
}
