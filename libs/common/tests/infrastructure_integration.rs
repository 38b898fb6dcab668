//! Integration tests for the infrastructure components
//!
//! These need a running PostgreSQL and Redis, so they are ignored by default:
//! `cargo test -p common -- --ignored`

use common::{
    cache::{CacheStore, RedisConfig, RedisPool},
    database::{DatabaseConfig, health_check, init_pool, run_migrations},
};
use sqlx::Row;
use std::time::Duration;

#[tokio::test]
#[ignore]
async fn test_database_migrations_apply() -> Result<(), Box<dyn std::error::Error>> {
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    assert!(health_check(&pool).await?, "Database health check failed");

    run_migrations(&pool).await?;

    let row = sqlx::query(
        "SELECT COUNT(*) AS count FROM information_schema.tables WHERE table_name IN ('users', 'products', 'orders')",
    )
    .fetch_one(&pool)
    .await?;

    let count: i64 = row.get("count");
    assert_eq!(count, 3, "core tables missing after migration");

    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_redis_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let redis_config = RedisConfig::from_env();
    let url = redis_config.url.clone().ok_or("REDIS_URL is not set")?;
    let redis_pool = RedisPool::new(&url)?;

    assert!(redis_pool.health_check().await?, "Redis health check failed");

    let test_key = "integration_test_key";
    redis_pool.set(test_key, "integration_test_value", Some(10)).await?;
    assert_eq!(
        redis_pool.get(test_key).await?,
        Some("integration_test_value".to_string())
    );

    redis_pool.delete(test_key).await?;
    assert_eq!(redis_pool.get(test_key).await?, None);

    let store = CacheStore::connect(&redis_config).await;
    assert_eq!(store.backend(), "redis");
    store
        .set_json("integration:products:1", &vec![1, 2, 3], Duration::from_secs(10))
        .await;
    store.delete_pattern("integration:products:*").await;
    assert_eq!(
        store.get_json::<Vec<i32>>("integration:products:1").await,
        None
    );

    Ok(())
}
