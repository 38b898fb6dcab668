use anyhow::Result;
use axum::http::{HeaderValue, Method, header};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod chatbot;
mod checkout;
mod compare;
mod config;
mod error;
mod events;
mod idempotency;
mod inventory;
mod listing;
mod llm;
mod middleware;
mod models;
mod notifier;
mod repositories;
mod routes;
mod shipping;
mod slug;
mod state;

use common::{
    cache::{CacheStore, RedisConfig},
    database,
    jwt::{JwtConfig, JwtService},
    mailer::mailer_from_env,
};
use std::time::Duration;
use tokio::net::TcpListener;

use crate::{config::ApiConfig, events::EventBus, llm::llm_from_env, state::AppState};

const CACHE_SWEEP_PERIOD: Duration = Duration::from_secs(60);

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging, RUST_LOG wins over the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting API service");

    let config = ApiConfig::from_env();

    // Initialize database connection pool
    let db_config = database::DatabaseConfig::from_env()?;
    let pool = database::init_pool(&db_config).await?;

    if database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }
    if config.run_migrations {
        database::run_migrations(&pool).await?;
    }

    let jwt_service = JwtService::new(&JwtConfig::from_env()?);
    let cache = CacheStore::connect(&RedisConfig::from_env()).await;
    info!("Cache backend: {}", cache.backend());
    let cache_janitor = cache.spawn_janitor(CACHE_SWEEP_PERIOD);
    let mailer = mailer_from_env()?;
    let llm = llm_from_env()?;

    let app_state = AppState::new(
        pool,
        jwt_service,
        cache,
        mailer,
        llm,
        EventBus::default(),
        config.clone(),
    );

    info!("API service initialized successfully");

    let app = routes::create_router(app_state.clone())
        .layer(cors_layer(&config.allowed_origins))
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("API service listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cache_janitor.abort();
    app_state.shutdown().await;
    info!("API service stopped");

    Ok(())
}
