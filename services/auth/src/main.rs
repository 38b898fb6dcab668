use anyhow::Result;
use axum::http::{HeaderValue, Method, header};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

mod config;
mod error;
mod middleware;
mod models;
mod otp;
mod password;
mod rate_limiter;
mod repositories;
mod routes;

use std::sync::Arc;

use common::{
    database,
    jwt::{JwtConfig, JwtService},
    mailer::{Mailer, mailer_from_env},
};
use sqlx::PgPool;
use tokio::net::TcpListener;

use crate::{
    config::AuthConfig,
    rate_limiter::RateLimiters,
    repositories::{OtpRepository, UserRepository},
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub jwt_service: JwtService,
    pub user_repository: UserRepository,
    pub otp_repository: OtpRepository,
    pub rate_limiters: RateLimiters,
    pub mailer: Arc<dyn Mailer>,
    pub config: AuthConfig,
}

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
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
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

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting authentication service");

    let config = AuthConfig::from_env();

    // Initialize database connection pool
    let db_config = database::DatabaseConfig::from_env()?;
    let pool = database::init_pool(&db_config).await?;

    if database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }
    database::run_migrations(&pool).await?;

    let jwt_service = JwtService::new(&JwtConfig::from_env()?);
    let mailer = mailer_from_env()?;

    let app_state = AppState {
        db_pool: pool.clone(),
        jwt_service,
        user_repository: UserRepository::new(pool.clone()),
        otp_repository: OtpRepository::new(pool.clone()),
        rate_limiters: RateLimiters::default(),
        mailer: mailer.clone(),
        config: config.clone(),
    };

    info!("Authentication service initialized successfully");

    let app = routes::create_router(app_state)
        .layer(cors_layer(&config.allowed_origins))
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("Authentication service listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    mailer.shutdown().await;
    pool.close().await;
    info!("Authentication service stopped");

    Ok(())
}
