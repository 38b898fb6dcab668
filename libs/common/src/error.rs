//! Error types shared by the Brewline services
//!
//! Each infrastructure concern gets its own error enum so services can map
//! them onto HTTP responses without string matching.

use sqlx::Error as SqlxError;
use thiserror::Error;

/// Custom error type for database operations
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error occurred during database connection
    #[error("Database connection error: {0}")]
    Connection(#[source] SqlxError),

    /// Error occurred during database query execution
    #[error("Database query error: {0}")]
    Query(#[source] SqlxError),

    /// Error occurred during database migration
    #[error("Database migration error: {0}")]
    Migration(String),

    /// Configuration error
    #[error("Database configuration error: {0}")]
    Configuration(String),
}

impl From<SqlxError> for DatabaseError {
    fn from(err: SqlxError) -> Self {
        DatabaseError::Query(err)
    }
}

/// Type alias for Result with DatabaseError
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Errors raised by the cache store
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Errors raised while issuing or checking access tokens
#[derive(Error, Debug)]
pub enum JwtError {
    #[error("JWT configuration error: {0}")]
    Configuration(String),

    #[error("Invalid token: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
}

/// Errors raised by outbound email delivery
#[derive(Error, Debug)]
pub enum MailError {
    #[error("Mail configuration error: {0}")]
    Configuration(String),

    #[error("Invalid address: {0}")]
    Address(String),

    #[error("Mail delivery failed: {0}")]
    Delivery(String),
}

/// Errors raised by outbound ports (LLM provider, event fan-out)
#[derive(Error, Debug)]
pub enum PortError {
    #[error("Port is not configured: {0}")]
    Unavailable(String),

    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("Unexpected upstream response: {0}")]
    InvalidResponse(String),
}
