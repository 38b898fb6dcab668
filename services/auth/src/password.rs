//! bcrypt hashing off the async executor

use crate::error::{AuthError, AuthResult};

pub const BCRYPT_COST: u32 = 12;

pub async fn hash_password(password: &str) -> AuthResult<String> {
    hash_with_cost(password, BCRYPT_COST).await
}

async fn hash_with_cost(password: &str, cost: u32) -> AuthResult<String> {
    let password = password.to_string();
    let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AuthError::Internal(format!("hashing task failed: {}", e)))??;
    Ok(hash)
}

pub async fn verify_password(password: &str, hash: &str) -> AuthResult<bool> {
    let password = password.to_string();
    let hash = hash.to_string();
    let valid = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AuthError::Internal(format!("verification task failed: {}", e)))??;
    Ok(valid)
}
