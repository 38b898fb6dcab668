//! Middleware for JWT token validation and authentication

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use tracing::debug;

use crate::{AppState, error::AuthError};

/// Validate the Bearer token and expose its claims to handlers
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let TypedHeader(Authorization(bearer)) =
        bearer.ok_or_else(|| AuthError::Unauthorized("Authentication required".to_string()))?;

    let claims = state.jwt_service.validate(bearer.token()).map_err(|e| {
        debug!("Rejected token: {}", e);
        AuthError::Unauthorized("Invalid or expired token".to_string())
    })?;

    // Add claims to request extensions for use in handlers
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}
