//! Authentication and role guards

use axum::{
    Extension,
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
use common::jwt::Role;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

/// Authenticated caller, as stored in the request extensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }
}

/// Optional caller for routes open to guests
#[derive(Debug, Clone, Default)]
pub struct MaybeUser(pub Option<AuthUser>);

/// Resolve a bearer token into the current account.
///
/// The role is re-read from the database so demotions and deactivations take
/// effect before the token expires.
async fn resolve(state: &AppState, token: &str) -> Result<AuthUser, ApiError> {
    let claims = state.jwt_service.validate(token).map_err(|e| {
        debug!("Rejected token: {}", e);
        ApiError::Unauthorized("Invalid or expired token".to_string())
    })?;

    let account = state
        .repositories
        .users
        .account_state(claims.user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Account no longer exists".to_string()))?;

    if !account.is_active {
        warn!("Disabled account {} tried to authenticate", claims.user_id);
        return Err(ApiError::Forbidden("Account is disabled".to_string()));
    }

    Ok(AuthUser {
        id: claims.user_id,
        email: claims.email,
        role: account.role,
    })
}

/// Require a valid Bearer token and expose the caller to handlers
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(Authorization(bearer)) =
        bearer.ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?;

    let user = resolve(&state, bearer.token()).await?;
    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}

/// Attach the caller when a usable token is present; never rejects
pub async fn optional_auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let user = match bearer {
        Some(TypedHeader(Authorization(bearer))) => resolve(&state, bearer.token()).await.ok(),
        None => None,
    };
    req.extensions_mut().insert(MaybeUser(user));

    next.run(req).await
}

fn require(user: Option<&AuthUser>, allowed: &[Role]) -> Result<(), ApiError> {
    let user = user.ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?;
    if allowed.contains(&user.role) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "You do not have permission to perform this action".to_string(),
        ))
    }
}

/// admin, sales or warehouse
pub async fn require_staff(
    user: Option<Extension<AuthUser>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    require(
        user.as_ref().map(|Extension(u)| u),
        &[Role::Admin, Role::Sales, Role::Warehouse],
    )?;
    Ok(next.run(req).await)
}

pub async fn require_admin(
    user: Option<Extension<AuthUser>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    require(user.as_ref().map(|Extension(u)| u), &[Role::Admin])?;
    Ok(next.run(req).await)
}

/// Point-of-sale roles
pub async fn require_sales(
    user: Option<Extension<AuthUser>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    require(
        user.as_ref().map(|Extension(u)| u),
        &[Role::Admin, Role::Sales],
    )?;
    Ok(next.run(req).await)
}

/// Stock handling roles
pub async fn require_warehouse(
    user: Option<Extension<AuthUser>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    require(
        user.as_ref().map(|Extension(u)| u),
        &[Role::Admin, Role::Warehouse],
    )?;
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            email: "staff@example.com".to_string(),
            role,
        }
    }

    #[test]
    fn test_require_roles() {
        let sales = user(Role::Sales);
        assert!(require(Some(&sales), &[Role::Admin, Role::Sales]).is_ok());
        assert!(matches!(
            require(Some(&sales), &[Role::Admin]),
            Err(ApiError::Forbidden(_))
        ));
        assert!(matches!(
            require(None, &[Role::Admin]),
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_customer_is_not_staff() {
        assert!(!user(Role::User).is_staff());
        assert!(user(Role::Warehouse).is_staff());
    }
}
