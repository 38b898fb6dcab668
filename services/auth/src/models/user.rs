//! User model and request payloads

use chrono::{DateTime, Utc};
use common::jwt::Role;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User entity as stored
///
/// Deliberately not `Serialize`: responses go through [`PublicUser`].
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub avatar: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub points: i32,
    pub tier: String,
    pub total_spent: i64,
    pub order_count: i32,
    pub created_at: DateTime<Utc>,
}

/// Profile returned to clients
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub avatar: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub points: i32,
    pub tier: String,
    pub total_spent: i64,
    pub order_count: i32,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        PublicUser {
            id: user.id,
            email: user.email,
            name: user.name,
            avatar: user.avatar,
            phone: user.phone,
            address: user.address,
            role: user.role,
            is_active: user.is_active,
            created_at: user.created_at,
            points: user.points,
            tier: user.tier,
            total_spent: user.total_spent,
            order_count: user.order_count,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
}

/// Body carrying only an email (resend OTP, forgot password)
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub email: String,
    pub otp: String,
    pub new_password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "test@example.com".to_string(),
            password_hash: "$2b$12$abcdefghijklmnopqrstuv".to_string(),
            name: "Test User".to_string(),
            avatar: None,
            phone: None,
            address: None,
            role: Role::User,
            is_active: true,
            points: 0,
            tier: "bronze".to_string(),
            total_spent: 0,
            order_count: 0,
            created_at: Utc::now(),
        }
    }

    fn contains_key(value: &serde_json::Value, needle: &str) -> bool {
        match value {
            serde_json::Value::Object(map) => map
                .iter()
                .any(|(k, v)| k.to_lowercase().contains(needle) || contains_key(v, needle)),
            serde_json::Value::Array(items) => items.iter().any(|v| contains_key(v, needle)),
            _ => false,
        }
    }

    #[test]
    fn test_public_user_never_carries_password() {
        let public = PublicUser::from(user());
        let json = serde_json::to_value(&public).unwrap();
        assert!(!contains_key(&json, "password"));
        assert_eq!(json["email"], "test@example.com");
        assert_eq!(json["isActive"], true);
        assert_eq!(json["role"], "user");
    }

    #[test]
    fn test_register_rejects_unknown_fields() {
        let body = r#"{"email":"a@b.co","password":"Test@123!","name":"Test","role":"admin"}"#;
        assert!(serde_json::from_str::<RegisterRequest>(body).is_err());

        let body = r#"{"email":"a@b.co","password":"Test@123!","name":"Test"}"#;
        assert!(serde_json::from_str::<RegisterRequest>(body).is_ok());
    }

    #[test]
    fn test_change_password_uses_camel_case() {
        let body = r#"{"currentPassword":"old","newPassword":"New@1234"}"#;
        let req: ChangePasswordRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req.current_password, "old");
        assert_eq!(req.new_password, "New@1234");
    }
}
