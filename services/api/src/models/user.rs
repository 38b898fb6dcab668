//! Staff and customer accounts as seen from the back office

use chrono::{DateTime, Utc};
use common::{
    jwt::Role,
    validation::{validate_email, validate_phone, validate_staff_password},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::order::Order;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffMember {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Customer account with order totals
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSummary {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub avatar: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub orders_count: i64,
    /// Sum of non-cancelled order totals
    pub total_spent: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerOrder {
    #[serde(flatten)]
    pub order: Order,
    pub items_count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerDetail {
    #[serde(flatten)]
    pub customer: CustomerSummary,
    pub orders: Vec<CustomerOrder>,
}

/// An active admin with no other active admin beside them
pub fn is_sole_active_admin(role: Role, is_active: bool, active_admins: i64) -> bool {
    role == Role::Admin && is_active && active_admins <= 1
}

/// Roles a staff account can hold
pub fn parse_staff_role(raw: &str) -> Result<Role, String> {
    match raw.parse::<Role>() {
        Ok(role) if role.is_staff() => Ok(role),
        _ => Err("Role must be admin, sales or warehouse".to_string()),
    }
}

/// Roles an account can be given from the users screen
pub fn parse_customer_role(raw: &str) -> Result<Role, String> {
    match raw.parse::<Role>() {
        Ok(role @ (Role::User | Role::Admin)) => Ok(role),
        _ => Err("Role must be user or admin".to_string()),
    }
}

fn validate_staff_name(name: &str) -> Result<(), String> {
    let len = name.trim().chars().count();
    if len < 2 {
        return Err("Name must be at least 2 characters".to_string());
    }
    if len > 100 {
        return Err("Name must be at most 100 characters".to_string());
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateStaffRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub role: String,
    pub phone: Option<String>,
}

impl CreateStaffRequest {
    /// Checked values ready to persist
    pub fn validate(&self) -> Result<Role, String> {
        validate_email(&self.email)?;
        validate_staff_password(&self.password)?;
        validate_staff_name(&self.name)?;
        if let Some(phone) = self.phone.as_deref().filter(|p| !p.trim().is_empty()) {
            validate_phone(phone)?;
        }
        parse_staff_role(&self.role)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateStaffRequest {
    pub name: Option<String>,
    pub role: Option<String>,
    pub phone: Option<String>,
}

impl UpdateStaffRequest {
    pub fn validate(&self) -> Result<Option<Role>, String> {
        if let Some(name) = &self.name {
            validate_staff_name(name)?;
        }
        if let Some(phone) = self.phone.as_deref().filter(|p| !p.trim().is_empty()) {
            validate_phone(phone)?;
        }
        self.role.as_deref().map(parse_staff_role).transpose()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResetStaffPasswordRequest {
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SetStatusRequest {
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateCustomerRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub role: Option<String>,
}

impl UpdateCustomerRequest {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.phone.is_none() && self.address.is_none() && self.role.is_none()
    }

    pub fn validate(&self) -> Result<Option<Role>, String> {
        if self.is_empty() {
            return Err("Nothing to update".to_string());
        }
        if let Some(name) = &self.name {
            validate_staff_name(name)?;
        }
        if let Some(phone) = self.phone.as_deref().filter(|p| !p.trim().is_empty()) {
            validate_phone(phone)?;
        }
        self.role.as_deref().map(parse_customer_role).transpose()
    }
}

/// Staff list filters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StaffListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    pub role: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sole_active_admin() {
        assert!(is_sole_active_admin(Role::Admin, true, 1));
        assert!(!is_sole_active_admin(Role::Admin, true, 2));
        // an inactive admin is not counted among the active ones
        assert!(!is_sole_active_admin(Role::Admin, false, 1));
        assert!(!is_sole_active_admin(Role::Sales, true, 1));
    }

    #[test]
    fn test_staff_roles() {
        assert_eq!(parse_staff_role("sales"), Ok(Role::Sales));
        assert_eq!(parse_staff_role("admin"), Ok(Role::Admin));
        assert!(parse_staff_role("user").is_err());
        assert!(parse_staff_role("owner").is_err());
    }

    #[test]
    fn test_customer_roles() {
        assert_eq!(parse_customer_role("user"), Ok(Role::User));
        assert!(parse_customer_role("warehouse").is_err());
    }

    #[test]
    fn test_create_staff_validation() {
        let req: CreateStaffRequest = serde_json::from_str(
            r#"{"email":"barista@example.com","password":"secret1","name":"Linh","role":"sales"}"#,
        )
        .unwrap();
        assert_eq!(req.validate(), Ok(Role::Sales));

        let short: CreateStaffRequest = serde_json::from_str(
            r#"{"email":"barista@example.com","password":"12345","name":"Linh","role":"sales"}"#,
        )
        .unwrap();
        assert!(short.validate().is_err());
    }

    #[test]
    fn test_create_staff_rejects_extra_fields() {
        let result = serde_json::from_str::<CreateStaffRequest>(
            r#"{"email":"a@b.co","password":"secret1","name":"Linh","role":"sales","isActive":false}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_customer_update() {
        assert_eq!(
            UpdateCustomerRequest::default().validate(),
            Err("Nothing to update".to_string())
        );
    }
}
