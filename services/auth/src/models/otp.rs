//! Outstanding OTP records

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::otp::OtpRecord;

/// Registration waiting for its OTP to be confirmed
#[derive(Debug, Clone)]
pub struct PendingRegistration {
    pub id: Uuid,
    pub email: String,
    /// bcrypt hash, copied onto the user on success
    pub password_hash: String,
    pub name: String,
    pub otp_hash: String,
    pub expires_at: DateTime<Utc>,
    pub attempts: i32,
}

/// Password reset request
#[derive(Debug, Clone)]
pub struct PasswordReset {
    pub id: Uuid,
    pub email: String,
    pub otp_hash: String,
    pub expires_at: DateTime<Utc>,
    pub attempts: i32,
}

impl PendingRegistration {
    pub fn otp_record(&self) -> OtpRecord {
        OtpRecord {
            otp_hash: self.otp_hash.clone(),
            expires_at: self.expires_at,
            attempts: self.attempts,
        }
    }
}

impl PasswordReset {
    pub fn otp_record(&self) -> OtpRecord {
        OtpRecord {
            otp_hash: self.otp_hash.clone(),
            expires_at: self.expires_at,
            attempts: self.attempts,
        }
    }
}
