//! One-time passcodes for registration and password reset

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Wrong guesses allowed before the record is discarded
pub const MAX_OTP_ATTEMPTS: i32 = 5;
/// Lifetime of an issued code
pub const OTP_TTL_MINUTES: i64 = 10;

/// Six digit code, uniformly drawn from 100000..=999999
pub fn generate_otp() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

/// Lowercase hex SHA-256 of the code
pub fn hash_otp(otp: &str) -> String {
    format!("{:x}", Sha256::digest(otp.as_bytes()))
}

pub fn expiry_from(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::minutes(OTP_TTL_MINUTES)
}

/// Stored state of an outstanding code
#[derive(Debug, Clone)]
pub struct OtpRecord {
    pub otp_hash: String,
    pub expires_at: DateTime<Utc>,
    pub attempts: i32,
}

/// Result of checking a submitted code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtpOutcome {
    /// Record must be deleted
    Expired,
    /// Record must be deleted
    TooManyAttempts,
    /// Attempts must be incremented
    Mismatch { remaining: i32 },
    Verified,
}

/// Decide what a submitted code means for the stored record
///
/// Expiry is checked before the attempt budget, and both before the hash.
pub fn check_otp(record: &OtpRecord, submitted: &str, now: DateTime<Utc>) -> OtpOutcome {
    if now > record.expires_at {
        return OtpOutcome::Expired;
    }

    if record.attempts >= MAX_OTP_ATTEMPTS {
        return OtpOutcome::TooManyAttempts;
    }

    let submitted_hash = hash_otp(submitted.trim());
    if !bool::from(submitted_hash.as_bytes().ct_eq(record.otp_hash.as_bytes())) {
        return OtpOutcome::Mismatch {
            remaining: MAX_OTP_ATTEMPTS - record.attempts - 1,
        };
    }

    OtpOutcome::Verified
}
