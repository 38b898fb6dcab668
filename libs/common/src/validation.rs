//! Input validation utilities shared by the services
//!
//! Every validator returns the first user-facing error message.

use regex::Regex;
use std::sync::OnceLock;

pub const MAX_EMAIL_LENGTH: usize = 255;
pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 100;
pub const MIN_STAFF_PASSWORD_LENGTH: usize = 6;
pub const MAX_QUANTITY: i32 = 1000;
/// Highest unit price any product or counter line may carry
pub const MAX_PRICE: i64 = 1_000_000_000;

/// Trim and lowercase
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validate email
pub fn validate_email(email: &str) -> Result<(), String> {
    let email = email.trim();
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > MAX_EMAIL_LENGTH {
        return Err("Email must be at most 255 characters long".to_string());
    }

    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9-]+(\.[a-zA-Z0-9-]+)*\.[a-zA-Z]{2,}$")
            .expect("Failed to compile email regex")
    });

    if !regex.is_match(email) {
        return Err("Invalid email address".to_string());
    }

    Ok(())
}

/// Validate password strength for customer accounts
pub fn validate_password(password: &str) -> Result<(), String> {
    let length = password.chars().count();

    if length < MIN_PASSWORD_LENGTH {
        return Err("Password must be at least 8 characters long".to_string());
    }

    if length > MAX_PASSWORD_LENGTH {
        return Err("Password must be at most 100 characters long".to_string());
    }

    let mut has_upper = false;
    let mut has_lower = false;
    let mut has_digit = false;
    let mut has_special = false;

    for c in password.chars() {
        if c.is_ascii_uppercase() {
            has_upper = true;
        } else if c.is_ascii_lowercase() {
            has_lower = true;
        } else if c.is_ascii_digit() {
            has_digit = true;
        } else if c.is_ascii_punctuation() {
            has_special = true;
        }
    }

    if !has_upper {
        return Err("Password must contain at least one uppercase letter".to_string());
    }

    if !has_lower {
        return Err("Password must contain at least one lowercase letter".to_string());
    }

    if !has_digit {
        return Err("Password must contain at least one digit".to_string());
    }

    if !has_special {
        return Err("Password must contain at least one special character".to_string());
    }

    Ok(())
}

/// Staff accounts are created by an admin with a shorter minimum
pub fn validate_staff_password(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_STAFF_PASSWORD_LENGTH {
        return Err("Password must be at least 6 characters long".to_string());
    }
    if password.chars().count() > MAX_PASSWORD_LENGTH {
        return Err("Password must be at most 100 characters long".to_string());
    }
    Ok(())
}

/// Unicode letters and spaces, 2 to 100 characters after trimming
pub fn validate_name(name: &str) -> Result<(), String> {
    let name = name.trim();
    let length = name.chars().count();

    if length < 2 {
        return Err("Name must be at least 2 characters long".to_string());
    }

    if length > 100 {
        return Err("Name must be at most 100 characters long".to_string());
    }

    static NAME_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = NAME_REGEX
        .get_or_init(|| Regex::new(r"^[\p{L}\s]+$").expect("Failed to compile name regex"));

    if !regex.is_match(name) {
        return Err("Name can only contain letters and spaces".to_string());
    }

    Ok(())
}

/// Local phone numbers: a leading 0 followed by 9 or 10 digits
pub fn validate_phone(phone: &str) -> Result<(), String> {
    static PHONE_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = PHONE_REGEX
        .get_or_init(|| Regex::new(r"^0[0-9]{9,10}$").expect("Failed to compile phone regex"));

    if !regex.is_match(phone.trim()) {
        return Err("Invalid phone number (10-11 digits starting with 0)".to_string());
    }

    Ok(())
}

/// Six decimal digits
pub fn validate_otp(otp: &str) -> Result<(), String> {
    if otp.len() != 6 || !otp.chars().all(|c| c.is_ascii_digit()) {
        return Err("OTP must be 6 digits".to_string());
    }
    Ok(())
}

/// Avatar and product image references
pub fn validate_image_url(url: &str) -> Result<(), String> {
    if url.len() > 2000 && !url.starts_with("data:image/") {
        return Err("Image URL must be at most 2000 characters long".to_string());
    }

    let allowed = url.starts_with("data:image/")
        || url.starts_with("http://")
        || url.starts_with("https://")
        || url.starts_with("/uploads/");

    if !allowed {
        return Err("Invalid image URL".to_string());
    }

    Ok(())
}

pub fn validate_quantity(quantity: i32) -> Result<(), String> {
    if quantity < 1 {
        return Err("Quantity must be at least 1".to_string());
    }
    if quantity > MAX_QUANTITY {
        return Err("Quantity must be at most 1000".to_string());
    }
    Ok(())
}

/// Validate a unit price
pub fn validate_price(price: i64) -> Result<(), String> {
    if price < 0 {
        return Err("Price must be zero or greater".to_string());
    }
    if price > MAX_PRICE {
        return Err(format!("Price must be at most {}", MAX_PRICE));
    }
    Ok(())
}

/// Drop HTML tags and surrounding whitespace from free text
pub fn sanitize_text(input: &str) -> String {
    static TAG_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = TAG_REGEX.get_or_init(|| Regex::new(r"<[^>]*>").expect("Failed to compile tag regex"));
    regex.replace_all(input, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Test@Example.COM "), "test@example.com");
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("test@example.com").is_ok());
        assert!(validate_email("first.last+tag@mail.example.vn").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("user@").is_err());
        assert!(validate_email("user@domain").is_err());

        let long = format!("{}@example.com", "a".repeat(250));
        assert!(validate_email(&long).is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("Test@123!").is_ok());
        assert!(validate_password("Aa1!aaaa").is_ok());

        // too short
        assert!(validate_password("Aa1!aaa").is_err());
        // missing one class each
        assert!(validate_password("test@123!").is_err());
        assert!(validate_password("TEST@123!").is_err());
        assert!(validate_password("Test@abc!").is_err());
        assert!(validate_password("Test1234").is_err());

        let long = format!("Aa1!{}", "a".repeat(97));
        assert!(validate_password(&long).is_err());
    }

    #[test]
    fn test_validate_staff_password() {
        assert!(validate_staff_password("123456").is_ok());
        assert!(validate_staff_password("12345").is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("Test User").is_ok());
        assert!(validate_name("Nguyễn Văn An").is_ok());
        assert!(validate_name("A").is_err());
        assert!(validate_name("Robert'); DROP").is_err());
        assert!(validate_name("User 42").is_err());
        assert!(validate_name(&"a".repeat(101)).is_err());
    }

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("0912345678").is_ok());
        assert!(validate_phone("09123456789").is_ok());
        assert!(validate_phone("912345678").is_err());
        assert!(validate_phone("091234567").is_err());
        assert!(validate_phone("09123abc78").is_err());
    }

    #[test]
    fn test_validate_otp() {
        assert!(validate_otp("123456").is_ok());
        assert!(validate_otp("12345").is_err());
        assert!(validate_otp("12345a").is_err());
    }

    #[test]
    fn test_validate_image_url() {
        assert!(validate_image_url("https://cdn.example.com/a.png").is_ok());
        assert!(validate_image_url("/uploads/avatars/1.png").is_ok());
        assert!(validate_image_url("data:image/png;base64,AAAA").is_ok());
        assert!(validate_image_url("javascript:alert(1)").is_err());
        assert!(validate_image_url("ftp://x/y.png").is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(1000).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(1001).is_err());
    }

    #[test]
    fn test_validate_price() {
        assert!(validate_price(0).is_ok());
        assert!(validate_price(MAX_PRICE).is_ok());
        assert!(validate_price(-1).is_err());
        assert!(validate_price(i64::MAX / 2).is_err());
    }

    #[test]
    fn test_sanitize_text() {
        assert_eq!(sanitize_text("  <b>Hello</b> there "), "Hello there");
    }
}
