//! Repositories for database operations

pub mod otp;
pub mod user;

pub use otp::{NewPendingRegistration, OtpRepository};
pub use user::UserRepository;
