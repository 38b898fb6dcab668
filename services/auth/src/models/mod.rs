//! Authentication service models

pub mod otp;
pub mod user;

// Re-export for convenience
pub use otp::{PasswordReset, PendingRegistration};
pub use user::{
    ChangePasswordRequest, EmailRequest, LoginRequest, PublicUser, RegisterRequest,
    ResetPasswordRequest, UpdateProfileRequest, User, VerifyOtpRequest,
};
