//! Authentication core for marketplace-auth
//!
//! This module provides the account security functionality:
//! - Password hashing, strength rules and token generation
//! - Single-use email verification and password reset tokens
//! - Fixed-window rate limiting
//! - Session management
//! - The authentication service tying them together

pub mod maintenance;
pub mod manager;
pub mod password;
pub mod ratelimit;
pub mod session;
pub mod token;

pub use maintenance::MaintenanceTask;
pub use manager::{
    normalize_email, validate_email, AuthService, ChangePasswordRequest, LoginRequest,
    LoginSuccess, RegisterRequest, ResetPasswordRequest, SweepReport, ADMIN_USERNAME,
    PASSWORD_RESET_MESSAGE, VERIFICATION_RESEND_MESSAGE,
};
pub use password::{validate_strength, validate_token_format, PasswordService, StrengthReport};
pub use ratelimit::{
    track_quota, CounterStore, InMemoryCounterStore, RateLimitDecision, RateLimitOperation,
    RateLimiter,
};
pub use session::SessionManager;
pub use token::{hash_token, is_well_formed, TokenService};
