// src/models/user.rs

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s").expect("whitespace regex"));

/// Represents the 'users' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    pub name: String,

    /// Stored lowercase; uniqueness is enforced by the database.
    pub email: String,

    /// Argon2 password hash.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password: String,

    pub image_url: String,

    pub bio: String,

    /// User role: 'student' or 'educator'.
    pub role: String,

    /// Set once the registration one-time code has been verified.
    pub is_email_verified: bool,

    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// DTO for registering a new user. Registration is gated on a one-time code
/// previously sent to the email address.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(
        min = 1,
        max = 100,
        message = "Name must be between 1 and 100 characters."
    ))]
    pub name: String,
    #[validate(email(message = "A valid email address is required."))]
    pub email: String,
    #[validate(
        length(
            min = 6,
            max = 128,
            message = "Password must be between 6 and 128 characters."
        ),
        custom(function = validate_password_chars)
    )]
    pub password: String,
    #[validate(custom(function = validate_role))]
    pub role: Option<String>,
    #[validate(length(equal = 6, message = "Verification code must be 6 digits."))]
    pub otp: String,
}

/// DTO for user login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// DTO for requesting a registration one-time code.
#[derive(Debug, Deserialize, Validate)]
pub struct SendRegistrationOtpRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(email(message = "A valid email address is required."))]
    pub email: String,
}

/// DTO for requesting a password-reset one-time code.
#[derive(Debug, Deserialize, Validate)]
pub struct SendPasswordOtpRequest {
    #[validate(email(message = "A valid email address is required."))]
    pub email: String,
}

/// DTO for checking a one-time code without consuming it.
#[derive(Debug, Deserialize, Validate)]
pub struct VerifyOtpRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(equal = 6, message = "Verification code must be 6 digits."))]
    pub otp: String,
}

/// DTO for resetting a forgotten password with a one-time code.
#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(equal = 6, message = "Verification code must be 6 digits."))]
    pub otp: String,
    #[validate(
        length(
            min = 6,
            max = 128,
            message = "Password must be between 6 and 128 characters."
        ),
        custom(function = validate_password_chars)
    )]
    pub new_password: String,
}

/// DTO for updating the caller's profile. All fields optional; the handler
/// rejects bodies that change nothing.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(max = 500, message = "Bio must be at most 500 characters."))]
    pub bio: Option<String>,
    #[validate(custom(function = validate_optional_url))]
    pub image_url: Option<String>,
}

/// DTO for changing the password while logged in.
#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, max = 128))]
    pub current_password: String,
    #[validate(
        length(
            min = 6,
            max = 128,
            message = "Password must be between 6 and 128 characters."
        ),
        custom(function = validate_password_chars)
    )]
    pub new_password: String,
}

/// DTO for confirming account deletion.
#[derive(Debug, Deserialize, Validate)]
pub struct DeleteAccountRequest {
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// Aggregated learning statistics for the current user.
#[derive(Debug, Serialize)]
pub struct UserStats {
    pub enrolled_courses: i64,
    pub active_courses: i64,
    pub completed_courses: i64,
    pub certificates_earned: i64,
    /// Sum of the durations of every completed lecture, in minutes.
    pub total_learning_minutes: f64,
}

/// Passwords may not contain whitespace anywhere (spaces, tabs, newlines).
pub fn validate_password_chars(password: &str) -> Result<(), validator::ValidationError> {
    if WHITESPACE_RE.is_match(password) {
        return Err(validator::ValidationError::new("password_contains_whitespace"));
    }
    Ok(())
}

fn validate_role(role: &str) -> Result<(), validator::ValidationError> {
    match role {
        "student" | "educator" => Ok(()),
        _ => Err(validator::ValidationError::new("invalid_role")),
    }
}

/// Accepts either an empty string (clears the field) or a parseable URL.
pub fn validate_optional_url(value: &str) -> Result<(), validator::ValidationError> {
    if value.is_empty() {
        return Ok(());
    }
    if url::Url::parse(value).is_err() {
        return Err(validator::ValidationError::new("invalid_url"));
    }
    Ok(())
}
