// src/handlers/auth.rs

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{Duration, Utc};
use serde_json::json;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    config::Config,
    error::{AppError, is_unique_violation},
    models::{
        otp::{self, OTP_TTL_MINUTES, PURPOSE_PASSWORD_RESET, PURPOSE_REGISTER},
        user::{
            CreateUserRequest, LoginRequest, ResetPasswordRequest, SendPasswordOtpRequest,
            SendRegistrationOtpRequest, User, VerifyOtpRequest,
        },
    },
    services::notify::EmailKind,
    state::AppState,
    utils::{
        hash::{hash_password, verify_password},
        jwt::{Claims, sign_jwt},
    },
};

/// Invalidates earlier live codes for the address, then stores and returns a
/// fresh one. The id comes back so a failed send can clean up after itself.
async fn create_otp(
    pool: &SqlitePool,
    email: &str,
    purpose: &str,
) -> Result<(i64, String), AppError> {
    sqlx::query("UPDATE otp_codes SET used = 1 WHERE email = ? AND purpose = ? AND used = 0")
        .bind(email)
        .bind(purpose)
        .execute(pool)
        .await?;

    let code = otp::generate_code();
    let now = Utc::now();
    let expires_at = now + Duration::minutes(OTP_TTL_MINUTES);

    let done = sqlx::query(
        "INSERT INTO otp_codes (email, code, purpose, expires_at, used, created_at) \
         VALUES (?, ?, ?, ?, 0, ?)",
    )
    .bind(email)
    .bind(&code)
    .bind(purpose)
    .bind(expires_at)
    .bind(now)
    .execute(pool)
    .await?;

    Ok((done.last_insert_rowid(), code))
}

/// A valid code is unused, unexpired and matches email+code+purpose.
async fn find_valid_otp(
    pool: &SqlitePool,
    email: &str,
    code: &str,
    purpose: &str,
) -> Result<Option<i64>, AppError> {
    let id = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM otp_codes \
         WHERE email = ? AND code = ? AND purpose = ? AND used = 0 AND expires_at > ? \
         ORDER BY id DESC LIMIT 1",
    )
    .bind(email)
    .bind(code)
    .bind(purpose)
    .bind(Utc::now())
    .fetch_optional(pool)
    .await?;

    Ok(id)
}

/// Spends a code: valid codes are marked used exactly once.
async fn consume_otp(
    pool: &SqlitePool,
    email: &str,
    code: &str,
    purpose: &str,
) -> Result<bool, AppError> {
    match find_valid_otp(pool, email, code, purpose).await? {
        Some(id) => {
            sqlx::query("UPDATE otp_codes SET used = 1 WHERE id = ?")
                .bind(id)
                .execute(pool)
                .await?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Step one of registration: prove ownership of the email address.
/// Fails outright when the code cannot be emailed, because registration
/// cannot proceed without it.
pub async fn send_registration_otp(
    State(state): State<AppState>,
    Json(payload): Json<SendRegistrationOtpRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let email = payload.email.to_lowercase();

    // 1. Refuse addresses that already have an account.
    let existing = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(&state.pool)
        .await?;

    if existing.is_some() {
        return Err(AppError::Conflict(
            "An account with this email already exists".to_string(),
        ));
    }

    // 2. Store a fresh code and email it.
    let (otp_id, code) = create_otp(&state.pool, &email, PURPOSE_REGISTER).await?;

    let send_result = state
        .notifier
        .send(
            EmailKind::RegistrationCode,
            &email,
            json!({
                "name": payload.name,
                "code": code,
                "ttl_minutes": OTP_TTL_MINUTES,
            }),
        )
        .await;

    if let Err(e) = send_result {
        tracing::error!("Failed to send registration code to {}: {}", email, e);
        // Do not leave an un-deliverable code lying around.
        let _ = sqlx::query("DELETE FROM otp_codes WHERE id = ?")
            .bind(otp_id)
            .execute(&state.pool)
            .await;
        return Err(AppError::InternalServerError(
            "Failed to send verification code".to_string(),
        ));
    }

    Ok(Json(json!({
        "success": true,
        "message": "Verification code sent to your email",
    })))
}

/// Checks a registration code without spending it, so signup forms can
/// advance before asking for the rest of the details. `register` consumes
/// the same code.
pub async fn verify_registration_otp(
    State(pool): State<SqlitePool>,
    Json(payload): Json<VerifyOtpRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let email = payload.email.to_lowercase();

    if find_valid_otp(&pool, &email, &payload.otp, PURPOSE_REGISTER)
        .await?
        .is_none()
    {
        return Err(AppError::BadRequest(
            "Invalid or expired verification code".to_string(),
        ));
    }

    Ok(Json(json!({
        "success": true,
        "message": "Verification code is valid",
    })))
}

/// Registers a new user. Requires the one-time code from
/// `send_registration_otp`; the account starts out email-verified because
/// the code proved ownership.
pub async fn register(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let email = payload.email.to_lowercase();

    // 1. The code is consumed even if the insert later fails; codes are
    //    cheap, replayable codes are not.
    if !consume_otp(&pool, &email, &payload.otp, PURPOSE_REGISTER).await? {
        return Err(AppError::BadRequest(
            "Invalid or expired verification code".to_string(),
        ));
    }

    // 2. Hash and insert.
    let hashed_password = hash_password(&payload.password).await?;
    let role = payload.role.as_deref().unwrap_or("student");
    let now = Utc::now();

    let done = sqlx::query(
        "INSERT INTO users (name, email, password, image_url, bio, role, is_email_verified, \
         created_at, updated_at) VALUES (?, ?, ?, '', '', ?, 1, ?, ?)",
    )
    .bind(&payload.name)
    .bind(&email)
    .bind(&hashed_password)
    .bind(role)
    .bind(now)
    .bind(now)
    .execute(&pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("An account with this email already exists".to_string())
        } else {
            tracing::error!("Failed to register user: {:?}", e);
            AppError::from(e)
        }
    })?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(done.last_insert_rowid())
        .fetch_one(&pool)
        .await?;

    let token = sign_jwt(user.id, &user.role, &config.jwt_secret, config.jwt_expiration)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "token": token,
            "user": user,
        })),
    ))
}

/// Authenticates a user and returns a JWT token.
pub async fn login(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let email = payload.email.to_lowercase();

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Login DB error: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    // Same message for unknown email and wrong password.
    let user = user.ok_or(AppError::AuthError("Invalid email or password".to_string()))?;

    let is_valid = verify_password(&payload.password, &user.password).await?;
    if !is_valid {
        return Err(AppError::AuthError("Invalid email or password".to_string()));
    }

    if !user.is_email_verified {
        return Err(AppError::Forbidden(
            "Please verify your email first".to_string(),
        ));
    }

    let token = sign_jwt(user.id, &user.role, &config.jwt_secret, config.jwt_expiration)?;

    Ok(Json(json!({
        "success": true,
        "token": token,
        "user": user,
    })))
}

/// Tokens are stateless; logout is an acknowledgment for clients that want
/// a round trip before discarding theirs.
pub async fn logout() -> impl IntoResponse {
    Json(json!({
        "success": true,
        "message": "Logged out",
    }))
}

/// The caller's own account.
pub async fn me(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    Ok(Json(json!({
        "success": true,
        "user": user,
    })))
}

/// Step one of password recovery: email a one-time code.
pub async fn send_password_otp(
    State(state): State<AppState>,
    Json(payload): Json<SendPasswordOtpRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let email = payload.email.to_lowercase();

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(AppError::NotFound(
            "No account found with this email".to_string(),
        ))?;

    let (otp_id, code) = create_otp(&state.pool, &email, PURPOSE_PASSWORD_RESET).await?;

    let send_result = state
        .notifier
        .send(
            EmailKind::PasswordResetCode,
            &email,
            json!({
                "name": user.name,
                "code": code,
                "ttl_minutes": OTP_TTL_MINUTES,
            }),
        )
        .await;

    if let Err(e) = send_result {
        tracing::error!("Failed to send password reset code to {}: {}", email, e);
        let _ = sqlx::query("DELETE FROM otp_codes WHERE id = ?")
            .bind(otp_id)
            .execute(&state.pool)
            .await;
        return Err(AppError::InternalServerError(
            "Failed to send verification code".to_string(),
        ));
    }

    Ok(Json(json!({
        "success": true,
        "message": "Verification code sent to your email",
    })))
}

/// Checks a password-reset code without spending it, so clients can gate
/// their reset form.
pub async fn verify_password_otp(
    State(pool): State<SqlitePool>,
    Json(payload): Json<VerifyOtpRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let email = payload.email.to_lowercase();

    if find_valid_otp(&pool, &email, &payload.otp, PURPOSE_PASSWORD_RESET)
        .await?
        .is_none()
    {
        return Err(AppError::BadRequest(
            "Invalid or expired verification code".to_string(),
        ));
    }

    Ok(Json(json!({
        "success": true,
        "message": "Verification code is valid",
    })))
}

/// Completes password recovery: spends the code and replaces the hash.
pub async fn reset_password(
    State(pool): State<SqlitePool>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let email = payload.email.to_lowercase();

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound(
            "No account found with this email".to_string(),
        ))?;

    if !consume_otp(&pool, &email, &payload.otp, PURPOSE_PASSWORD_RESET).await? {
        return Err(AppError::BadRequest(
            "Invalid or expired verification code".to_string(),
        ));
    }

    let hashed_password = hash_password(&payload.new_password).await?;

    sqlx::query("UPDATE users SET password = ?, updated_at = ? WHERE id = ?")
        .bind(&hashed_password)
        .bind(Utc::now())
        .bind(user.id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to update password: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(Json(json!({
        "success": true,
        "message": "Password reset successfully",
    })))
}
