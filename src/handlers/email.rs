// src/handlers/email.rs

use axum::{Extension, Json, extract::State, response::IntoResponse};
use serde_json::json;

use crate::{
    error::AppError, services::notify::EmailKind, state::AppState, utils::jwt::Claims,
};

/// Whether outbound email is configured at all. Public so the frontend can
/// hide email-dependent flows when the relay is absent.
pub async fn email_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "success": true,
        "configured": state.notifier.is_configured(),
    }))
}

/// Sends a probe email to the calling educator and reports whether the relay
/// accepted it.
pub async fn send_test_email(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let email = sqlx::query_scalar::<_, String>("SELECT email FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    state
        .notifier
        .send(
            EmailKind::Probe,
            &email,
            json!({ "requested_at": chrono::Utc::now() }),
        )
        .await
        .map_err(|e| {
            tracing::error!("Test email to {} failed: {:?}", email, e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(Json(json!({
        "success": true,
        "message": format!("Test email sent to {}", email),
    })))
}
