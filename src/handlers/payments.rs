// src/handlers/payments.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use sqlx::types::Json as SqlJson;

use crate::{
    error::{AppError, is_unique_violation},
    models::enrollment::Enrollment,
    services::{
        notify::EmailKind,
        payments::{PaymentError, verify_signature},
    },
    state::AppState,
    utils::jwt::Claims,
};

use super::{courses::fetch_course, enrollments::student_email};

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub course_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
    pub course_id: i64,
}

fn provider_error(e: PaymentError) -> AppError {
    match e {
        PaymentError::NotConfigured => {
            AppError::InternalServerError("Payment service not configured".to_string())
        }
        PaymentError::Provider(msg) => {
            tracing::error!("Payment provider call failed: {}", msg);
            AppError::InternalServerError(msg)
        }
    }
}

/// Creates a provider order for a paid course. The amount is the discounted
/// price converted to minor currency units.
pub async fn create_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;
    let course = fetch_course(&state.pool, payload.course_id).await?;

    if !course.is_published {
        return Err(AppError::NotFound("Course not found".to_string()));
    }

    let already_enrolled = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM enrollments WHERE student_id = ? AND course_id = ?",
    )
    .bind(student_id)
    .bind(course.id)
    .fetch_one(&state.pool)
    .await?;

    if already_enrolled > 0 {
        return Err(AppError::Conflict(
            "You are already enrolled in this course".to_string(),
        ));
    }

    let amount_minor = (course.discounted_price() * 100.0).round() as i64;
    if amount_minor == 0 {
        return Err(AppError::BadRequest(
            "This course is free. Use the enrollment endpoint instead.".to_string(),
        ));
    }

    let receipt = format!("course-{}-student-{}", course.id, student_id);
    let order = state
        .payments
        .create_order(amount_minor, &state.config.payment_currency, &receipt)
        .await
        .map_err(provider_error)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "order": order,
        })),
    ))
}

/// Confirms a payment by checking the provider's callback signature, then
/// enrolls the student. Re-verifying an already processed payment returns the
/// existing enrollment.
pub async fn verify_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<VerifyPaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;

    let key_secret = state
        .config
        .payment_key_secret
        .as_deref()
        .ok_or_else(|| {
            AppError::InternalServerError("Payment service not configured".to_string())
        })?;

    if !verify_signature(
        key_secret,
        &payload.order_id,
        &payload.payment_id,
        &payload.signature,
    ) {
        return Err(AppError::BadRequest(
            "Invalid payment signature".to_string(),
        ));
    }

    let course = fetch_course(&state.pool, payload.course_id).await?;

    let now = Utc::now();
    let insert = sqlx::query(
        "INSERT INTO enrollments \
         (student_id, course_id, enrolled_at, completed_lectures, last_accessed, \
          assignment_completed, certificate_earned, status) \
         VALUES (?, ?, ?, ?, ?, 0, 0, 'active')",
    )
    .bind(student_id)
    .bind(course.id)
    .bind(now)
    .bind(SqlJson(Vec::<String>::new()))
    .bind(now)
    .execute(&state.pool)
    .await;

    let enrollment_id = match insert {
        Ok(done) => done.last_insert_rowid(),
        // A retried verification for a payment we already processed.
        Err(e) if is_unique_violation(&e) => {
            sqlx::query_scalar::<_, i64>(
                "SELECT id FROM enrollments WHERE student_id = ? AND course_id = ?",
            )
            .bind(student_id)
            .bind(course.id)
            .fetch_one(&state.pool)
            .await?
        }
        Err(e) => {
            tracing::error!("Failed to enroll after payment: {:?}", e);
            return Err(AppError::InternalServerError(e.to_string()));
        }
    };

    let enrollment = sqlx::query_as::<_, Enrollment>("SELECT * FROM enrollments WHERE id = ?")
        .bind(enrollment_id)
        .fetch_one(&state.pool)
        .await?;

    match student_email(&state.pool, student_id).await {
        Ok(Some(email)) => {
            if let Err(e) = state
                .notifier
                .send(
                    EmailKind::Enrollment,
                    &email,
                    json!({ "course_title": course.title }),
                )
                .await
            {
                tracing::warn!("Enrollment email failed for {}: {:?}", email, e);
            }
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!("Email lookup failed for student {}: {:?}", student_id, e);
        }
    }

    Ok(Json(json!({
        "success": true,
        "enrollment": enrollment,
    })))
}

/// Proxies the provider's view of an order.
pub async fn order_status(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let order = state
        .payments
        .fetch_order(&order_id)
        .await
        .map_err(provider_error)?;

    Ok(Json(json!({
        "success": true,
        "order": order,
    })))
}
