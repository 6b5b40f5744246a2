// src/handlers/certificates.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    models::{certificate::CertificateView, submission::Submission},
    services::completion::apply_pass_cascade,
    utils::jwt::Claims,
};

/// Manual certificate issuance for a passed assignment.
///
/// Normally the submit flow issues the certificate itself; this endpoint
/// exists for the student whose submission committed but whose cascade never
/// ran. Re-running on a fully processed pass just returns the existing
/// certificate and re-asserts the enrollment flags.
pub async fn issue_certificate(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(assignment_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;

    let submission = sqlx::query_as::<_, Submission>(
        "SELECT * FROM submissions WHERE student_id = ? AND assignment_id = ?",
    )
    .bind(student_id)
    .bind(assignment_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound(
        "Assignment submission not found".to_string(),
    ))?;

    if !submission.passed {
        return Err(AppError::BadRequest(
            "You must pass the assignment to earn a certificate".to_string(),
        ));
    }

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    let cascade = apply_pass_cascade(
        &mut tx,
        student_id,
        submission.course_id,
        assignment_id,
        submission.id,
        submission.score,
        submission.percentage,
    )
    .await?;

    tx.commit()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    let status = if cascade.newly_issued {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((
        status,
        Json(json!({
            "success": true,
            "certificate": cascade.certificate,
        })),
    ))
}

/// The calling student's certificates, newest first.
pub async fn my_certificates(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;

    let certificates: Vec<CertificateView> = sqlx::query_as(
        "SELECT cert.id, cert.certificate_number, cert.course_id, c.title AS course_title, \
                cert.assignment_id, a.title AS assignment_title, cert.score, cert.percentage, \
                cert.issued_at, cert.expires_at, cert.is_active \
         FROM certificates cert \
         JOIN courses c ON cert.course_id = c.id \
         JOIN assignments a ON cert.assignment_id = a.id \
         WHERE cert.student_id = ? \
         ORDER BY cert.issued_at DESC",
    )
    .bind(student_id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list certificates: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(json!({
        "success": true,
        "certificates": certificates,
    })))
}
