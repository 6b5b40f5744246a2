// src/services/completion.rs
//
// Everything that happens when a student clears a course assignment: the
// eligibility gate in front of assignment access, and the pass cascade that
// flips enrollment flags and issues the certificate.

use chrono::{Months, Utc};
use rand::Rng;
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::{
    error::{AppError, is_unique_violation},
    models::{
        certificate::Certificate,
        course::{Course, total_lectures},
        enrollment::Enrollment,
    },
};

const CERT_NUMBER_ATTEMPTS: usize = 5;

/// Gate in front of every assignment read and submit: the student must hold
/// an enrollment for the course and must have completed all of its lectures.
pub async fn ensure_assignment_access(
    pool: &SqlitePool,
    student_id: i64,
    course: &Course,
) -> Result<Enrollment, AppError> {
    let enrollment = sqlx::query_as::<_, Enrollment>(
        "SELECT * FROM enrollments WHERE student_id = ? AND course_id = ?",
    )
    .bind(student_id)
    .bind(course.id)
    .fetch_optional(pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch enrollment for access gate: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?
    .ok_or_else(|| {
        AppError::Forbidden(
            "You must be enrolled in this course to access its assignments".to_string(),
        )
    })?;

    let total = total_lectures(&course.content);
    let completed = enrollment.completed_lectures.len();

    // Count comparison, not set containment: any `total` distinct completed
    // ids satisfy the gate, even if course edits retired some of them.
    if completed < total {
        return Err(AppError::Forbidden(format!(
            "Complete all lectures before taking the assignment. Progress: {}/{}",
            completed, total
        )));
    }

    Ok(enrollment)
}

/// Certificate numbers: CERT-<unix millis>-<6 random digits>.
pub fn generate_certificate_number() -> String {
    let millis = Utc::now().timestamp_millis();
    let random: u32 = rand::rng().random_range(0..1_000_000);
    format!("CERT-{}-{:06}", millis, random)
}

pub struct CascadeResult {
    pub certificate: Certificate,
    pub newly_issued: bool,
}

/// Applies the consequences of a passing submission inside the caller's
/// transaction: mark the assignment complete, issue (or reuse) the
/// certificate, then mark the enrollment completed.
///
/// Every step is idempotent, so the manual certificate endpoint can re-run
/// the cascade to repair an enrollment that a crash left half-updated.
pub async fn apply_pass_cascade(
    tx: &mut Transaction<'_, Sqlite>,
    student_id: i64,
    course_id: i64,
    assignment_id: i64,
    submission_id: i64,
    score: i64,
    percentage: i64,
) -> Result<CascadeResult, AppError> {
    // 1. The assignment requirement is met.
    sqlx::query(
        "UPDATE enrollments SET assignment_completed = 1 WHERE student_id = ? AND course_id = ?",
    )
    .bind(student_id)
    .bind(course_id)
    .execute(&mut **tx)
    .await?;

    // 2. Reuse the certificate if one was already issued for this pair.
    let existing = sqlx::query_as::<_, Certificate>(
        "SELECT * FROM certificates WHERE student_id = ? AND assignment_id = ?",
    )
    .bind(student_id)
    .bind(assignment_id)
    .fetch_optional(&mut **tx)
    .await?;

    let (certificate, newly_issued) = match existing {
        Some(cert) => (cert, false),
        None => {
            let cert = issue_certificate(
                tx,
                student_id,
                course_id,
                assignment_id,
                submission_id,
                score,
                percentage,
            )
            .await?;
            (cert, true)
        }
    };

    // 3. Completion flags. Runs in the reuse branch too, which is what makes
    //    this the recovery path for a crash between issuance and flags.
    sqlx::query(
        "UPDATE enrollments SET certificate_earned = 1, status = 'completed' \
         WHERE student_id = ? AND course_id = ?",
    )
    .bind(student_id)
    .bind(course_id)
    .execute(&mut **tx)
    .await?;

    Ok(CascadeResult {
        certificate,
        newly_issued,
    })
}

async fn issue_certificate(
    tx: &mut Transaction<'_, Sqlite>,
    student_id: i64,
    course_id: i64,
    assignment_id: i64,
    submission_id: i64,
    score: i64,
    percentage: i64,
) -> Result<Certificate, AppError> {
    let issued_at = Utc::now();
    let expires_at = issued_at
        .checked_add_months(Months::new(24))
        .ok_or_else(|| AppError::InternalServerError("certificate expiry overflow".to_string()))?;

    for _ in 0..CERT_NUMBER_ATTEMPTS {
        let certificate_number = generate_certificate_number();

        let result = sqlx::query(
            "INSERT INTO certificates \
             (student_id, course_id, assignment_id, submission_id, certificate_number, \
              score, percentage, issued_at, expires_at, is_active) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1)",
        )
        .bind(student_id)
        .bind(course_id)
        .bind(assignment_id)
        .bind(submission_id)
        .bind(&certificate_number)
        .bind(score)
        .bind(percentage)
        .bind(issued_at)
        .bind(expires_at)
        .execute(&mut **tx)
        .await;

        match result {
            Ok(done) => {
                return Ok(Certificate {
                    id: done.last_insert_rowid(),
                    student_id,
                    course_id,
                    assignment_id,
                    submission_id,
                    certificate_number,
                    score,
                    percentage,
                    issued_at,
                    expires_at,
                    is_active: true,
                });
            }
            Err(e) if is_unique_violation(&e) => {
                let collided_number = e
                    .as_database_error()
                    .map(|db| db.message().contains("certificate_number"))
                    .unwrap_or(false);

                if collided_number {
                    // Number collision: roll the dice again.
                    continue;
                }

                // (student, assignment) raced with another writer; their
                // certificate stands.
                let cert = sqlx::query_as::<_, Certificate>(
                    "SELECT * FROM certificates WHERE student_id = ? AND assignment_id = ?",
                )
                .bind(student_id)
                .bind(assignment_id)
                .fetch_one(&mut **tx)
                .await?;
                return Ok(cert);
            }
            Err(e) => {
                tracing::error!("Failed to insert certificate: {:?}", e);
                return Err(AppError::InternalServerError(e.to_string()));
            }
        }
    }

    Err(AppError::InternalServerError(
        "could not allocate a unique certificate number".to_string(),
    ))
}
