// src/handlers/enrollments.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use sqlx::{SqlitePool, types::Json as SqlJson};
use validator::Validate;

use crate::{
    error::{AppError, is_unique_violation},
    models::{
        course::contains_lecture,
        enrollment::{
            Enrollment, EnrolledCourse, ProgressSummary, RateCourseRequest,
            UpdateEnrollmentStatusRequest,
        },
    },
    services::notify::EmailKind,
    state::AppState,
    utils::{html::clean_html, jwt::Claims},
};

use super::courses::{fetch_course, fetch_owned_course};

/// Enrolls the calling student in a free course. Paid courses go through the
/// payment flow instead.
pub async fn enroll(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;
    let course = fetch_course(&state.pool, course_id).await?;

    if !course.is_published {
        return Err(AppError::NotFound("Course not found".to_string()));
    }

    if course.discounted_price() > 0.0 {
        return Err(AppError::BadRequest(
            "This course requires payment. Use the payment flow to enroll.".to_string(),
        ));
    }

    let now = Utc::now();
    let done = sqlx::query(
        "INSERT INTO enrollments \
         (student_id, course_id, enrolled_at, completed_lectures, last_accessed, \
          assignment_completed, certificate_earned, status) \
         VALUES (?, ?, ?, ?, ?, 0, 0, 'active')",
    )
    .bind(student_id)
    .bind(course_id)
    .bind(now)
    .bind(SqlJson(Vec::<String>::new()))
    .bind(now)
    .execute(&state.pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("You are already enrolled in this course".to_string())
        } else {
            tracing::error!("Failed to enroll: {:?}", e);
            AppError::InternalServerError(e.to_string())
        }
    })?;

    let enrollment = sqlx::query_as::<_, Enrollment>("SELECT * FROM enrollments WHERE id = ?")
        .bind(done.last_insert_rowid())
        .fetch_one(&state.pool)
        .await?;

    // Confirmation email is best effort, the address lookup included. The
    // enrollment stands either way.
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

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "enrollment": enrollment,
        })),
    ))
}

pub(crate) async fn student_email(
    pool: &SqlitePool,
    student_id: i64,
) -> Result<Option<String>, AppError> {
    let email = sqlx::query_scalar::<_, String>("SELECT email FROM users WHERE id = ?")
        .bind(student_id)
        .fetch_optional(pool)
        .await?;
    Ok(email)
}

/// The calling student's enrollments with their course snapshots and
/// per-course progress.
pub async fn my_enrollments(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;

    let rows: Vec<EnrolledCourse> = sqlx::query_as(
        "SELECT e.id AS enrollment_id, c.id AS course_id, c.title, c.thumbnail, \
                u.name AS educator_name, c.content, e.completed_lectures, \
                e.enrolled_at, e.last_accessed, e.assignment_completed, \
                e.certificate_earned, e.status, \
                (SELECT AVG(r.rating) FROM enrollments r WHERE r.course_id = c.id) \
                    AS average_rating \
         FROM enrollments e \
         JOIN courses c ON e.course_id = c.id \
         JOIN users u ON c.educator_id = u.id \
         WHERE e.student_id = ? \
         ORDER BY e.enrolled_at DESC",
    )
    .bind(student_id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list enrollments: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let courses: Vec<serde_json::Value> = rows
        .into_iter()
        .map(|row| {
            let progress = ProgressSummary::compute(&row.content, &row.completed_lectures);
            json!({
                "enrollment_id": row.enrollment_id,
                "course_id": row.course_id,
                "title": row.title,
                "thumbnail": row.thumbnail,
                "educator_name": row.educator_name,
                "enrolled_at": row.enrolled_at,
                "last_accessed": row.last_accessed,
                "assignment_completed": row.assignment_completed,
                "certificate_earned": row.certificate_earned,
                "status": row.status,
                "average_rating": row.average_rating,
                "progress": progress,
            })
        })
        .collect();

    Ok(Json(json!({
        "success": true,
        "courses": courses,
    })))
}

/// Marks one lecture of an enrolled course complete. Completing the same
/// lecture twice is reported, not an error.
pub async fn update_progress(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path((course_id, lecture_id)): Path<(i64, String)>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;
    let course = fetch_course(&pool, course_id).await?;

    let mut enrollment = sqlx::query_as::<_, Enrollment>(
        "SELECT * FROM enrollments WHERE student_id = ? AND course_id = ?",
    )
    .bind(student_id)
    .bind(course_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::Forbidden(
        "You are not enrolled in this course".to_string(),
    ))?;

    if !contains_lecture(&course.content, &lecture_id) {
        return Err(AppError::BadRequest(
            "Lecture does not belong to this course".to_string(),
        ));
    }

    let already_completed = enrollment.completed_lectures.contains(&lecture_id);

    if !already_completed {
        enrollment.completed_lectures.push(lecture_id);
    }

    sqlx::query(
        "UPDATE enrollments SET completed_lectures = ?, last_accessed = ? WHERE id = ?",
    )
    .bind(SqlJson(&enrollment.completed_lectures.0))
    .bind(Utc::now())
    .bind(enrollment.id)
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to update progress: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let progress = ProgressSummary::compute(&course.content, &enrollment.completed_lectures);

    Ok(Json(json!({
        "success": true,
        "already_completed": already_completed,
        "progress": progress,
    })))
}

/// Rates an enrolled course 1-5 with an optional review. Re-rating replaces
/// the previous rating.
pub async fn rate_course(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
    Json(payload): Json<RateCourseRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let student_id = claims.user_id()?;

    let review = payload.review.map(|r| clean_html(&r));

    let done = sqlx::query(
        "UPDATE enrollments SET rating = ?, review = ?, rated_at = ? \
         WHERE student_id = ? AND course_id = ?",
    )
    .bind(payload.rating)
    .bind(review)
    .bind(Utc::now())
    .bind(student_id)
    .bind(course_id)
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to rate course: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    if done.rows_affected() == 0 {
        return Err(AppError::Forbidden(
            "You must be enrolled in this course to rate it".to_string(),
        ));
    }

    let average_rating = sqlx::query_scalar::<_, Option<f64>>(
        "SELECT AVG(rating) FROM enrollments WHERE course_id = ?",
    )
    .bind(course_id)
    .fetch_one(&pool)
    .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Rating saved",
        "average_rating": average_rating,
    })))
}

/// Educator override of an enrollment's status on a course they own.
pub async fn update_enrollment_status(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(enrollment_id): Path<i64>,
    Json(payload): Json<UpdateEnrollmentStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let educator_id = claims.user_id()?;

    let enrollment = sqlx::query_as::<_, Enrollment>("SELECT * FROM enrollments WHERE id = ?")
        .bind(enrollment_id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Enrollment not found".to_string()))?;

    fetch_owned_course(&pool, enrollment.course_id, educator_id).await?;

    sqlx::query("UPDATE enrollments SET status = ? WHERE id = ?")
        .bind(&payload.status)
        .bind(enrollment_id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to update enrollment status: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(Json(json!({
        "success": true,
        "message": "Enrollment status updated",
    })))
}
