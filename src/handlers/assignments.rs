// src/handlers/assignments.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use sqlx::{QueryBuilder, Sqlite, SqlitePool, types::Json as SqlJson};
use validator::Validate;

use crate::{
    error::{AppError, is_unique_violation},
    grading,
    models::{
        assignment::{
            Assignment, AssignmentViewQuery, CreateAssignmentRequest, StudentAssignment,
            UpdateAssignmentRequest, assign_question_ids,
        },
        submission::{Submission, SubmitAssignmentRequest},
    },
    services::{
        completion::{apply_pass_cascade, ensure_assignment_access},
        notify::EmailKind,
    },
    state::AppState,
    utils::{html::clean_html, jwt::Claims},
};

use super::{
    courses::{fetch_course, fetch_owned_course},
    enrollments::student_email,
};

async fn fetch_assignment(pool: &SqlitePool, assignment_id: i64) -> Result<Assignment, AppError> {
    sqlx::query_as::<_, Assignment>("SELECT * FROM assignments WHERE id = ?")
        .bind(assignment_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Assignment not found".to_string()))
}

/// Creates an assignment on a course the calling educator owns. Questions
/// without ids get server-assigned ones.
pub async fn create_assignment(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
    Json(payload): Json<CreateAssignmentRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let educator_id = claims.user_id()?;
    fetch_owned_course(&pool, course_id, educator_id).await?;

    let mut questions = payload.questions;
    assign_question_ids(&mut questions);

    let description = clean_html(payload.description.as_deref().unwrap_or(""));
    let now = Utc::now();

    let done = sqlx::query(
        "INSERT INTO assignments \
         (course_id, title, description, questions, passing_score, time_limit, is_active, \
          created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)",
    )
    .bind(course_id)
    .bind(&payload.title)
    .bind(&description)
    .bind(SqlJson(&questions))
    .bind(payload.passing_score.unwrap_or(70))
    .bind(payload.time_limit.unwrap_or(30))
    .bind(now)
    .bind(now)
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create assignment: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let assignment = fetch_assignment(&pool, done.last_insert_rowid()).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "assignment": assignment,
        })),
    ))
}

/// Assignments of a course. The owning educator sees everything; students
/// must clear the lecture gate and get only active assignments, stripped of
/// answers.
pub async fn list_assignments(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let course = fetch_course(&pool, course_id).await?;

    if claims.role == "educator" && course.educator_id == user_id {
        let assignments: Vec<Assignment> = sqlx::query_as(
            "SELECT * FROM assignments WHERE course_id = ? ORDER BY created_at DESC",
        )
        .bind(course_id)
        .fetch_all(&pool)
        .await?;

        return Ok(Json(json!({
            "success": true,
            "assignments": assignments,
        })));
    }

    ensure_assignment_access(&pool, user_id, &course).await?;

    let assignments: Vec<Assignment> = sqlx::query_as(
        "SELECT * FROM assignments WHERE course_id = ? AND is_active = 1 \
         ORDER BY created_at DESC",
    )
    .bind(course_id)
    .fetch_all(&pool)
    .await?;

    let views: Vec<StudentAssignment> = assignments
        .iter()
        .map(StudentAssignment::from_assignment)
        .collect();

    Ok(Json(json!({
        "success": true,
        "assignments": views,
    })))
}

/// A single assignment. The owning educator gets the full record, or the
/// student-facing preview with `?studentView=true`. Everyone else goes
/// through the lecture gate and always gets the stripped view.
pub async fn get_assignment(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(assignment_id): Path<i64>,
    Query(query): Query<AssignmentViewQuery>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let assignment = fetch_assignment(&pool, assignment_id).await?;
    let course = fetch_course(&pool, assignment.course_id).await?;

    if claims.role == "educator" && course.educator_id == user_id {
        if query.student_view.unwrap_or(false) {
            return Ok(Json(json!({
                "success": true,
                "assignment": StudentAssignment::from_assignment(&assignment),
            })));
        }
        return Ok(Json(json!({
            "success": true,
            "assignment": assignment,
        })));
    }

    if !assignment.is_active {
        return Err(AppError::NotFound("Assignment not found".to_string()));
    }

    ensure_assignment_access(&pool, user_id, &course).await?;

    let submission = sqlx::query_as::<_, Submission>(
        "SELECT * FROM submissions WHERE student_id = ? AND assignment_id = ?",
    )
    .bind(user_id)
    .bind(assignment_id)
    .fetch_optional(&pool)
    .await?;

    Ok(Json(json!({
        "success": true,
        "assignment": StudentAssignment::from_assignment(&assignment),
        "submission": submission,
    })))
}

/// Updates fields of an assignment on an owned course.
pub async fn update_assignment(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(assignment_id): Path<i64>,
    Json(payload): Json<UpdateAssignmentRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let educator_id = claims.user_id()?;
    let assignment = fetch_assignment(&pool, assignment_id).await?;
    fetch_owned_course(&pool, assignment.course_id, educator_id).await?;

    if payload.title.is_none()
        && payload.description.is_none()
        && payload.questions.is_none()
        && payload.passing_score.is_none()
        && payload.time_limit.is_none()
        && payload.is_active.is_none()
    {
        return Err(AppError::BadRequest(
            "No fields provided for update".to_string(),
        ));
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE assignments SET ");
    let mut separated = builder.separated(", ");

    if let Some(title) = payload.title {
        separated.push("title = ");
        separated.push_bind_unseparated(title);
    }

    if let Some(description) = payload.description {
        separated.push("description = ");
        separated.push_bind_unseparated(clean_html(&description));
    }

    if let Some(mut questions) = payload.questions {
        assign_question_ids(&mut questions);
        separated.push("questions = ");
        separated.push_bind_unseparated(SqlJson(questions));
    }

    if let Some(passing_score) = payload.passing_score {
        separated.push("passing_score = ");
        separated.push_bind_unseparated(passing_score);
    }

    if let Some(time_limit) = payload.time_limit {
        separated.push("time_limit = ");
        separated.push_bind_unseparated(time_limit);
    }

    if let Some(is_active) = payload.is_active {
        separated.push("is_active = ");
        separated.push_bind_unseparated(is_active);
    }

    separated.push("updated_at = ");
    separated.push_bind_unseparated(Utc::now());

    builder.push(" WHERE id = ");
    builder.push_bind(assignment_id);

    builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update assignment: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let assignment = fetch_assignment(&pool, assignment_id).await?;

    Ok(Json(json!({
        "success": true,
        "assignment": assignment,
    })))
}

/// Deletes an assignment and everything hanging off it.
pub async fn delete_assignment(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(assignment_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let educator_id = claims.user_id()?;
    let assignment = fetch_assignment(&pool, assignment_id).await?;
    fetch_owned_course(&pool, assignment.course_id, educator_id).await?;

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    sqlx::query("DELETE FROM certificates WHERE assignment_id = ?")
        .bind(assignment_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM submissions WHERE assignment_id = ?")
        .bind(assignment_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM assignments WHERE id = ?")
        .bind(assignment_id)
        .execute(&mut *tx)
        .await?;

    tx.commit()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    Ok(Json(json!({
        "success": true,
        "message": "Assignment deleted",
    })))
}

/// Grades a student's one attempt at an assignment.
///
/// The whole write path runs in a single transaction so a passing submission
/// and its cascade (enrollment flags, certificate) land together or not at
/// all. Emails go out after the commit and never fail the request.
pub async fn submit_assignment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(assignment_id): Path<i64>,
    Json(payload): Json<SubmitAssignmentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;

    if payload.time_taken < 0.0 {
        return Err(AppError::BadRequest(
            "timeTaken cannot be negative".to_string(),
        ));
    }

    // 1. The assignment must exist and be live. Inactive ones are invisible
    //    to students.
    let assignment = fetch_assignment(&state.pool, assignment_id).await?;
    if !assignment.is_active {
        return Err(AppError::NotFound("Assignment not found".to_string()));
    }
    let course = fetch_course(&state.pool, assignment.course_id).await?;

    // 2. Enrollment plus all lectures completed.
    ensure_assignment_access(&state.pool, student_id, &course).await?;

    // 3. One attempt only.
    let already_submitted = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM submissions WHERE student_id = ? AND assignment_id = ?",
    )
    .bind(student_id)
    .bind(assignment_id)
    .fetch_one(&state.pool)
    .await?;

    if already_submitted > 0 {
        return Err(AppError::Conflict(
            "You have already submitted this assignment".to_string(),
        ));
    }

    // 4. Grade outside the transaction; grading is pure.
    let outcome = grading::grade(&assignment.questions, &payload.answers, assignment.passing_score)?;

    let mut tx = state
        .pool
        .begin()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    let submitted_at = Utc::now();
    let insert = sqlx::query(
        "INSERT INTO submissions \
         (student_id, assignment_id, course_id, answers, score, total_points, percentage, \
          passed, time_taken, submitted_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(student_id)
    .bind(assignment_id)
    .bind(assignment.course_id)
    .bind(SqlJson(&outcome.answers))
    .bind(outcome.score)
    .bind(outcome.total_points)
    .bind(outcome.percentage)
    .bind(outcome.passed)
    .bind(payload.time_taken)
    .bind(submitted_at)
    .execute(&mut *tx)
    .await;

    let submission_id = match insert {
        Ok(done) => done.last_insert_rowid(),
        // Backstop for two concurrent submits racing past the check above.
        Err(e) if is_unique_violation(&e) => {
            return Err(AppError::Conflict(
                "You have already submitted this assignment".to_string(),
            ));
        }
        Err(e) => {
            tracing::error!("Failed to insert submission: {:?}", e);
            return Err(AppError::InternalServerError(e.to_string()));
        }
    };

    // 5. A pass flips the enrollment flags and issues the certificate in the
    //    same transaction.
    let cascade = if outcome.passed {
        Some(
            apply_pass_cascade(
                &mut tx,
                student_id,
                assignment.course_id,
                assignment_id,
                submission_id,
                outcome.score,
                outcome.percentage,
            )
            .await?,
        )
    } else {
        None
    };

    tx.commit()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    // 6. Result email, plus a completion email on a pass. Best effort from
    //    here on, the lookup included: the submission is already durable.
    match student_email(&state.pool, student_id).await {
        Ok(Some(email)) => {
            let result_data = json!({
                "course_title": course.title,
                "assignment_title": assignment.title,
                "score": outcome.score,
                "total_points": outcome.total_points,
                "percentage": outcome.percentage,
                "passed": outcome.passed,
            });
            if let Err(e) = state
                .notifier
                .send(EmailKind::AssessmentResult, &email, result_data)
                .await
            {
                tracing::warn!("Assessment result email failed for {}: {:?}", email, e);
            }

            if let Some(cascade) = &cascade {
                let completion_data = json!({
                    "course_title": course.title,
                    "certificate_number": cascade.certificate.certificate_number,
                });
                if let Err(e) = state
                    .notifier
                    .send(EmailKind::CourseCompletion, &email, completion_data)
                    .await
                {
                    tracing::warn!("Course completion email failed for {}: {:?}", email, e);
                }
            }
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!("Email lookup failed for student {}: {:?}", student_id, e);
        }
    }

    let certificate = cascade.as_ref().map(|c| &c.certificate);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "result": {
                "submission_id": submission_id,
                "score": outcome.score,
                "total_points": outcome.total_points,
                "percentage": outcome.percentage,
                "passed": outcome.passed,
                "answers": outcome.answers,
                "submitted_at": submitted_at,
            },
            "certificate": certificate,
        })),
    ))
}
