// src/handlers/dashboard.rs

use std::collections::{HashMap, HashSet};

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::{DateTime, Months, Utc};
use serde::Serialize;
use serde_json::json;
use sqlx::{SqlitePool, types::Json as SqlJson};

use crate::{
    error::AppError,
    models::{
        course::{discounted_price, total_lectures},
        enrollment::ProgressSummary,
    },
    utils::jwt::Claims,
};

use super::courses::fetch_owned_course;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
struct CourseStat {
    course_id: i64,
    title: String,
    price: f64,
    discount: i64,
    is_published: bool,
    enrolled_count: i64,
    average_rating: Option<f64>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
struct RecentEnrollment {
    student_name: String,
    student_email: String,
    course_title: String,
    enrolled_at: DateTime<Utc>,
}

/// Educator overview: headline totals, top courses, latest enrollments and a
/// six month enrollment trend, all scoped to the caller's courses.
pub async fn overview(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let educator_id = claims.user_id()?;

    let mut stats: Vec<CourseStat> = sqlx::query_as(
        "SELECT c.id AS course_id, c.title, c.price, c.discount, c.is_published, \
                COUNT(e.id) AS enrolled_count, AVG(e.rating) AS average_rating \
         FROM courses c \
         LEFT JOIN enrollments e ON e.course_id = c.id \
         WHERE c.educator_id = ? \
         GROUP BY c.id",
    )
    .bind(educator_id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to load dashboard stats: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let total_courses = stats.len();
    let total_enrollments: i64 = stats.iter().map(|s| s.enrolled_count).sum();
    let revenue: f64 = stats
        .iter()
        .map(|s| s.enrolled_count as f64 * discounted_price(s.price, s.discount))
        .sum();

    let unique_students = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(DISTINCT e.student_id) \
         FROM enrollments e JOIN courses c ON e.course_id = c.id \
         WHERE c.educator_id = ?",
    )
    .bind(educator_id)
    .fetch_one(&pool)
    .await?;

    stats.sort_by(|a, b| b.enrolled_count.cmp(&a.enrolled_count));
    stats.truncate(5);

    let recent: Vec<RecentEnrollment> = sqlx::query_as(
        "SELECT u.name AS student_name, u.email AS student_email, \
                c.title AS course_title, e.enrolled_at \
         FROM enrollments e \
         JOIN courses c ON e.course_id = c.id \
         JOIN users u ON e.student_id = u.id \
         WHERE c.educator_id = ? \
         ORDER BY e.enrolled_at DESC \
         LIMIT 10",
    )
    .bind(educator_id)
    .fetch_all(&pool)
    .await?;

    let monthly = monthly_enrollments(&pool, educator_id).await?;

    Ok(Json(json!({
        "success": true,
        "dashboard": {
            "total_courses": total_courses,
            "total_enrollments": total_enrollments,
            "total_revenue": (revenue * 100.0).round() / 100.0,
            "unique_students": unique_students,
            "top_courses": stats,
            "recent_enrollments": recent,
            "monthly_enrollments": monthly,
        },
    })))
}

/// Enrollment counts per calendar month for the last six months, oldest
/// first. Timestamps are grouped here rather than with SQL date functions, so
/// the bucketing matches the RFC 3339 values we store.
async fn monthly_enrollments(
    pool: &SqlitePool,
    educator_id: i64,
) -> Result<Vec<serde_json::Value>, AppError> {
    let now = Utc::now();
    // One month of slack so the oldest bucket is fully covered.
    let cutoff = now
        .checked_sub_months(Months::new(6))
        .ok_or_else(|| AppError::InternalServerError("date underflow".to_string()))?;

    let timestamps: Vec<DateTime<Utc>> = sqlx::query_scalar(
        "SELECT e.enrolled_at \
         FROM enrollments e JOIN courses c ON e.course_id = c.id \
         WHERE c.educator_id = ? AND e.enrolled_at >= ?",
    )
    .bind(educator_id)
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    let mut keys = Vec::with_capacity(6);
    for back in (0..6).rev() {
        let month = now
            .checked_sub_months(Months::new(back))
            .ok_or_else(|| AppError::InternalServerError("date underflow".to_string()))?;
        keys.push(month.format("%Y-%m").to_string());
    }

    let mut counts: HashMap<&str, i64> = keys.iter().map(|k| (k.as_str(), 0)).collect();
    for ts in &timestamps {
        let key = ts.format("%Y-%m").to_string();
        if let Some(count) = counts.get_mut(key.as_str()) {
            *count += 1;
        }
    }

    Ok(keys
        .iter()
        .map(|k| json!({ "month": k, "count": counts[k.as_str()] }))
        .collect())
}

#[derive(Debug, sqlx::FromRow)]
struct EnrollmentSlice {
    completed_lectures: SqlJson<Vec<String>>,
    rating: Option<i64>,
    status: String,
}

/// Per-course analytics for an owned course: completion funnel, per-chapter
/// completion and the rating histogram.
pub async fn course_analytics(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let educator_id = claims.user_id()?;
    let course = fetch_owned_course(&pool, course_id, educator_id).await?;

    let enrollments: Vec<EnrollmentSlice> = sqlx::query_as(
        "SELECT completed_lectures, rating, status FROM enrollments WHERE course_id = ?",
    )
    .bind(course_id)
    .fetch_all(&pool)
    .await?;

    let total = total_lectures(&course.content);
    let mut finished = 0usize;
    let mut in_progress = 0usize;
    let mut not_started = 0usize;
    let mut percentage_sum = 0.0f64;

    for enrollment in &enrollments {
        let done = enrollment.completed_lectures.len();
        if total > 0 {
            percentage_sum += done as f64 / total as f64 * 100.0;
        }
        if done == 0 {
            not_started += 1;
        } else if total > 0 && done >= total {
            finished += 1;
        } else {
            in_progress += 1;
        }
    }

    let average_completion = if enrollments.is_empty() {
        0.0
    } else {
        (percentage_sum / enrollments.len() as f64).round()
    };

    let chapters: Vec<serde_json::Value> = course
        .content
        .iter()
        .map(|chapter| {
            let ids: HashSet<&str> = chapter
                .chapter_content
                .iter()
                .map(|l| l.lecture_id.as_str())
                .collect();
            let completed_count = enrollments
                .iter()
                .filter(|e| {
                    !ids.is_empty()
                        && ids
                            .iter()
                            .all(|id| e.completed_lectures.iter().any(|done| done == id))
                })
                .count();
            json!({
                "chapter_id": chapter.chapter_id,
                "chapter_title": chapter.chapter_title,
                "lecture_count": ids.len(),
                "completed_count": completed_count,
            })
        })
        .collect();

    let mut rating_breakdown = [0i64; 5];
    for enrollment in &enrollments {
        if let Some(rating) = enrollment.rating {
            if (1..=5).contains(&rating) {
                rating_breakdown[(rating - 1) as usize] += 1;
            }
        }
    }

    let status_counts = enrollments.iter().fold(HashMap::new(), |mut acc, e| {
        *acc.entry(e.status.as_str()).or_insert(0i64) += 1;
        acc
    });

    Ok(Json(json!({
        "success": true,
        "analytics": {
            "course_id": course.id,
            "title": course.title,
            "enrolled_count": enrollments.len(),
            "average_completion": average_completion,
            "finished": finished,
            "in_progress": in_progress,
            "not_started": not_started,
            "chapters": chapters,
            "rating_breakdown": {
                "1": rating_breakdown[0],
                "2": rating_breakdown[1],
                "3": rating_breakdown[2],
                "4": rating_breakdown[3],
                "5": rating_breakdown[4],
            },
            "status_counts": status_counts,
        },
    })))
}

#[derive(Debug, sqlx::FromRow)]
struct RosterRow {
    student_id: i64,
    name: String,
    email: String,
    image_url: String,
    enrolled_at: DateTime<Utc>,
    completed_lectures: SqlJson<Vec<String>>,
    status: String,
}

/// Enrolled-student roster for an owned course, with per-student progress.
pub async fn course_students(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let educator_id = claims.user_id()?;
    let course = fetch_owned_course(&pool, course_id, educator_id).await?;

    let rows: Vec<RosterRow> = sqlx::query_as(
        "SELECT u.id AS student_id, u.name, u.email, u.image_url, \
                e.enrolled_at, e.completed_lectures, e.status \
         FROM enrollments e JOIN users u ON e.student_id = u.id \
         WHERE e.course_id = ? \
         ORDER BY e.enrolled_at DESC",
    )
    .bind(course_id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to load course roster: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let students: Vec<serde_json::Value> = rows
        .iter()
        .map(|row| {
            let progress = ProgressSummary::compute(&course.content, &row.completed_lectures);
            json!({
                "student_id": row.student_id,
                "name": row.name,
                "email": row.email,
                "image_url": row.image_url,
                "enrolled_at": row.enrolled_at,
                "status": row.status,
                "progress": progress,
            })
        })
        .collect();

    Ok(Json(json!({
        "success": true,
        "students": students,
    })))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
struct EnrolledStudentRow {
    enrollment_id: i64,
    student_id: i64,
    student_name: String,
    student_email: String,
    student_image_url: String,
    course_id: i64,
    course_title: String,
    enrolled_at: DateTime<Utc>,
    status: String,
    assignment_completed: bool,
    certificate_earned: bool,
}

/// Every enrollment across the caller's courses, newest first. Rows carry
/// the enrollment id so clients can drive the status override directly.
pub async fn enrolled_students(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let educator_id = claims.user_id()?;

    let rows: Vec<EnrolledStudentRow> = sqlx::query_as(
        "SELECT e.id AS enrollment_id, u.id AS student_id, u.name AS student_name, \
                u.email AS student_email, u.image_url AS student_image_url, \
                c.id AS course_id, c.title AS course_title, \
                e.enrolled_at, e.status, e.assignment_completed, e.certificate_earned \
         FROM enrollments e \
         JOIN courses c ON e.course_id = c.id \
         JOIN users u ON e.student_id = u.id \
         WHERE c.educator_id = ? \
         ORDER BY e.enrolled_at DESC",
    )
    .bind(educator_id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to load enrolled students: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(json!({
        "success": true,
        "students": rows,
    })))
}
