// src/handlers/courses.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use sqlx::{QueryBuilder, Sqlite, SqlitePool, types::Json as SqlJson};
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    models::{
        course::{
            Course, CourseListParams, CourseSummary, CreateCourseRequest, RatingEntry,
            UpdateCourseRequest, strip_locked_lectures, total_lectures,
        },
        enrollment::{Enrollment, ProgressSummary},
    },
    utils::{
        html::clean_html,
        jwt::{Claims, bearer_claims},
    },
};

/// Shared lookup: 404 when the id does not exist.
pub(crate) async fn fetch_course(pool: &SqlitePool, course_id: i64) -> Result<Course, AppError> {
    sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = ?")
        .bind(course_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Course not found".to_string()))
}

/// Shared lookup with ownership: educators may only touch their own courses.
pub(crate) async fn fetch_owned_course(
    pool: &SqlitePool,
    course_id: i64,
    educator_id: i64,
) -> Result<Course, AppError> {
    let course = fetch_course(pool, course_id).await?;
    if course.educator_id != educator_id {
        return Err(AppError::Forbidden(
            "You do not own this course".to_string(),
        ));
    }
    Ok(course)
}

/// Creates a course owned by the calling educator. Unpublished by default.
pub async fn create_course(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateCourseRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let educator_id = claims.user_id()?;
    let description = clean_html(payload.description.as_deref().unwrap_or(""));
    let now = Utc::now();

    let done = sqlx::query(
        "INSERT INTO courses \
         (title, description, price, discount, thumbnail, content, educator_id, is_published, \
          created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&payload.title)
    .bind(&description)
    .bind(payload.price)
    .bind(payload.discount.unwrap_or(0))
    .bind(payload.thumbnail.as_deref().unwrap_or(""))
    .bind(SqlJson(&payload.content))
    .bind(educator_id)
    .bind(payload.is_published.unwrap_or(false))
    .bind(now)
    .bind(now)
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create course: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let course = fetch_course(&pool, done.last_insert_rowid()).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "course": course,
        })),
    ))
}

/// Public catalog: published courses with educator names and
/// enrollment/rating aggregates, searchable by title, paginated.
pub async fn list_courses(
    State(pool): State<SqlitePool>,
    Query(params): Query<CourseListParams>,
) -> Result<impl IntoResponse, AppError> {
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    let offset = (page - 1) * limit;

    let search_pattern = params.search.map(|k| format!("%{}%", k));

    let courses: Vec<CourseSummary> = sqlx::query_as(
        "SELECT c.id, c.title, c.description, c.price, c.discount, c.thumbnail, \
                c.educator_id, u.name AS educator_name, \
                COUNT(e.id) AS enrolled_count, AVG(e.rating) AS average_rating, \
                c.created_at \
         FROM courses c \
         JOIN users u ON c.educator_id = u.id \
         LEFT JOIN enrollments e ON e.course_id = c.id \
         WHERE c.is_published = 1 AND (? IS NULL OR c.title LIKE ?) \
         GROUP BY c.id \
         ORDER BY c.created_at DESC \
         LIMIT ? OFFSET ?",
    )
    .bind(search_pattern.clone())
    .bind(search_pattern.clone())
    .bind(limit)
    .bind(offset)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list courses: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM courses WHERE is_published = 1 AND (? IS NULL OR title LIKE ?)",
    )
    .bind(search_pattern.clone())
    .bind(search_pattern)
    .fetch_one(&pool)
    .await?;

    Ok(Json(json!({
        "success": true,
        "courses": courses,
        "page": page,
        "limit": limit,
        "total": total,
    })))
}

/// A single course. Anonymous viewers and non-enrolled students get the
/// content tree with non-preview lecture URLs blanked; enrolled students and
/// the owning educator see everything plus their own context.
pub async fn get_course(
    State(pool): State<SqlitePool>,
    State(config): State<Config>,
    headers: HeaderMap,
    Path(course_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut course = fetch_course(&pool, course_id).await?;

    let claims = bearer_claims(&headers, &config.jwt_secret);
    let viewer_id = match &claims {
        Some(c) => Some(c.user_id()?),
        None => None,
    };
    let is_owner = viewer_id == Some(course.educator_id);

    // Unpublished courses exist only for their owner.
    if !course.is_published && !is_owner {
        return Err(AppError::NotFound("Course not found".to_string()));
    }

    let educator = sqlx::query_as::<_, EducatorInfo>(
        "SELECT id, name, image_url, bio FROM users WHERE id = ?",
    )
    .bind(course.educator_id)
    .fetch_one(&pool)
    .await?;

    let ratings: Vec<RatingEntry> = sqlx::query_as(
        "SELECT e.student_id, u.name AS student_name, u.image_url AS student_image_url, \
                e.rating, e.review, e.rated_at \
         FROM enrollments e JOIN users u ON e.student_id = u.id \
         WHERE e.course_id = ? AND e.rating IS NOT NULL \
         ORDER BY e.rated_at DESC",
    )
    .bind(course_id)
    .fetch_all(&pool)
    .await?;

    let enrolled_count =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM enrollments WHERE course_id = ?")
            .bind(course_id)
            .fetch_one(&pool)
            .await?;

    let enrollment = match viewer_id {
        Some(student_id) => {
            sqlx::query_as::<_, Enrollment>(
                "SELECT * FROM enrollments WHERE student_id = ? AND course_id = ?",
            )
            .bind(student_id)
            .bind(course_id)
            .fetch_optional(&pool)
            .await?
        }
        None => None,
    };

    let viewer = enrollment.as_ref().map(|e| {
        let progress = ProgressSummary::compute(&course.content, &e.completed_lectures);
        let can_access_assignments =
            progress.completed_lectures >= total_lectures(&course.content);
        json!({
            "enrolled": true,
            "status": e.status,
            "progress": progress,
            "assignment_completed": e.assignment_completed,
            "certificate_earned": e.certificate_earned,
            "can_access_assignments": can_access_assignments,
        })
    });

    if enrollment.is_none() && !is_owner {
        strip_locked_lectures(&mut course.content);
    }

    Ok(Json(json!({
        "success": true,
        "course": course,
        "educator": educator,
        "ratings": ratings,
        "enrolled_count": enrolled_count,
        "viewer": viewer,
    })))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
struct EducatorInfo {
    id: i64,
    name: String,
    image_url: String,
    bio: String,
}

/// Updates fields of an owned course.
pub async fn update_course(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
    Json(payload): Json<UpdateCourseRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let educator_id = claims.user_id()?;
    fetch_owned_course(&pool, course_id, educator_id).await?;

    if payload.title.is_none()
        && payload.description.is_none()
        && payload.price.is_none()
        && payload.discount.is_none()
        && payload.thumbnail.is_none()
        && payload.content.is_none()
        && payload.is_published.is_none()
    {
        return Err(AppError::BadRequest(
            "No fields provided for update".to_string(),
        ));
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE courses SET ");
    let mut separated = builder.separated(", ");

    if let Some(title) = payload.title {
        separated.push("title = ");
        separated.push_bind_unseparated(title);
    }

    if let Some(description) = payload.description {
        separated.push("description = ");
        separated.push_bind_unseparated(clean_html(&description));
    }

    if let Some(price) = payload.price {
        separated.push("price = ");
        separated.push_bind_unseparated(price);
    }

    if let Some(discount) = payload.discount {
        separated.push("discount = ");
        separated.push_bind_unseparated(discount);
    }

    if let Some(thumbnail) = payload.thumbnail {
        separated.push("thumbnail = ");
        separated.push_bind_unseparated(thumbnail);
    }

    if let Some(content) = payload.content {
        separated.push("content = ");
        separated.push_bind_unseparated(SqlJson(content));
    }

    if let Some(is_published) = payload.is_published {
        separated.push("is_published = ");
        separated.push_bind_unseparated(is_published);
    }

    separated.push("updated_at = ");
    separated.push_bind_unseparated(Utc::now());

    builder.push(" WHERE id = ");
    builder.push_bind(course_id);

    builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update course: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let course = fetch_course(&pool, course_id).await?;

    Ok(Json(json!({
        "success": true,
        "course": course,
    })))
}

/// Deletes an owned course and its assignments. Refused while students are
/// enrolled; cancel or complete those enrollments first.
pub async fn delete_course(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let educator_id = claims.user_id()?;
    fetch_owned_course(&pool, course_id, educator_id).await?;

    let enrolled =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM enrollments WHERE course_id = ?")
            .bind(course_id)
            .fetch_one(&pool)
            .await?;

    if enrolled > 0 {
        return Err(AppError::Conflict(
            "Cannot delete a course with enrolled students".to_string(),
        ));
    }

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    sqlx::query("DELETE FROM certificates WHERE course_id = ?")
        .bind(course_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM submissions WHERE course_id = ?")
        .bind(course_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM assignments WHERE course_id = ?")
        .bind(course_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM courses WHERE id = ?")
        .bind(course_id)
        .execute(&mut *tx)
        .await?;

    tx.commit()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    Ok(Json(json!({
        "success": true,
        "message": "Course deleted",
    })))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
struct EducatorCourse {
    id: i64,
    title: String,
    price: f64,
    discount: i64,
    thumbnail: String,
    is_published: bool,
    enrolled_count: i64,
    average_rating: Option<f64>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

/// The calling educator's own courses, published or not, with enrollment
/// counts.
pub async fn my_courses(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let educator_id = claims.user_id()?;

    let courses: Vec<EducatorCourse> = sqlx::query_as(
        "SELECT c.id, c.title, c.price, c.discount, c.thumbnail, c.is_published, \
                COUNT(e.id) AS enrolled_count, AVG(e.rating) AS average_rating, \
                c.created_at, c.updated_at \
         FROM courses c \
         LEFT JOIN enrollments e ON e.course_id = c.id \
         WHERE c.educator_id = ? \
         GROUP BY c.id \
         ORDER BY c.created_at DESC",
    )
    .bind(educator_id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list educator courses: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(json!({
        "success": true,
        "courses": courses,
    })))
}
