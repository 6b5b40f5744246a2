// src/handlers/users.rs

use axum::{Extension, Json, extract::State, response::IntoResponse};
use chrono::Utc;
use serde_json::json;
use sqlx::{QueryBuilder, Sqlite, SqlitePool, types::Json as SqlJson};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        course::{Chapter, completed_minutes},
        user::{
            ChangePasswordRequest, DeleteAccountRequest, UpdateProfileRequest, User, UserStats,
        },
    },
    utils::{
        hash::{hash_password, verify_password},
        html::clean_html,
        jwt::Claims,
    },
};

/// Get the current user's profile.
pub async fn get_profile(
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

/// Update name, bio and/or avatar URL. Bodies that change nothing are
/// rejected so clients notice broken forms.
pub async fn update_profile(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let user_id = claims.user_id()?;

    if payload.name.is_none() && payload.bio.is_none() && payload.image_url.is_none() {
        return Err(AppError::BadRequest(
            "No fields provided for update".to_string(),
        ));
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE users SET ");
    let mut separated = builder.separated(", ");

    if let Some(name) = payload.name {
        separated.push("name = ");
        separated.push_bind_unseparated(name);
    }

    if let Some(bio) = payload.bio {
        separated.push("bio = ");
        separated.push_bind_unseparated(clean_html(&bio));
    }

    if let Some(image_url) = payload.image_url {
        separated.push("image_url = ");
        separated.push_bind_unseparated(image_url);
    }

    separated.push("updated_at = ");
    separated.push_bind_unseparated(Utc::now());

    builder.push(" WHERE id = ");
    builder.push_bind(user_id);

    let result = builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update profile: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_one(&pool)
        .await?;

    Ok(Json(json!({
        "success": true,
        "user": user,
    })))
}

/// Change the password while logged in; requires the current one.
pub async fn change_password(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let user_id = claims.user_id()?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    if !verify_password(&payload.current_password, &user.password).await? {
        return Err(AppError::AuthError(
            "Current password is incorrect".to_string(),
        ));
    }

    let hashed_password = hash_password(&payload.new_password).await?;

    sqlx::query("UPDATE users SET password = ?, updated_at = ? WHERE id = ?")
        .bind(&hashed_password)
        .bind(Utc::now())
        .bind(user_id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to change password: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(Json(json!({
        "success": true,
        "message": "Password changed successfully",
    })))
}

/// Delete the account and everything it owns as a student. Educators must
/// remove their courses first; those have other people's data hanging off
/// them.
pub async fn delete_account(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<DeleteAccountRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let user_id = claims.user_id()?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    if !verify_password(&payload.password, &user.password).await? {
        return Err(AppError::AuthError("Password is incorrect".to_string()));
    }

    let course_count =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM courses WHERE educator_id = ?")
            .bind(user_id)
            .fetch_one(&pool)
            .await?;

    if course_count > 0 {
        return Err(AppError::Conflict(
            "Delete your courses before deleting the account".to_string(),
        ));
    }

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    // Children first: certificates and submissions reference the user, as do
    // enrollments and codes.
    sqlx::query("DELETE FROM certificates WHERE student_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM submissions WHERE student_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM enrollments WHERE student_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM otp_codes WHERE email = ?")
        .bind(&user.email)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    Ok(Json(json!({
        "success": true,
        "message": "Account deleted",
    })))
}

#[derive(sqlx::FromRow)]
struct StatsRow {
    content: SqlJson<Vec<Chapter>>,
    completed_lectures: SqlJson<Vec<String>>,
    status: String,
}

/// Learning statistics for the current user: enrollment counts by status,
/// certificates, and total watched minutes resolved against each course's
/// current content.
pub async fn get_stats(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let rows: Vec<StatsRow> = sqlx::query_as(
        "SELECT c.content, e.completed_lectures, e.status \
         FROM enrollments e JOIN courses c ON e.course_id = c.id \
         WHERE e.student_id = ?",
    )
    .bind(user_id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch enrollment stats: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let certificates_earned =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM certificates WHERE student_id = ?")
            .bind(user_id)
            .fetch_one(&pool)
            .await?;

    let mut stats = UserStats {
        enrolled_courses: rows.len() as i64,
        active_courses: 0,
        completed_courses: 0,
        certificates_earned,
        total_learning_minutes: 0.0,
    };

    for row in &rows {
        match row.status.as_str() {
            "completed" => stats.completed_courses += 1,
            "cancelled" => {}
            _ => stats.active_courses += 1,
        }
        stats.total_learning_minutes += completed_minutes(&row.content, &row.completed_lectures);
    }

    Ok(Json(json!({
        "success": true,
        "stats": stats,
    })))
}
