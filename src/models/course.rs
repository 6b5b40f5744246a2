// src/models/course.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use url::Url;
use validator::Validate;

/// One lecture inside a chapter. Lecture ids are opaque strings chosen by the
/// authoring client, unique within their course and never reused; progress
/// tracking references them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lecture {
    pub lecture_id: String,
    pub lecture_title: String,
    /// Duration in minutes.
    pub lecture_duration: f64,
    pub lecture_url: String,
    #[serde(default)]
    pub is_preview_free: bool,
    pub lecture_order: i64,
}

/// One chapter of course content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub chapter_id: String,
    pub chapter_title: String,
    pub chapter_order: i64,
    #[serde(default)]
    pub chapter_content: Vec<Lecture>,
}

/// Represents the 'courses' table in the database.
///
/// Courses carry no student roster; enrollment questions are answered from
/// the enrollments table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,

    pub title: String,

    /// Sanitized rich text.
    pub description: String,

    pub price: f64,

    /// Percentage discount, 0-100.
    pub discount: i64,

    /// Thumbnail URL, possibly empty.
    pub thumbnail: String,

    /// Chapter/lecture tree, stored as a JSON array.
    pub content: Json<Vec<Chapter>>,

    pub educator_id: i64,

    pub is_published: bool,

    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Course {
    /// Effective price after the percentage discount.
    pub fn discounted_price(&self) -> f64 {
        discounted_price(self.price, self.discount)
    }
}

/// Effective price after a percentage discount.
pub fn discounted_price(price: f64, discount: i64) -> f64 {
    price * (100 - discount) as f64 / 100.0
}

/// DTO for creating a course.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCourseRequest {
    #[validate(length(
        min = 1,
        max = 200,
        message = "Title must be between 1 and 200 characters."
    ))]
    pub title: String,
    #[validate(length(max = 20000))]
    pub description: Option<String>,
    #[validate(range(min = 0.0, message = "Price cannot be negative."))]
    pub price: f64,
    #[validate(range(min = 0, max = 100, message = "Discount must be between 0 and 100."))]
    pub discount: Option<i64>,
    #[validate(custom(function = validate_thumbnail))]
    pub thumbnail: Option<String>,
    #[serde(default)]
    #[validate(custom(function = validate_content))]
    pub content: Vec<Chapter>,
    pub is_published: Option<bool>,
}

/// DTO for partially updating a course. Absent fields are left untouched.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCourseRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 20000))]
    pub description: Option<String>,
    #[validate(range(min = 0.0))]
    pub price: Option<f64>,
    #[validate(range(min = 0, max = 100))]
    pub discount: Option<i64>,
    #[validate(custom(function = validate_thumbnail))]
    pub thumbnail: Option<String>,
    #[validate(custom(function = validate_content))]
    pub content: Option<Vec<Chapter>>,
    pub is_published: Option<bool>,
}

/// Query parameters for the public catalog listing.
#[derive(Debug, Deserialize)]
pub struct CourseListParams {
    pub search: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Catalog row: course joined with its educator plus enrollment/rating
/// aggregates from the enrollments table.
#[derive(Debug, Serialize, FromRow)]
pub struct CourseSummary {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub discount: i64,
    pub thumbnail: String,
    pub educator_id: i64,
    pub educator_name: String,
    pub enrolled_count: i64,
    pub average_rating: Option<f64>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// One rating with its author, read off an enrollment row.
#[derive(Debug, Serialize, FromRow)]
pub struct RatingEntry {
    pub student_id: i64,
    pub student_name: String,
    pub student_image_url: String,
    pub rating: i64,
    pub review: Option<String>,
    pub rated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Total number of lectures across all chapters. Assignment eligibility
/// compares completed-lecture counts against this.
pub fn total_lectures(chapters: &[Chapter]) -> usize {
    chapters.iter().map(|c| c.chapter_content.len()).sum()
}

/// Whether a lecture id exists anywhere in the content tree.
pub fn contains_lecture(chapters: &[Chapter], lecture_id: &str) -> bool {
    chapters
        .iter()
        .flat_map(|c| c.chapter_content.iter())
        .any(|l| l.lecture_id == lecture_id)
}

/// Sum of durations (minutes) of the listed lectures. Ids that no longer
/// exist in the content contribute nothing.
pub fn completed_minutes(chapters: &[Chapter], completed_ids: &[String]) -> f64 {
    chapters
        .iter()
        .flat_map(|c| c.chapter_content.iter())
        .filter(|l| completed_ids.iter().any(|id| id == &l.lecture_id))
        .map(|l| l.lecture_duration)
        .sum()
}

/// Blanks the media URL of every lecture that is not a free preview. Applied
/// before returning course content to viewers without an enrollment.
pub fn strip_locked_lectures(chapters: &mut [Chapter]) {
    for chapter in chapters.iter_mut() {
        for lecture in chapter.chapter_content.iter_mut() {
            if !lecture.is_preview_free {
                lecture.lecture_url = String::new();
            }
        }
    }
}

fn validate_thumbnail(value: &str) -> Result<(), validator::ValidationError> {
    if value.is_empty() {
        return Ok(());
    }
    if Url::parse(value).is_err() {
        return Err(validator::ValidationError::new("invalid_url"));
    }
    Ok(())
}

/// Structural checks on the chapter/lecture tree: ids present and unique,
/// titles present, lecture URLs parse as http(s), durations non-negative.
fn validate_content(chapters: &[Chapter]) -> Result<(), validator::ValidationError> {
    let mut chapter_ids = std::collections::HashSet::new();
    let mut lecture_ids = std::collections::HashSet::new();

    for chapter in chapters {
        if chapter.chapter_id.is_empty() || chapter.chapter_title.is_empty() {
            return Err(validator::ValidationError::new("chapter_missing_fields"));
        }
        if !chapter_ids.insert(chapter.chapter_id.as_str()) {
            return Err(validator::ValidationError::new("duplicate_chapter_id"));
        }
        for lecture in &chapter.chapter_content {
            if lecture.lecture_id.is_empty() || lecture.lecture_title.is_empty() {
                return Err(validator::ValidationError::new("lecture_missing_fields"));
            }
            if !lecture_ids.insert(lecture.lecture_id.as_str()) {
                return Err(validator::ValidationError::new("duplicate_lecture_id"));
            }
            if !lecture.lecture_duration.is_finite() || lecture.lecture_duration < 0.0 {
                return Err(validator::ValidationError::new("invalid_lecture_duration"));
            }
            match Url::parse(&lecture.lecture_url) {
                Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
                _ => return Err(validator::ValidationError::new("invalid_lecture_url")),
            }
        }
    }
    Ok(())
}
