// src/models/enrollment.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

use super::course::{Chapter, total_lectures};

/// Represents the 'enrollments' table: the single source of truth for who is
/// enrolled in what, plus per-course progress and the student's rating.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: i64,

    pub student_id: i64,

    pub course_id: i64,

    pub enrolled_at: chrono::DateTime<chrono::Utc>,

    /// Lecture ids marked complete. Set semantics: adding an id twice is a
    /// no-op.
    pub completed_lectures: Json<Vec<String>>,

    pub last_accessed: chrono::DateTime<chrono::Utc>,

    /// Set when a passing assignment submission lands.
    pub assignment_completed: bool,

    /// Set when a certificate is issued for this course's assignment.
    pub certificate_earned: bool,

    /// 1-5, once the student has rated the course.
    pub rating: Option<i64>,
    pub review: Option<String>,
    pub rated_at: Option<chrono::DateTime<chrono::Utc>>,

    /// 'active', 'completed' or 'cancelled'.
    pub status: String,
}

/// DTO for rating an enrolled course. Re-rating overwrites.
#[derive(Debug, Deserialize, Validate)]
pub struct RateCourseRequest {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5."))]
    pub rating: i64,
    #[validate(length(max = 1000, message = "Review must be at most 1000 characters."))]
    pub review: Option<String>,
}

/// DTO for an educator overriding an enrollment's lifecycle status.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateEnrollmentStatusRequest {
    #[validate(custom(function = validate_status))]
    pub status: String,
}

/// Progress numbers for one enrollment against its course content.
#[derive(Debug, Serialize)]
pub struct ProgressSummary {
    pub completed_lectures: usize,
    pub total_lectures: usize,
    pub percentage: i64,
}

impl ProgressSummary {
    pub fn compute(chapters: &[Chapter], completed: &[String]) -> Self {
        let total = total_lectures(chapters);
        let done = completed.len();
        let percentage = if total == 0 {
            0
        } else {
            ((done as f64 / total as f64) * 100.0).round() as i64
        };
        Self {
            completed_lectures: done,
            total_lectures: total,
            percentage,
        }
    }
}

/// An enrollment joined with its course snapshot, for "my courses" listings.
#[derive(Debug, Serialize, FromRow)]
pub struct EnrolledCourse {
    pub enrollment_id: i64,
    pub course_id: i64,
    pub title: String,
    pub thumbnail: String,
    pub educator_name: String,
    pub content: Json<Vec<Chapter>>,
    pub completed_lectures: Json<Vec<String>>,
    pub enrolled_at: chrono::DateTime<chrono::Utc>,
    pub last_accessed: chrono::DateTime<chrono::Utc>,
    pub assignment_completed: bool,
    pub certificate_earned: bool,
    pub status: String,
    pub average_rating: Option<f64>,
}

fn validate_status(status: &str) -> Result<(), validator::ValidationError> {
    match status {
        "active" | "completed" | "cancelled" => Ok(()),
        _ => Err(validator::ValidationError::new("invalid_status")),
    }
}
