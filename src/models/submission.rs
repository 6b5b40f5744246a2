// src/models/submission.rs

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};

/// One graded answer, snapshotting the question text at grading time so the
/// record stays meaningful if the assignment is edited later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedAnswer {
    pub question: String,
    pub student_answer: String,
    pub is_correct: bool,
    /// Points earned: the question's full value when correct, zero otherwise.
    pub points: i64,
}

/// Represents the 'submissions' table: one graded attempt per student per
/// assignment, enforced by a unique constraint.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Submission {
    pub id: i64,

    pub student_id: i64,

    pub assignment_id: i64,

    pub course_id: i64,

    /// Graded answers, stored as a JSON array.
    pub answers: Json<Vec<GradedAnswer>>,

    pub score: i64,

    pub total_points: i64,

    /// round(score / total_points * 100), half-up.
    pub percentage: i64,

    pub passed: bool,

    /// Client-reported minutes spent; advisory only.
    pub time_taken: f64,

    pub submitted_at: chrono::DateTime<chrono::Utc>,
}

/// DTO for submitting answers. Keys are question ids; the submitted key set
/// must match the assignment's question ids exactly.
#[derive(Debug, Deserialize)]
pub struct SubmitAssignmentRequest {
    pub answers: HashMap<String, String>,
    #[serde(rename = "timeTaken", default)]
    pub time_taken: f64,
}
