// src/models/assignment.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

fn default_points() -> i64 {
    1
}

/// One multiple-choice question. Stored inside the assignment row as JSON.
///
/// Every question carries a stable string id; answers are submitted as a map
/// keyed by these ids, so reordering questions can never misattribute an
/// answer. Ids left empty by the authoring client are assigned server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentQuestion {
    #[serde(default)]
    pub id: String,

    pub question: String,

    /// At least two options; the correct answer must be one of them,
    /// compared by exact string equality.
    pub options: Vec<String>,

    pub correct_answer: String,

    /// Shown to the student after grading.
    #[serde(default)]
    pub explanation: String,

    #[serde(default = "default_points")]
    pub points: i64,

    /// Optional link to the lecture this question covers.
    pub lecture_id: Option<String>,
}

/// Represents the 'assignments' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Assignment {
    pub id: i64,

    pub course_id: i64,

    pub title: String,

    pub description: String,

    /// Question list, stored as a JSON array.
    pub questions: Json<Vec<AssignmentQuestion>>,

    /// Minimum percentage (inclusive) required to pass.
    pub passing_score: i64,

    /// Advisory time limit in minutes. The server does not enforce it;
    /// clients report elapsed time with their submission.
    pub time_limit: i64,

    pub is_active: bool,

    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// DTO for creating an assignment on a course.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateAssignmentRequest {
    #[validate(length(
        min = 1,
        max = 200,
        message = "Title must be between 1 and 200 characters."
    ))]
    pub title: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(custom(function = validate_questions))]
    pub questions: Vec<AssignmentQuestion>,
    #[validate(range(min = 0, max = 100, message = "Passing score must be between 0 and 100."))]
    pub passing_score: Option<i64>,
    #[validate(range(min = 1, message = "Time limit must be at least 1 minute."))]
    pub time_limit: Option<i64>,
}

/// DTO for updating an assignment. Absent fields are left untouched.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateAssignmentRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(custom(function = validate_questions))]
    pub questions: Option<Vec<AssignmentQuestion>>,
    #[validate(range(min = 0, max = 100))]
    pub passing_score: Option<i64>,
    #[validate(range(min = 1))]
    pub time_limit: Option<i64>,
    pub is_active: Option<bool>,
}

/// Query flag for `GET /api/assignments/{id}`.
#[derive(Debug, Deserialize)]
pub struct AssignmentViewQuery {
    #[serde(rename = "studentView")]
    pub student_view: Option<bool>,
}

/// A question as students see it before grading: no correct answer, no
/// explanation.
#[derive(Debug, Serialize)]
pub struct StudentQuestion {
    pub id: String,
    pub question: String,
    pub options: Vec<String>,
    pub points: i64,
    pub lecture_id: Option<String>,
}

/// Assignment view for students: metadata plus stripped questions.
#[derive(Debug, Serialize)]
pub struct StudentAssignment {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub description: String,
    pub passing_score: i64,
    pub time_limit: i64,
    pub question_count: usize,
    pub total_points: i64,
    pub questions: Vec<StudentQuestion>,
}

impl StudentAssignment {
    pub fn from_assignment(assignment: &Assignment) -> Self {
        let questions: Vec<StudentQuestion> = assignment
            .questions
            .iter()
            .map(|q| StudentQuestion {
                id: q.id.clone(),
                question: q.question.clone(),
                options: q.options.clone(),
                points: q.points,
                lecture_id: q.lecture_id.clone(),
            })
            .collect();

        Self {
            id: assignment.id,
            course_id: assignment.course_id,
            title: assignment.title.clone(),
            description: assignment.description.clone(),
            passing_score: assignment.passing_score,
            time_limit: assignment.time_limit,
            question_count: questions.len(),
            total_points: assignment.questions.iter().map(|q| q.points).sum(),
            questions,
        }
    }
}

/// Fills in ids for questions that arrived without one (`q1`, `q2`, ...),
/// skipping any ids the client already took.
pub fn assign_question_ids(questions: &mut [AssignmentQuestion]) {
    let taken: std::collections::HashSet<String> = questions
        .iter()
        .filter(|q| !q.id.is_empty())
        .map(|q| q.id.clone())
        .collect();

    let mut next = 1usize;
    for question in questions.iter_mut() {
        if question.id.is_empty() {
            let mut candidate = format!("q{}", next);
            while taken.contains(&candidate) {
                next += 1;
                candidate = format!("q{}", next);
            }
            next += 1;
            question.id = candidate;
        }
    }
}

fn validate_questions(questions: &[AssignmentQuestion]) -> Result<(), validator::ValidationError> {
    if questions.is_empty() {
        return Err(validator::ValidationError::new("questions_cannot_be_empty"));
    }

    let mut seen_ids = std::collections::HashSet::new();
    for q in questions {
        if q.question.is_empty() {
            return Err(validator::ValidationError::new("question_text_required"));
        }
        if q.options.len() < 2 {
            return Err(validator::ValidationError::new("at_least_two_options"));
        }
        if !q.options.iter().any(|opt| opt == &q.correct_answer) {
            return Err(validator::ValidationError::new(
                "correct_answer_not_an_option",
            ));
        }
        if q.points < 1 {
            return Err(validator::ValidationError::new("points_below_one"));
        }
        // Ids are optional at this stage; any that are present must be unique.
        if !q.id.is_empty() && !seen_ids.insert(q.id.as_str()) {
            return Err(validator::ValidationError::new("duplicate_question_id"));
        }
    }
    Ok(())
}
