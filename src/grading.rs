// src/grading.rs

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::{
    error::AppError,
    models::{assignment::AssignmentQuestion, submission::GradedAnswer},
};

/// The result of grading one submission.
#[derive(Debug, Serialize)]
pub struct GradeOutcome {
    /// Graded answers in question order, snapshotting the question text.
    pub answers: Vec<GradedAnswer>,
    /// Points earned.
    pub score: i64,
    /// Points available.
    pub total_points: i64,
    /// round(score / total_points * 100), half-up.
    pub percentage: i64,
    /// percentage >= passing_score (inclusive).
    pub passed: bool,
}

/// Grades a submission against an assignment's questions.
///
/// `answers` maps question id to the chosen option. The key set must match
/// the assignment's question ids exactly; anything missing or unknown is a
/// BadRequest before any grading happens. Correctness is exact string
/// equality with the stored correct answer: case-sensitive, no trimming.
///
/// An assignment with no questions cannot be graded; that is a configuration
/// fault, not a client error.
pub fn grade(
    questions: &[AssignmentQuestion],
    answers: &HashMap<String, String>,
    passing_score: i64,
) -> Result<GradeOutcome, AppError> {
    if questions.is_empty() {
        return Err(AppError::InternalServerError(
            "assignment has no questions".to_string(),
        ));
    }

    let expected: HashSet<&str> = questions.iter().map(|q| q.id.as_str()).collect();

    if let Some(unknown) = answers.keys().find(|k| !expected.contains(k.as_str())) {
        return Err(AppError::BadRequest(format!(
            "Answer references unknown question id '{}'",
            unknown
        )));
    }
    if let Some(missing) = questions.iter().find(|q| !answers.contains_key(&q.id)) {
        return Err(AppError::BadRequest(format!(
            "Missing answer for question '{}'",
            missing.id
        )));
    }

    let mut graded = Vec::with_capacity(questions.len());
    let mut score = 0i64;
    let mut total_points = 0i64;

    for question in questions {
        // Key-set equality was checked above, so the lookup cannot miss.
        let student_answer = answers.get(&question.id).cloned().unwrap_or_default();
        let is_correct = student_answer == question.correct_answer;
        let earned = if is_correct { question.points } else { 0 };

        score += earned;
        total_points += question.points;

        graded.push(GradedAnswer {
            question: question.question.clone(),
            student_answer,
            is_correct,
            points: earned,
        });
    }

    let percentage = ((score as f64 / total_points as f64) * 100.0).round() as i64;
    let passed = percentage >= passing_score;

    Ok(GradeOutcome {
        answers: graded,
        score,
        total_points,
        percentage,
        passed,
    })
}
