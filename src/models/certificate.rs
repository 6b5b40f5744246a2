// src/models/certificate.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

/// Represents the 'certificates' table. At most one per (student,
/// assignment), enforced by a unique constraint; the certificate number is
/// globally unique.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Certificate {
    pub id: i64,

    pub student_id: i64,

    pub course_id: i64,

    pub assignment_id: i64,

    /// The passing submission this certificate attests.
    pub submission_id: i64,

    /// Shape: CERT-<unix millis>-<6 random digits>.
    pub certificate_number: String,

    /// Score snapshot from the submission at issuance time.
    pub score: i64,
    pub percentage: i64,

    pub issued_at: chrono::DateTime<chrono::Utc>,

    /// Issuance + 24 months.
    pub expires_at: chrono::DateTime<chrono::Utc>,

    pub is_active: bool,
}

/// A certificate joined with course and assignment titles, for the student's
/// certificate list.
#[derive(Debug, Serialize, FromRow)]
pub struct CertificateView {
    pub id: i64,
    pub certificate_number: String,
    pub course_id: i64,
    pub course_title: String,
    pub assignment_id: i64,
    pub assignment_title: String,
    pub score: i64,
    pub percentage: i64,
    pub issued_at: chrono::DateTime<chrono::Utc>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub is_active: bool,
}
