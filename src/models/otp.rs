// src/models/otp.rs

use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A code is valid for this long after being issued.
pub const OTP_TTL_MINUTES: i64 = 10;

/// What a one-time code is allowed to be spent on.
pub const PURPOSE_REGISTER: &str = "register";
pub const PURPOSE_PASSWORD_RESET: &str = "password_reset";

/// Represents the 'otp_codes' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OtpCode {
    pub id: i64,
    pub email: String,
    pub code: String,
    pub purpose: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub used: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// A fresh 6-digit code, zero-padded.
pub fn generate_code() -> String {
    let n: u32 = rand::rng().random_range(0..1_000_000);
    format!("{:06}", n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_six_decimal_digits() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
