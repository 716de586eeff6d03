//! OTP challenge model.

use alem_core::store::OtpChallenge;
use alem_core::types::Timestamp;
use sqlx::FromRow;

/// A row from the `otp_codes` table.
#[derive(Debug, Clone, FromRow)]
pub struct OtpCode {
    pub phone: String,
    pub purpose: String,
    pub code_hash: String,
    pub expires_at: Timestamp,
    pub attempts_used: i32,
    pub consumed_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl From<OtpCode> for OtpChallenge {
    fn from(row: OtpCode) -> Self {
        OtpChallenge {
            code_hash: row.code_hash,
            expires_at: row.expires_at,
            attempts_used: u32::try_from(row.attempts_used).unwrap_or(0),
        }
    }
}
