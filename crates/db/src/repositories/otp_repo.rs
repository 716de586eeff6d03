//! Repository for the `otp_codes` table.

use alem_core::otp::OtpPurpose;
use alem_core::types::Timestamp;
use sqlx::PgExecutor;

use crate::models::otp::OtpCode;

const COLUMNS: &str = "phone, purpose, code_hash, expires_at, attempts_used, consumed_at, created_at";

/// One pending challenge per `(phone, purpose)`.
pub struct OtpRepo;

impl OtpRepo {
    /// Insert or replace the challenge, resetting attempts and consumption.
    pub async fn upsert<'e, E: PgExecutor<'e>>(
        executor: E,
        phone: &str,
        purpose: OtpPurpose,
        code_hash: &str,
        expires_at: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO otp_codes (phone, purpose, code_hash, expires_at, attempts_used)
             VALUES ($1, $2, $3, $4, 0)
             ON CONFLICT (phone, purpose) DO UPDATE SET
                code_hash = EXCLUDED.code_hash,
                expires_at = EXCLUDED.expires_at,
                attempts_used = 0,
                consumed_at = NULL,
                created_at = NOW()",
        )
        .bind(phone)
        .bind(purpose.as_str())
        .bind(code_hash)
        .bind(expires_at)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// The unexpired, unconsumed challenge, if any.
    pub async fn find_active<'e, E: PgExecutor<'e>>(
        executor: E,
        phone: &str,
        purpose: OtpPurpose,
    ) -> Result<Option<OtpCode>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM otp_codes
             WHERE phone = $1 AND purpose = $2
               AND consumed_at IS NULL
               AND expires_at > NOW()"
        );
        sqlx::query_as::<_, OtpCode>(&query)
            .bind(phone)
            .bind(purpose.as_str())
            .fetch_optional(executor)
            .await
    }

    /// Mark the challenge consumed. Returns `true` only for the call that
    /// flipped it.
    pub async fn consume<'e, E: PgExecutor<'e>>(
        executor: E,
        phone: &str,
        purpose: OtpPurpose,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE otp_codes SET consumed_at = NOW()
             WHERE phone = $1 AND purpose = $2 AND consumed_at IS NULL",
        )
        .bind(phone)
        .bind(purpose.as_str())
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Spend one attempt on the active challenge if fewer than `max_attempts`
    /// are used. Returns the updated row, or `None` when the challenge is
    /// missing, expired, consumed, or out of attempts.
    ///
    /// The cap check and the increment happen in one statement; concurrent
    /// callers serialize on the row lock and re-evaluate the `WHERE` clause.
    pub async fn reserve_attempt<'e, E: PgExecutor<'e>>(
        executor: E,
        phone: &str,
        purpose: OtpPurpose,
        max_attempts: i32,
    ) -> Result<Option<OtpCode>, sqlx::Error> {
        let query = format!(
            "UPDATE otp_codes SET attempts_used = attempts_used + 1
             WHERE phone = $1 AND purpose = $2
               AND consumed_at IS NULL
               AND expires_at > NOW()
               AND attempts_used < $3
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, OtpCode>(&query)
            .bind(phone)
            .bind(purpose.as_str())
            .bind(max_attempts)
            .fetch_optional(executor)
            .await
    }
}
