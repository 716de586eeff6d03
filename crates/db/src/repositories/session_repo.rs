//! Repository for the `auth_sessions` table.

use alem_core::store::NewSession;
use alem_core::types::DbId;
use sqlx::PgExecutor;

use crate::models::session::AuthSession;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, user_id, refresh_token_hash, expires_at, revoked_at, \
                       user_agent, ip, created_at";

/// Provides insert, lookup and revocation for refresh-token sessions.
/// Sessions are never deleted.
pub struct SessionRepo;

impl SessionRepo {
    /// Insert a new session.
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        input: &NewSession,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO auth_sessions (id, user_id, refresh_token_hash, expires_at, user_agent, ip)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(input.id)
        .bind(input.user_id)
        .bind(&input.refresh_token_hash)
        .bind(input.expires_at)
        .bind(&input.user_agent)
        .bind(&input.ip)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Find a session by its refresh token hash, whatever its state.
    ///
    /// Revocation and expiry are judged by the caller so that reuse of a
    /// revoked token can be told apart from an unknown token.
    pub async fn find_by_refresh_token_hash<'e, E: PgExecutor<'e>>(
        executor: E,
        hash: &str,
    ) -> Result<Option<AuthSession>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM auth_sessions WHERE refresh_token_hash = $1");
        sqlx::query_as::<_, AuthSession>(&query)
            .bind(hash)
            .fetch_optional(executor)
            .await
    }

    /// Revoke a single session. Returns `true` if this call revoked it.
    ///
    /// The conditional update takes the row lock, so of two concurrent calls
    /// only one sees an affected row.
    pub async fn revoke<'e, E: PgExecutor<'e>>(executor: E, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE auth_sessions SET revoked_at = NOW() WHERE id = $1 AND revoked_at IS NULL",
        )
        .bind(id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Revoke all active sessions for a user. Returns the count of revoked sessions.
    pub async fn revoke_all_for_user<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: DbId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE auth_sessions SET revoked_at = NOW()
             WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }
}
