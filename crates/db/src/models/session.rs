//! Auth session model.

use alem_core::store::SessionRecord;
use alem_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `auth_sessions` table.
#[derive(Debug, Clone, FromRow)]
pub struct AuthSession {
    pub id: DbId,
    pub user_id: DbId,
    pub refresh_token_hash: String,
    pub expires_at: Timestamp,
    pub revoked_at: Option<Timestamp>,
    pub user_agent: Option<String>,
    pub ip: Option<String>,
    pub created_at: Timestamp,
}

impl From<AuthSession> for SessionRecord {
    fn from(row: AuthSession) -> Self {
        SessionRecord {
            id: row.id,
            user_id: row.user_id,
            expires_at: row.expires_at,
            revoked_at: row.revoked_at,
        }
    }
}
