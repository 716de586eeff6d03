//! Repository for the `identities` table.

use sqlx::PgExecutor;

use crate::models::identity::{CreateIdentity, IdentityRow};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, email, phone, password_hash, role, created_at, updated_at";

/// Provides insert and lookup operations for identities.
pub struct IdentityRepo;

impl IdentityRepo {
    /// Insert a new identity.
    ///
    /// Fails with a unique violation on `uq_identities_email` or
    /// `uq_identities_phone` when the contact is already taken.
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        input: &CreateIdentity<'_>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO identities (id, email, phone, password_hash, role, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $6)",
        )
        .bind(input.id)
        .bind(input.email)
        .bind(input.phone)
        .bind(input.password_hash)
        .bind(input.role.as_str())
        .bind(input.created_at)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Find an identity by email. Emails are stored lowercased.
    pub async fn find_by_email<'e, E: PgExecutor<'e>>(
        executor: E,
        email: &str,
    ) -> Result<Option<IdentityRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM identities WHERE email = $1");
        sqlx::query_as::<_, IdentityRow>(&query)
            .bind(email.to_lowercase())
            .fetch_optional(executor)
            .await
    }

    /// Find an identity by normalized phone.
    pub async fn find_by_phone<'e, E: PgExecutor<'e>>(
        executor: E,
        phone: &str,
    ) -> Result<Option<IdentityRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM identities WHERE phone = $1");
        sqlx::query_as::<_, IdentityRow>(&query)
            .bind(phone)
            .fetch_optional(executor)
            .await
    }
}
