//! Repository for the `user_profiles` table.

use alem_core::types::DbId;
use sqlx::PgExecutor;

use crate::models::identity::ProfileRow;

const COLUMNS: &str = "user_id, first_name, last_name, created_at, updated_at";

pub struct ProfileRepo;

impl ProfileRepo {
    /// Insert the profile row for a freshly created identity.
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: DbId,
        first_name: &str,
        last_name: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO user_profiles (user_id, first_name, last_name) VALUES ($1, $2, $3)")
            .bind(user_id)
            .bind(first_name)
            .bind(last_name)
            .execute(executor)
            .await?;
        Ok(())
    }

    pub async fn find_by_user<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: DbId,
    ) -> Result<Option<ProfileRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM user_profiles WHERE user_id = $1");
        sqlx::query_as::<_, ProfileRow>(&query)
            .bind(user_id)
            .fetch_optional(executor)
            .await
    }
}
