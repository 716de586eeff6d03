//! PostgreSQL persistence for the authentication core.
//!
//! - [`models`] -- row structs and insert DTOs.
//! - [`repositories`] -- zero-sized query namespaces, one per table.
//! - [`stores`] -- adapters implementing the `alem_core::store` traits on top
//!   of the repositories.

pub mod models;
pub mod repositories;
pub mod stores;

use std::time::Duration;

use alem_core::store::StoreError;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub use stores::{PgIdentityStore, PgOtpStore, PgSessionStore};

pub type DbPool = PgPool;

/// Unique constraint on `identities.email`.
pub const UQ_IDENTITIES_EMAIL: &str = "uq_identities_email";
/// Unique constraint on `identities.phone`.
pub const UQ_IDENTITIES_PHONE: &str = "uq_identities_phone";

/// Open a connection pool.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to confirm the database is reachable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply the embedded migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Translate a driver error into the store-level kind.
///
/// Unique violations (SQLSTATE 23505) on the identity contact constraints
/// become typed duplicates; everything else is reported as unavailable.
pub fn to_store_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            match db_err.constraint() {
                Some(UQ_IDENTITIES_EMAIL) => return StoreError::DuplicateEmail,
                Some(UQ_IDENTITIES_PHONE) => return StoreError::DuplicatePhone,
                _ => {}
            }
        }
    }
    tracing::error!(error = %err, "Database error");
    StoreError::Unavailable(err.to_string())
}
