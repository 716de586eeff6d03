//! `alem_core::store` trait implementations backed by PostgreSQL.

use alem_core::identity::{Identity, NewProfile};
use alem_core::otp::OtpPurpose;
use alem_core::store::{
    AttemptReservation, IdentityStore, NewSession, OtpChallenge, OtpStore, SessionRecord,
    SessionStore, StoreError, StoreResult, StoredCredential,
};
use alem_core::types::{DbId, Timestamp};
use async_trait::async_trait;

use crate::models::identity::{CreateIdentity, IdentityRow};
use crate::repositories::{IdentityRepo, OtpRepo, ProfileRepo, SessionRepo};
use crate::{to_store_error, DbPool};

fn to_identity(row: &IdentityRow) -> StoreResult<Identity> {
    row.to_identity().map_err(|e| {
        tracing::error!(user_id = %row.id, error = %e, "Stored identity has an invalid role");
        StoreError::Unavailable(e.to_string())
    })
}

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgIdentityStore {
    pool: DbPool,
}

impl PgIdentityStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn create(
        &self,
        identity: &Identity,
        password_hash: Option<&str>,
        profile: &NewProfile,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(to_store_error)?;

        let input = CreateIdentity {
            id: identity.id,
            email: identity.email.as_deref(),
            phone: identity.phone.as_deref(),
            password_hash,
            role: identity.role,
            created_at: identity.created_at,
        };
        IdentityRepo::create(&mut *tx, &input)
            .await
            .map_err(to_store_error)?;
        ProfileRepo::create(&mut *tx, identity.id, &profile.first_name, &profile.last_name)
            .await
            .map_err(to_store_error)?;

        tx.commit().await.map_err(to_store_error)
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<StoredCredential>> {
        let Some(row) = IdentityRepo::find_by_email(&self.pool, email)
            .await
            .map_err(to_store_error)?
        else {
            return Ok(None);
        };
        Ok(Some(StoredCredential {
            identity: to_identity(&row)?,
            password_hash: row.password_hash,
        }))
    }

    async fn find_by_phone(&self, phone: &str) -> StoreResult<Option<Identity>> {
        IdentityRepo::find_by_phone(&self.pool, phone)
            .await
            .map_err(to_store_error)?
            .as_ref()
            .map(to_identity)
            .transpose()
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgSessionStore {
    pool: DbPool,
}

impl PgSessionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, session: &NewSession) -> StoreResult<()> {
        SessionRepo::create(&self.pool, session)
            .await
            .map_err(to_store_error)
    }

    async fn find_by_hash(&self, refresh_token_hash: &str) -> StoreResult<Option<SessionRecord>> {
        let row = SessionRepo::find_by_refresh_token_hash(&self.pool, refresh_token_hash)
            .await
            .map_err(to_store_error)?;
        Ok(row.map(SessionRecord::from))
    }

    async fn revoke(&self, id: DbId) -> StoreResult<bool> {
        SessionRepo::revoke(&self.pool, id)
            .await
            .map_err(to_store_error)
    }

    async fn revoke_all_by_user(&self, user_id: DbId) -> StoreResult<u64> {
        SessionRepo::revoke_all_for_user(&self.pool, user_id)
            .await
            .map_err(to_store_error)
    }

    async fn rotate(&self, old_id: DbId, replacement: &NewSession) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await.map_err(to_store_error)?;

        // A concurrent rotation blocks on the row lock here and then sees
        // zero affected rows.
        if !SessionRepo::revoke(&mut *tx, old_id)
            .await
            .map_err(to_store_error)?
        {
            tx.rollback().await.map_err(to_store_error)?;
            return Ok(false);
        }
        SessionRepo::create(&mut *tx, replacement)
            .await
            .map_err(to_store_error)?;

        tx.commit().await.map_err(to_store_error)?;
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// OTP challenges
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgOtpStore {
    pool: DbPool,
}

impl PgOtpStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OtpStore for PgOtpStore {
    async fn upsert(
        &self,
        phone: &str,
        purpose: OtpPurpose,
        code_hash: &str,
        expires_at: Timestamp,
    ) -> StoreResult<()> {
        OtpRepo::upsert(&self.pool, phone, purpose, code_hash, expires_at)
            .await
            .map_err(to_store_error)
    }

    async fn find_active(
        &self,
        phone: &str,
        purpose: OtpPurpose,
    ) -> StoreResult<Option<OtpChallenge>> {
        let row = OtpRepo::find_active(&self.pool, phone, purpose)
            .await
            .map_err(to_store_error)?;
        Ok(row.map(OtpChallenge::from))
    }

    async fn reserve_attempt(
        &self,
        phone: &str,
        purpose: OtpPurpose,
        max_attempts: u32,
    ) -> StoreResult<AttemptReservation> {
        let cap = i32::try_from(max_attempts).unwrap_or(i32::MAX);
        if let Some(row) = OtpRepo::reserve_attempt(&self.pool, phone, purpose, cap)
            .await
            .map_err(to_store_error)?
        {
            return Ok(AttemptReservation::Reserved(row.into()));
        }

        // Nothing was reserved; tell a spent challenge apart from a missing one.
        let active = OtpRepo::find_active(&self.pool, phone, purpose)
            .await
            .map_err(to_store_error)?;
        Ok(match active {
            Some(_) => AttemptReservation::Exhausted,
            None => AttemptReservation::NoChallenge,
        })
    }

    async fn consume(&self, phone: &str, purpose: OtpPurpose) -> StoreResult<bool> {
        OtpRepo::consume(&self.pool, phone, purpose)
            .await
            .map_err(to_store_error)
    }
}
