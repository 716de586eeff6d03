//! Persistence capability traits used by the orchestrator.
//!
//! The orchestrator depends only on these contracts. Implementations:
//! - [`memory`] -- in-process stores for tests and local development
//! - `alem-db` -- PostgreSQL stores
//!
//! Every method is cancel-safe in the sense that dropping the returned future
//! never leaves a partial multi-row write behind: operations that touch more
//! than one row ([`IdentityStore::create`], [`SessionStore::rotate`]) must be
//! atomic.

pub mod memory;

use async_trait::async_trait;

use crate::identity::{Identity, NewProfile};
use crate::otp::OtpPurpose;
use crate::types::{DbId, Timestamp};

pub use crate::error::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

/// An identity together with its stored password hash (if any).
#[derive(Debug, Clone)]
pub struct StoredCredential {
    pub identity: Identity,
    /// `None` for phone-only accounts created through OTP login.
    pub password_hash: Option<String>,
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Persist a new identity and its empty profile in one atomic unit.
    ///
    /// # Errors
    ///
    /// [`StoreError::DuplicateEmail`] / [`StoreError::DuplicatePhone`] when a
    /// uniqueness constraint is violated; nothing is written in that case.
    async fn create(
        &self,
        identity: &Identity,
        password_hash: Option<&str>,
        profile: &NewProfile,
    ) -> StoreResult<()>;

    /// Look up by normalized (lowercase) email.
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<StoredCredential>>;

    /// Look up by normalized phone.
    async fn find_by_phone(&self, phone: &str) -> StoreResult<Option<Identity>>;
}

/// A session row to insert.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: DbId,
    pub user_id: DbId,
    pub refresh_token_hash: String,
    pub expires_at: Timestamp,
    pub user_agent: Option<String>,
    pub ip: Option<String>,
}

/// The authorization-relevant part of a stored session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub id: DbId,
    pub user_id: DbId,
    pub expires_at: Timestamp,
    pub revoked_at: Option<Timestamp>,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: &NewSession) -> StoreResult<()>;

    /// Find a session by refresh token hash regardless of its state.
    async fn find_by_hash(&self, refresh_token_hash: &str) -> StoreResult<Option<SessionRecord>>;

    /// Revoke one session. Returns `true` if this call revoked it, `false` if
    /// it was already revoked or does not exist.
    async fn revoke(&self, id: DbId) -> StoreResult<bool>;

    /// Revoke every active session for a user. Returns the number revoked.
    async fn revoke_all_by_user(&self, user_id: DbId) -> StoreResult<u64>;

    /// Revoke `old_id` and insert `replacement` atomically.
    ///
    /// Returns `false` without inserting anything when `old_id` was no longer
    /// active, so of two concurrent rotations of the same session only one
    /// succeeds.
    async fn rotate(&self, old_id: DbId, replacement: &NewSession) -> StoreResult<bool>;
}

/// A pending challenge as seen by the verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpChallenge {
    pub code_hash: String,
    pub expires_at: Timestamp,
    pub attempts_used: u32,
}

/// Result of [`OtpStore::reserve_attempt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptReservation {
    /// One attempt was counted; `attempts_used` already includes it.
    Reserved(OtpChallenge),
    /// The challenge is active but every allowed attempt is used.
    Exhausted,
    /// No unexpired, unconsumed challenge exists.
    NoChallenge,
}

#[async_trait]
pub trait OtpStore: Send + Sync {
    /// Insert or replace the challenge for `(phone, purpose)`, resetting the
    /// attempt counter and clearing any consumption mark.
    async fn upsert(
        &self,
        phone: &str,
        purpose: OtpPurpose,
        code_hash: &str,
        expires_at: Timestamp,
    ) -> StoreResult<()>;

    /// The non-expired, non-consumed challenge for `(phone, purpose)`.
    async fn find_active(&self, phone: &str, purpose: OtpPurpose)
        -> StoreResult<Option<OtpChallenge>>;

    /// Count one attempt against the active challenge unless `max_attempts`
    /// are already used.
    ///
    /// The cap check and the increment are a single atomic step: however many
    /// verifications run concurrently, at most `max_attempts` of them get
    /// [`AttemptReservation::Reserved`] for one challenge.
    async fn reserve_attempt(
        &self,
        phone: &str,
        purpose: OtpPurpose,
        max_attempts: u32,
    ) -> StoreResult<AttemptReservation>;

    /// Mark the challenge consumed. Idempotent: returns `true` only for the
    /// call that performed the consumption.
    async fn consume(&self, phone: &str, purpose: OtpPurpose) -> StoreResult<bool>;
}
