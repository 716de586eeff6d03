//! In-process store implementations.
//!
//! Each store keeps its rows behind a single async mutex, which gives every
//! operation the same atomicity a database transaction would. Rows are never
//! deleted, matching the append-only session audit trail.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{
    AttemptReservation, IdentityStore, NewSession, OtpChallenge, OtpStore, SessionRecord,
    SessionStore, StoreError, StoreResult, StoredCredential,
};
use crate::identity::{ClientInfo, Identity, NewProfile};
use crate::otp::OtpPurpose;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

#[derive(Default)]
struct IdentityTables {
    identities: HashMap<DbId, StoredCredential>,
    profiles: HashMap<DbId, NewProfile>,
}

#[derive(Default)]
pub struct MemoryIdentityStore {
    tables: Mutex<IdentityTables>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The profile written alongside `user_id`, if any.
    pub async fn profile(&self, user_id: DbId) -> Option<NewProfile> {
        self.tables.lock().await.profiles.get(&user_id).cloned()
    }

    pub async fn identity_count(&self) -> usize {
        self.tables.lock().await.identities.len()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn create(
        &self,
        identity: &Identity,
        password_hash: Option<&str>,
        profile: &NewProfile,
    ) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;

        for existing in tables.identities.values() {
            let existing = &existing.identity;
            if identity.email.is_some() && existing.email == identity.email {
                return Err(StoreError::DuplicateEmail);
            }
            if identity.phone.is_some() && existing.phone == identity.phone {
                return Err(StoreError::DuplicatePhone);
            }
        }

        tables.identities.insert(
            identity.id,
            StoredCredential {
                identity: identity.clone(),
                password_hash: password_hash.map(str::to_string),
            },
        );
        tables.profiles.insert(identity.id, profile.clone());
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<StoredCredential>> {
        let email = email.to_lowercase();
        let tables = self.tables.lock().await;
        Ok(tables
            .identities
            .values()
            .find(|c| c.identity.email.as_deref() == Some(email.as_str()))
            .cloned())
    }

    async fn find_by_phone(&self, phone: &str) -> StoreResult<Option<Identity>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .identities
            .values()
            .find(|c| c.identity.phone.as_deref() == Some(phone))
            .map(|c| c.identity.clone()))
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct SessionRow {
    record: SessionRecord,
    refresh_token_hash: String,
    client: ClientInfo,
}

impl SessionRow {
    fn new(session: &NewSession) -> Self {
        Self {
            record: SessionRecord {
                id: session.id,
                user_id: session.user_id,
                expires_at: session.expires_at,
                revoked_at: None,
            },
            refresh_token_hash: session.refresh_token_hash.clone(),
            client: ClientInfo {
                user_agent: session.user_agent.clone(),
                ip: session.ip.clone(),
            },
        }
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    rows: Mutex<Vec<SessionRow>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unrevoked sessions for `user_id` (expired ones included).
    pub async fn active_count(&self, user_id: DbId) -> usize {
        self.rows
            .lock()
            .await
            .iter()
            .filter(|r| r.record.user_id == user_id && r.record.revoked_at.is_none())
            .count()
    }

    /// Total rows ever written.
    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.lock().await.is_empty()
    }

    /// Audit metadata recorded for session `id`.
    pub async fn client_of(&self, id: DbId) -> Option<ClientInfo> {
        self.rows
            .lock()
            .await
            .iter()
            .find(|r| r.record.id == id)
            .map(|r| r.client.clone())
    }

    /// Move every session of `user_id` to the given expiry.
    pub async fn set_expiry_for_user(&self, user_id: DbId, expires_at: Timestamp) {
        for row in self.rows.lock().await.iter_mut() {
            if row.record.user_id == user_id {
                row.record.expires_at = expires_at;
            }
        }
    }
}

fn insert_session(rows: &mut Vec<SessionRow>, session: &NewSession) -> StoreResult<()> {
    if rows
        .iter()
        .any(|r| r.record.id == session.id || r.refresh_token_hash == session.refresh_token_hash)
    {
        return Err(StoreError::Unavailable(
            "session id or refresh token hash already exists".into(),
        ));
    }
    rows.push(SessionRow::new(session));
    Ok(())
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session: &NewSession) -> StoreResult<()> {
        insert_session(&mut *self.rows.lock().await, session)
    }

    async fn find_by_hash(&self, refresh_token_hash: &str) -> StoreResult<Option<SessionRecord>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .find(|r| r.refresh_token_hash == refresh_token_hash)
            .map(|r| r.record.clone()))
    }

    async fn revoke(&self, id: DbId) -> StoreResult<bool> {
        let mut rows = self.rows.lock().await;
        match rows
            .iter_mut()
            .find(|r| r.record.id == id && r.record.revoked_at.is_none())
        {
            Some(row) => {
                row.record.revoked_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_all_by_user(&self, user_id: DbId) -> StoreResult<u64> {
        let now = Utc::now();
        let mut revoked = 0;
        for row in self.rows.lock().await.iter_mut() {
            if row.record.user_id == user_id && row.record.revoked_at.is_none() {
                row.record.revoked_at = Some(now);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn rotate(&self, old_id: DbId, replacement: &NewSession) -> StoreResult<bool> {
        let mut rows = self.rows.lock().await;
        let Some(index) = rows
            .iter()
            .position(|r| r.record.id == old_id && r.record.revoked_at.is_none())
        else {
            return Ok(false);
        };

        insert_session(&mut rows, replacement)?;
        rows[index].record.revoked_at = Some(Utc::now());
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// OTP challenges
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct OtpRow {
    code_hash: String,
    expires_at: Timestamp,
    attempts_used: u32,
    consumed_at: Option<Timestamp>,
}

#[derive(Default)]
pub struct MemoryOtpStore {
    rows: Mutex<HashMap<(String, OtpPurpose), OtpRow>>,
}

impl MemoryOtpStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force the challenge for `(phone, purpose)` past its expiry.
    pub async fn expire(&self, phone: &str, purpose: OtpPurpose) {
        if let Some(row) = self
            .rows
            .lock()
            .await
            .get_mut(&(phone.to_string(), purpose))
        {
            row.expires_at = Utc::now() - chrono::Duration::seconds(1);
        }
    }
}

#[async_trait]
impl OtpStore for MemoryOtpStore {
    async fn upsert(
        &self,
        phone: &str,
        purpose: OtpPurpose,
        code_hash: &str,
        expires_at: Timestamp,
    ) -> StoreResult<()> {
        self.rows.lock().await.insert(
            (phone.to_string(), purpose),
            OtpRow {
                code_hash: code_hash.to_string(),
                expires_at,
                attempts_used: 0,
                consumed_at: None,
            },
        );
        Ok(())
    }

    async fn find_active(
        &self,
        phone: &str,
        purpose: OtpPurpose,
    ) -> StoreResult<Option<OtpChallenge>> {
        let now = Utc::now();
        Ok(self
            .rows
            .lock()
            .await
            .get(&(phone.to_string(), purpose))
            .filter(|row| row.consumed_at.is_none() && row.expires_at > now)
            .map(|row| OtpChallenge {
                code_hash: row.code_hash.clone(),
                expires_at: row.expires_at,
                attempts_used: row.attempts_used,
            }))
    }

    async fn reserve_attempt(
        &self,
        phone: &str,
        purpose: OtpPurpose,
        max_attempts: u32,
    ) -> StoreResult<AttemptReservation> {
        let now = Utc::now();
        let mut rows = self.rows.lock().await;
        let Some(row) = rows
            .get_mut(&(phone.to_string(), purpose))
            .filter(|row| row.consumed_at.is_none() && row.expires_at > now)
        else {
            return Ok(AttemptReservation::NoChallenge);
        };
        if row.attempts_used >= max_attempts {
            return Ok(AttemptReservation::Exhausted);
        }
        row.attempts_used += 1;
        Ok(AttemptReservation::Reserved(OtpChallenge {
            code_hash: row.code_hash.clone(),
            expires_at: row.expires_at,
            attempts_used: row.attempts_used,
        }))
    }

    async fn consume(&self, phone: &str, purpose: OtpPurpose) -> StoreResult<bool> {
        let mut rows = self.rows.lock().await;
        match rows.get_mut(&(phone.to_string(), purpose)) {
            Some(row) if row.consumed_at.is_none() => {
                row.consumed_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
