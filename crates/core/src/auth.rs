//! The authentication orchestrator.
//!
//! [`AuthService`] coordinates the identity, session and OTP stores with the
//! [`TokenService`]. It holds no mutable state of its own; every shared fact
//! lives in the stores, so one instance can serve any number of concurrent
//! requests behind an `Arc`.
//!
//! Flows:
//!
//! ```text
//! register ─┐
//! login ────┼─> mint access + refresh ─> SessionStore::create
//! verify_otp┘
//! refresh_tokens ─> verify refresh ─> session checks ─> SessionStore::rotate
//! logout ─> SessionStore::revoke        logout_all ─> SessionStore::revoke_all_by_user
//! parse_token ─> TokenService::verify (access secret, no store access)
//! ```

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult, OtpRejection, StoreError, TokenError};
use crate::hashing::{keyed_hash, verify_keyed_hash};
use crate::identity::{
    mask_phone, normalize_email, normalize_phone, ClientInfo, Identity, NewProfile, Registration,
    TokenPair,
};
use crate::otp::{generate_code, OtpDelivery, OtpPurpose};
use crate::password::{hash_password_async, validate_password_strength, verify_password_async};
use crate::roles::Role;
use crate::store::{AttemptReservation, IdentityStore, NewSession, OtpStore, SessionStore};
use crate::token::{Claims, TokenService};
use crate::types::DbId;

pub struct AuthService {
    identities: Arc<dyn IdentityStore>,
    sessions: Arc<dyn SessionStore>,
    otps: Arc<dyn OtpStore>,
    delivery: Arc<dyn OtpDelivery>,
    tokens: TokenService,
    config: AuthConfig,
}

impl AuthService {
    /// Build the orchestrator. `config` is normalized (secret fallback,
    /// attempt-cap default) before use.
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        sessions: Arc<dyn SessionStore>,
        otps: Arc<dyn OtpStore>,
        delivery: Arc<dyn OtpDelivery>,
        config: AuthConfig,
    ) -> Self {
        let config = config.normalized();
        let tokens = TokenService::new(config.issuer.clone(), config.audience.clone());
        Self {
            identities,
            sessions,
            otps,
            delivery,
            tokens,
            config,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    // -----------------------------------------------------------------------
    // Password flows
    // -----------------------------------------------------------------------

    /// Create an identity with a password and log it in.
    ///
    /// The identity and its empty profile are written atomically; on a
    /// uniqueness conflict nothing is written and
    /// [`AuthError::DuplicateEmail`] / [`AuthError::DuplicatePhone`] is
    /// returned.
    pub async fn register(
        &self,
        input: Registration,
        client: ClientInfo,
    ) -> AuthResult<(Identity, TokenPair)> {
        let email = normalize_email(&input.email).map_err(AuthError::Validation)?;
        if input.password.is_empty() {
            return Err(AuthError::Validation("Password is required".into()));
        }
        validate_password_strength(&input.password, self.config.min_password_length)
            .map_err(AuthError::Validation)?;
        let phone = input
            .phone
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(normalize_phone)
            .transpose()
            .map_err(AuthError::Validation)?;

        let password_hash = hash_password_async(input.password).await?;

        let identity = Identity {
            id: Uuid::new_v4(),
            email: Some(email),
            phone,
            role: input.role,
            created_at: Utc::now(),
        };
        let profile = NewProfile {
            first_name: input.first_name.trim().to_string(),
            last_name: input.last_name.trim().to_string(),
        };

        if let Err(err) = self
            .identities
            .create(&identity, Some(&password_hash), &profile)
            .await
        {
            tracing::warn!(error = %err, "Registration rejected");
            return Err(err.into());
        }
        tracing::info!(user_id = %identity.id, role = %identity.role, "Identity registered");

        let pair = self
            .start_session(identity.id, identity.role, &client)
            .await?;
        Ok((identity, pair))
    }

    /// Authenticate by email and password.
    ///
    /// [`AuthError::UserNotFound`] and [`AuthError::InvalidCredentials`] are
    /// distinct here for logging; the HTTP layer renders both identically.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        client: ClientInfo,
    ) -> AuthResult<TokenPair> {
        let email = email.trim().to_lowercase();

        let Some(credential) = self.identities.find_by_email(&email).await? else {
            tracing::warn!("Login failed: no identity for email");
            return Err(AuthError::UserNotFound);
        };
        let user_id = credential.identity.id;

        let Some(password_hash) = credential.password_hash else {
            tracing::warn!(%user_id, "Login failed: identity has no password");
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_password_async(password.to_string(), password_hash).await? {
            tracing::warn!(%user_id, "Login failed: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        tracing::info!(%user_id, "Password login succeeded");
        self.start_session(user_id, credential.identity.role, &client)
            .await
    }

    // -----------------------------------------------------------------------
    // OTP flows
    // -----------------------------------------------------------------------

    /// Issue a login code for `phone`. A no-op when OTP is disabled.
    pub async fn send_otp(&self, phone: &str) -> AuthResult<()> {
        self.send_otp_for(phone, OtpPurpose::Login).await
    }

    /// Issue a code for `(phone, purpose)`, replacing any pending challenge
    /// for the same pair and resetting its attempt counter.
    pub async fn send_otp_for(&self, phone: &str, purpose: OtpPurpose) -> AuthResult<()> {
        if !self.config.otp.enabled {
            tracing::debug!("OTP disabled; send request ignored");
            return Ok(());
        }
        let phone = normalize_phone(phone).map_err(AuthError::Validation)?;

        let code = generate_code(self.config.otp.length);
        let code_hash = self.otp_hash(&phone, purpose, &code);
        let expires_at = Utc::now() + self.config.otp.ttl;

        self.otps
            .upsert(&phone, purpose, &code_hash, expires_at)
            .await?;
        self.delivery
            .deliver(&phone, purpose, &code)
            .await
            .map_err(AuthError::Delivery)?;

        tracing::info!(phone = %mask_phone(&phone), %purpose, "OTP challenge issued");
        Ok(())
    }

    /// Log in with a login code, creating a phone-only student identity on
    /// first use.
    pub async fn verify_otp(
        &self,
        phone: &str,
        code: &str,
        client: ClientInfo,
    ) -> AuthResult<TokenPair> {
        let phone = normalize_phone(phone).map_err(AuthError::Validation)?;
        self.check_otp(&phone, OtpPurpose::Login, code).await?;

        let identity = self.find_or_create_phone_identity(&phone).await?;
        tracing::info!(user_id = %identity.id, "OTP login succeeded");
        self.start_session(identity.id, identity.role, &client)
            .await
    }

    /// Check and consume the pending code for `(phone, purpose)`.
    ///
    /// Every check, the successful one included, spends one attempt before the
    /// code is compared. Once the cap is spent the challenge stays dead until a
    /// new code is issued.
    pub async fn check_otp(&self, phone: &str, purpose: OtpPurpose, code: &str) -> AuthResult<()> {
        let masked = mask_phone(phone);
        let reject = |reason: OtpRejection| {
            tracing::warn!(phone = %masked, %purpose, %reason, "OTP verification failed");
            Err(AuthError::InvalidOtp(reason))
        };

        let challenge = match self
            .otps
            .reserve_attempt(phone, purpose, self.config.otp.max_attempts)
            .await?
        {
            AttemptReservation::Reserved(challenge) => challenge,
            AttemptReservation::Exhausted => return reject(OtpRejection::AttemptsExhausted),
            AttemptReservation::NoChallenge => return reject(OtpRejection::NoChallenge),
        };

        let message = otp_message(phone, purpose, code.trim());
        if !verify_keyed_hash(&message, &self.config.refresh_secret, &challenge.code_hash) {
            return reject(OtpRejection::Mismatch);
        }

        if !self.otps.consume(phone, purpose).await? {
            return reject(OtpRejection::AlreadyConsumed);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Tokens and sessions
    // -----------------------------------------------------------------------

    /// Verify an access token. Needs no store access.
    pub fn parse_token(&self, token: &str) -> Result<Claims, TokenError> {
        self.tokens.verify(token, &self.config.access_secret)
    }

    /// Exchange a refresh token for a new pair, revoking the old session.
    ///
    /// Each refresh token is single-use: presenting it again, or presenting it
    /// after [`logout_all`](Self::logout_all), fails with
    /// [`AuthError::InvalidRefresh`].
    pub async fn refresh_tokens(
        &self,
        refresh_token: &str,
        client: ClientInfo,
    ) -> AuthResult<TokenPair> {
        let claims = self
            .tokens
            .verify(refresh_token, &self.config.refresh_secret)
            .map_err(|e| {
                tracing::debug!(error = %e, "Refresh token failed verification");
                AuthError::InvalidRefresh
            })?;

        let hash = keyed_hash(refresh_token, &self.config.refresh_secret);
        let Some(session) = self.sessions.find_by_hash(&hash).await? else {
            tracing::warn!(user_id = %claims.user_id, "Refresh token has no session");
            return Err(AuthError::InvalidRefresh);
        };

        if session.revoked_at.is_some() {
            tracing::warn!(
                session_id = %session.id,
                user_id = %session.user_id,
                "Refresh attempted with a revoked session (possible token reuse)"
            );
            return Err(AuthError::InvalidRefresh);
        }
        if session.expires_at <= Utc::now() {
            tracing::debug!(session_id = %session.id, "Refresh attempted with an expired session");
            return Err(AuthError::InvalidRefresh);
        }
        if session.user_id != claims.user_id {
            tracing::warn!(
                session_id = %session.id,
                session_user = %session.user_id,
                token_user = %claims.user_id,
                "Refresh token does not belong to its session"
            );
            return Err(AuthError::InvalidRefresh);
        }

        let (pair, replacement) = self.mint(claims.user_id, claims.role, &client)?;
        if !self.sessions.rotate(session.id, &replacement).await? {
            tracing::warn!(session_id = %session.id, "Session revoked concurrently during refresh");
            return Err(AuthError::InvalidRefresh);
        }

        tracing::info!(
            user_id = %claims.user_id,
            old_session = %session.id,
            new_session = %replacement.id,
            "Refresh token rotated"
        );
        Ok(pair)
    }

    /// Revoke the session behind `refresh_token`.
    ///
    /// Unknown tokens fail with [`AuthError::InvalidRefresh`]; an already
    /// revoked session is accepted silently.
    pub async fn logout(&self, refresh_token: &str) -> AuthResult<()> {
        let hash = keyed_hash(refresh_token, &self.config.refresh_secret);
        let Some(session) = self.sessions.find_by_hash(&hash).await? else {
            tracing::warn!("Logout with unknown refresh token");
            return Err(AuthError::InvalidRefresh);
        };

        let revoked = self.sessions.revoke(session.id).await?;
        tracing::info!(
            session_id = %session.id,
            user_id = %session.user_id,
            already_revoked = !revoked,
            "Session logged out"
        );
        Ok(())
    }

    /// Revoke every active session of `user_id`. Returns how many were revoked.
    pub async fn logout_all(&self, user_id: DbId) -> AuthResult<u64> {
        let revoked = self.sessions.revoke_all_by_user(user_id).await?;
        tracing::info!(%user_id, revoked, "All sessions logged out");
        Ok(revoked)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Sign a token pair and build (but not persist) its session row.
    fn mint(
        &self,
        user_id: DbId,
        role: Role,
        client: &ClientInfo,
    ) -> AuthResult<(TokenPair, NewSession)> {
        let access_token = self.tokens.sign(
            user_id,
            role,
            &self.config.access_secret,
            self.config.access_ttl,
        )?;
        let refresh_token = self.tokens.sign(
            user_id,
            role,
            &self.config.refresh_secret,
            self.config.refresh_ttl,
        )?;

        let session = NewSession {
            id: Uuid::new_v4(),
            user_id,
            refresh_token_hash: keyed_hash(&refresh_token, &self.config.refresh_secret),
            expires_at: Utc::now() + self.config.refresh_ttl,
            user_agent: client.user_agent.clone(),
            ip: client.ip.clone(),
        };
        let pair = TokenPair {
            access_token,
            refresh_token,
            expires_in: self.config.access_ttl.num_seconds(),
            refresh_expires_in: self.config.refresh_ttl.num_seconds(),
        };
        Ok((pair, session))
    }

    async fn start_session(
        &self,
        user_id: DbId,
        role: Role,
        client: &ClientInfo,
    ) -> AuthResult<TokenPair> {
        let (pair, session) = self.mint(user_id, role, client)?;
        self.sessions.create(&session).await?;
        tracing::debug!(%user_id, session_id = %session.id, "Session created");
        Ok(pair)
    }

    async fn find_or_create_phone_identity(&self, phone: &str) -> AuthResult<Identity> {
        if let Some(identity) = self.identities.find_by_phone(phone).await? {
            return Ok(identity);
        }

        let identity = Identity {
            id: Uuid::new_v4(),
            email: None,
            phone: Some(phone.to_string()),
            role: Role::default(),
            created_at: Utc::now(),
        };
        match self
            .identities
            .create(&identity, None, &NewProfile::default())
            .await
        {
            Ok(()) => {
                tracing::info!(user_id = %identity.id, "Phone-only identity created");
                Ok(identity)
            }
            // Lost a creation race with a concurrent verification.
            Err(StoreError::DuplicatePhone) => self
                .identities
                .find_by_phone(phone)
                .await?
                .ok_or_else(|| AuthError::Internal("phone identity vanished after conflict".into())),
            Err(err) => Err(err.into()),
        }
    }

    /// Codes are bound to their phone and purpose so a hash copied between
    /// rows never verifies.
    fn otp_hash(&self, phone: &str, purpose: OtpPurpose, code: &str) -> String {
        keyed_hash(&otp_message(phone, purpose, code), &self.config.refresh_secret)
    }
}

/// The hashed form of a code is bound to the challenge it was issued for.
fn otp_message(phone: &str, purpose: OtpPurpose, code: &str) -> String {
    format!("{phone}:{purpose}:{code}")
}
