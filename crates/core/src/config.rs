//! Immutable authentication configuration.
//!
//! Built once at process start (see `alem_api::config::ServerConfig::from_env`)
//! and shared read-only by the token service and the orchestrator.

use std::fmt;

use chrono::Duration;

/// Default access token lifetime in minutes.
pub const DEFAULT_ACCESS_EXPIRY_MINS: i64 = 15;
/// Default refresh token lifetime in days.
pub const DEFAULT_REFRESH_EXPIRY_DAYS: i64 = 30;
/// Default OTP lifetime in seconds.
pub const DEFAULT_OTP_TTL_SECS: i64 = 120;
/// Default number of digits in an OTP code.
pub const DEFAULT_OTP_LENGTH: usize = 6;
/// Default number of wrong OTP submissions before a challenge is dead.
pub const DEFAULT_MAX_OTP_ATTEMPTS: u32 = 5;
/// Default minimum password length.
pub const DEFAULT_MIN_PASSWORD_LENGTH: usize = 8;

const MIN_OTP_LENGTH: usize = 4;
const MAX_OTP_LENGTH: usize = 10;

/// One-time passcode settings.
#[derive(Debug, Clone)]
pub struct OtpConfig {
    /// When false, `send_otp` succeeds without issuing anything.
    pub enabled: bool,
    pub ttl: Duration,
    /// Number of decimal digits.
    pub length: usize,
    pub max_attempts: u32,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::seconds(DEFAULT_OTP_TTL_SECS),
            length: DEFAULT_OTP_LENGTH,
            max_attempts: DEFAULT_MAX_OTP_ATTEMPTS,
        }
    }
}

/// Secrets, lifetimes and claim values for token issuance.
#[derive(Clone)]
pub struct AuthConfig {
    /// HMAC secret for access tokens.
    pub access_secret: String,
    /// HMAC secret for refresh tokens, also the key for refresh-token and OTP
    /// hashes. Falls back to `access_secret` when empty.
    pub refresh_secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub otp: OtpConfig,
    pub min_password_length: usize,
}

impl AuthConfig {
    /// Config with default lifetimes and the given access secret.
    pub fn new(access_secret: impl Into<String>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: String::new(),
            issuer: "alem-auth".to_string(),
            audience: "alem-clients".to_string(),
            access_ttl: Duration::minutes(DEFAULT_ACCESS_EXPIRY_MINS),
            refresh_ttl: Duration::days(DEFAULT_REFRESH_EXPIRY_DAYS),
            otp: OtpConfig::default(),
            min_password_length: DEFAULT_MIN_PASSWORD_LENGTH,
        }
    }

    /// Apply fallbacks and clamps.
    ///
    /// - An empty refresh secret is replaced by the access secret.
    /// - A zero attempt cap becomes [`DEFAULT_MAX_OTP_ATTEMPTS`].
    /// - OTP length is clamped to 4..=10 digits.
    pub fn normalized(mut self) -> Self {
        if self.refresh_secret.is_empty() {
            tracing::warn!(
                "Refresh token secret not configured; reusing the access secret. \
                 Set a distinct refresh secret in production."
            );
            self.refresh_secret = self.access_secret.clone();
        }
        if self.otp.max_attempts == 0 {
            self.otp.max_attempts = DEFAULT_MAX_OTP_ATTEMPTS;
        }
        self.otp.length = self.otp.length.clamp(MIN_OTP_LENGTH, MAX_OTP_LENGTH);
        self
    }

    /// Reject configurations that cannot produce verifiable tokens.
    pub fn validate(&self) -> Result<(), String> {
        if self.access_secret.is_empty() {
            return Err("access secret must not be empty".into());
        }
        if self.access_ttl <= Duration::zero() {
            return Err("access token lifetime must be positive".into());
        }
        if self.refresh_ttl <= Duration::zero() {
            return Err("refresh token lifetime must be positive".into());
        }
        if self.otp.ttl <= Duration::zero() {
            return Err("OTP lifetime must be positive".into());
        }
        Ok(())
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("access_secret", &"<redacted>")
            .field("refresh_secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("otp", &self.otp)
            .field("min_password_length", &self.min_password_length)
            .finish()
    }
}
