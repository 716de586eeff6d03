use std::fmt::Display;
use std::str::FromStr;

use alem_core::config::{
    AuthConfig, DEFAULT_ACCESS_EXPIRY_MINS, DEFAULT_MAX_OTP_ATTEMPTS, DEFAULT_MIN_PASSWORD_LENGTH,
    DEFAULT_OTP_LENGTH, DEFAULT_OTP_TTL_SECS, DEFAULT_REFRESH_EXPIRY_DAYS,
};
use chrono::Duration;

/// Server configuration loaded from environment variables.
///
/// Everything except the database URL and the access secret has a default
/// suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8080`).
    pub port: u16,
    pub database_url: String,
    /// Upper bound on pooled connections (default: `20`).
    pub db_max_connections: u32,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Token, OTP and password settings handed to the auth service.
    pub auth: AuthConfig,
}

impl ServerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                   | Default                 |
    /// |---------------------------|-------------------------|
    /// | `HOST`                    | `0.0.0.0`               |
    /// | `PORT`                    | `8080`                  |
    /// | `DATABASE_URL`            | **required**            |
    /// | `DB_MAX_CONNECTIONS`      | `20`                    |
    /// | `CORS_ORIGINS`            | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`                    |
    /// | `JWT_ACCESS_SECRET`       | **required**            |
    /// | `JWT_REFRESH_SECRET`      | access secret           |
    /// | `JWT_ACCESS_EXPIRY_MINS`  | `15`                    |
    /// | `JWT_REFRESH_EXPIRY_DAYS` | `30`                    |
    /// | `JWT_ISSUER`              | `alem-auth`             |
    /// | `JWT_AUDIENCE`            | `alem-clients`          |
    /// | `OTP_ENABLED`             | `true`                  |
    /// | `OTP_TTL_SECS`            | `120`                   |
    /// | `OTP_LENGTH`              | `6`                     |
    /// | `OTP_MAX_ATTEMPTS`        | `5`                     |
    /// | `PASSWORD_MIN_LENGTH`     | `8`                     |
    ///
    /// # Panics
    ///
    /// Panics naming the offending variable if a required one is missing or
    /// any value fails to parse.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let required = |key: &str| var(key).unwrap_or_else(|| panic!("{key} must be set"));

        fn parsed<T>(key: &str, value: Option<String>, default: T) -> T
        where
            T: FromStr,
            T::Err: Display,
        {
            match value {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .unwrap_or_else(|e| panic!("{key} is invalid ('{raw}'): {e}")),
                None => default,
            }
        }
        let num = |key: &str, default: i64| parsed(key, var(key), default);

        let cors_origins: Vec<String> = var("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let mut auth = AuthConfig::new(required("JWT_ACCESS_SECRET"));
        auth.refresh_secret = var("JWT_REFRESH_SECRET").unwrap_or_default();
        if let Some(issuer) = var("JWT_ISSUER") {
            auth.issuer = issuer;
        }
        if let Some(audience) = var("JWT_AUDIENCE") {
            auth.audience = audience;
        }
        auth.access_ttl = Duration::minutes(num("JWT_ACCESS_EXPIRY_MINS", DEFAULT_ACCESS_EXPIRY_MINS));
        auth.refresh_ttl = Duration::days(num("JWT_REFRESH_EXPIRY_DAYS", DEFAULT_REFRESH_EXPIRY_DAYS));
        auth.otp.enabled = parsed("OTP_ENABLED", var("OTP_ENABLED"), true);
        auth.otp.ttl = Duration::seconds(num("OTP_TTL_SECS", DEFAULT_OTP_TTL_SECS));
        auth.otp.length = parsed("OTP_LENGTH", var("OTP_LENGTH"), DEFAULT_OTP_LENGTH);
        auth.otp.max_attempts = parsed(
            "OTP_MAX_ATTEMPTS",
            var("OTP_MAX_ATTEMPTS"),
            DEFAULT_MAX_OTP_ATTEMPTS,
        );
        auth.min_password_length = parsed(
            "PASSWORD_MIN_LENGTH",
            var("PASSWORD_MIN_LENGTH"),
            DEFAULT_MIN_PASSWORD_LENGTH,
        );
        if let Err(e) = auth.validate() {
            panic!("Invalid auth configuration: {e}");
        }

        Self {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed("PORT", var("PORT"), 8080),
            database_url: required("DATABASE_URL"),
            db_max_connections: parsed("DB_MAX_CONNECTIONS", var("DB_MAX_CONNECTIONS"), 20),
            cors_origins,
            request_timeout_secs: parsed("REQUEST_TIMEOUT_SECS", var("REQUEST_TIMEOUT_SECS"), 30),
            auth,
        }
    }
}
