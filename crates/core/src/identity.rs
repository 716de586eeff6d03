//! Identity records, token pairs, and contact normalization.

use serde::{Deserialize, Serialize};
use validator::ValidateEmail;

use crate::roles::Role;
use crate::types::{DbId, Timestamp};

/// One human account.
///
/// The password hash is kept out of this type on purpose; stores return it
/// separately (see [`StoredCredential`](crate::store::StoredCredential)) so it
/// can never be serialized outward by accident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: DbId,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Role,
    pub created_at: Timestamp,
}

/// The empty profile written alongside a new identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewProfile {
    pub first_name: String,
    pub last_name: String,
}

/// Access and refresh tokens returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    /// Refresh token lifetime in seconds.
    pub refresh_expires_in: i64,
}

/// Audit metadata recorded on each session. Never used for authorization.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub user_agent: Option<String>,
    pub ip: Option<String>,
}

/// Input for [`AuthService::register`](crate::auth::AuthService::register).
#[derive(Debug, Clone)]
pub struct Registration {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub password: String,
    pub role: Role,
}

/// Trim and lowercase an email, then check its shape.
pub fn normalize_email(raw: &str) -> Result<String, String> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err("Email is required".into());
    }
    if !email.validate_email() {
        return Err(format!("'{email}' is not a valid email address"));
    }
    Ok(email)
}

/// Normalize a phone number to `+` followed by 8-15 digits.
///
/// Spaces, dashes, dots and parentheses are stripped. A leading `00`
/// international prefix is accepted in place of `+`.
pub fn normalize_phone(raw: &str) -> Result<String, String> {
    let compact: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();

    let digits = if let Some(rest) = compact.strip_prefix('+') {
        rest
    } else if let Some(rest) = compact.strip_prefix("00") {
        rest
    } else {
        return Err("Phone number must start with a country code (+...)".into());
    };

    if !(8..=15).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err("Phone number must contain 8 to 15 digits".into());
    }
    if digits.starts_with('0') {
        return Err("Country code cannot start with 0".into());
    }
    Ok(format!("+{digits}"))
}

/// Mask all but the last two digits of a phone number for logging.
pub fn mask_phone(phone: &str) -> String {
    let len = phone.chars().count();
    phone
        .chars()
        .enumerate()
        .map(|(i, c)| {
            if (i == 0 && c == '+') || i + 2 >= len {
                c
            } else {
                '*'
            }
        })
        .collect()
}
