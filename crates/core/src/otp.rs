//! One-time passcode generation and purposes.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::identity::mask_phone;

/// Namespace of a challenge. Codes issued for one purpose never verify
/// another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtpPurpose {
    Login,
    Verify,
}

impl OtpPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            OtpPurpose::Login => "login",
            OtpPurpose::Verify => "verify",
        }
    }
}

impl fmt::Display for OtpPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OtpPurpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "login" => Ok(OtpPurpose::Login),
            "verify" => Ok(OtpPurpose::Verify),
            other => Err(format!("unknown OTP purpose: {other}")),
        }
    }
}

/// Generate a numeric code of exactly `length` digits.
///
/// Uses the thread-local CSPRNG; leading zeros are allowed.
pub fn generate_code(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

/// Outbound channel for OTP codes (SMS gateway).
#[async_trait]
pub trait OtpDelivery: Send + Sync {
    async fn deliver(&self, phone: &str, purpose: OtpPurpose, code: &str) -> Result<(), String>;
}

/// Records that a code was dispatched without revealing it. Used until an SMS
/// gateway is wired in.
#[derive(Debug, Default)]
pub struct LogOnlyDelivery;

#[async_trait]
impl OtpDelivery for LogOnlyDelivery {
    async fn deliver(&self, phone: &str, purpose: OtpPurpose, _code: &str) -> Result<(), String> {
        tracing::info!(phone = %mask_phone(phone), %purpose, "OTP issued (no SMS gateway configured)");
        Ok(())
    }
}

/// Keeps every delivered code in memory so tests can read them back.
#[derive(Debug, Default)]
pub struct RecordingDelivery {
    sent: Mutex<Vec<(String, OtpPurpose, String)>>,
}

impl RecordingDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent code delivered to `phone`.
    pub async fn last_code(&self, phone: &str) -> Option<String> {
        self.sent
            .lock()
            .await
            .iter()
            .rev()
            .find(|(p, _, _)| p == phone)
            .map(|(_, _, code)| code.clone())
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl OtpDelivery for RecordingDelivery {
    async fn deliver(&self, phone: &str, purpose: OtpPurpose, code: &str) -> Result<(), String> {
        self.sent
            .lock()
            .await
            .push((phone.to_string(), purpose, code.to_string()));
        Ok(())
    }
}
