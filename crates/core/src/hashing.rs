//! Keyed one-way hashing for refresh tokens and OTP codes.
//!
//! Values are hashed with HMAC-SHA256 under a server secret, so a leaked
//! sessions or OTP table cannot be checked offline without the secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn mac_of(value: &str, secret: &str) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(value.as_bytes());
    mac
}

/// Compute the hex-encoded HMAC-SHA256 of `value` under `secret`.
pub fn keyed_hash(value: &str, secret: &str) -> String {
    hex::encode(mac_of(value, secret).finalize().into_bytes())
}

/// Check `value` against a hex digest produced by [`keyed_hash`].
///
/// The tag comparison is constant-time. A digest that is not valid hex never
/// matches.
pub fn verify_keyed_hash(value: &str, secret: &str, expected_hex: &str) -> bool {
    match hex::decode(expected_hex) {
        Ok(expected) => mac_of(value, secret).verify_slice(&expected).is_ok(),
        Err(_) => false,
    }
}
