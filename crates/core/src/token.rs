//! Stateless signing and verification of access and refresh tokens.
//!
//! Tokens are HMAC-signed JWTs carrying [`Claims`]. Access and refresh tokens
//! share the claim layout but are signed with different secrets, so a refresh
//! token can never pass as an access token unless the secrets are shared.
//!
//! [`TokenService::verify`] is the contract every downstream service
//! replicates: same access secret, same algorithm family, same issuer and
//! audience.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TokenError;
use crate::roles::Role;
use crate::types::DbId;

/// Claims embedded in every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// The identity id.
    pub user_id: DbId,
    pub role: Role,
    pub iss: String,
    pub aud: String,
    /// Subject -- always the identity id rendered as a string.
    pub sub: String,
    /// Issued-at time (UTC Unix timestamp).
    pub iat: i64,
    /// Expiration time (UTC Unix timestamp).
    pub exp: i64,
    /// Unique token identifier; keeps two tokens minted in the same second
    /// distinct.
    pub jti: String,
}

/// Signs and verifies tokens for a fixed issuer and audience.
#[derive(Debug, Clone)]
pub struct TokenService {
    issuer: String,
    audience: String,
}

impl TokenService {
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
        }
    }

    /// Sign a token for `user_id` that expires `ttl` from now.
    ///
    /// A negative `ttl` produces an already-expired token.
    pub fn sign(
        &self,
        user_id: DbId,
        role: Role,
        secret: &str,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            user_id,
            role,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            sub: user_id.to_string(),
            iat: now,
            exp: now + ttl.num_seconds(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify `token` against `secret` and return its claims.
    ///
    /// Only the HMAC family is accepted; a token declaring any other
    /// algorithm is rejected before its signature is checked. Expiry is
    /// enforced with zero leeway.
    pub fn verify(&self, token: &str, secret: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )
        .map_err(|e| classify(e.kind()))?;

        let claims = data.claims;
        if claims.sub != claims.user_id.to_string() {
            return Err(TokenError::Unverifiable(
                "subject does not match user id".into(),
            ));
        }
        Ok(claims)
    }
}

fn classify(kind: &ErrorKind) -> TokenError {
    match kind {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::InvalidSignature => TokenError::BadSignature,
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_)
        | ErrorKind::MissingRequiredClaim(_) => TokenError::Malformed,
        ErrorKind::InvalidAlgorithm | ErrorKind::MissingAlgorithm => {
            TokenError::Unverifiable("unexpected signing algorithm".into())
        }
        ErrorKind::InvalidIssuer => TokenError::Unverifiable("unexpected issuer".into()),
        ErrorKind::InvalidAudience => TokenError::Unverifiable("unexpected audience".into()),
        ErrorKind::ImmatureSignature => TokenError::Unverifiable("token not yet valid".into()),
        other => TokenError::Unverifiable(format!("{other:?}")),
    }
}
