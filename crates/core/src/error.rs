//! Error kinds for the authentication core.
//!
//! Store errors are translated into [`AuthError`] at the orchestrator
//! boundary; raw driver errors never cross it.

/// Failure to verify or sign a token.
///
/// Callers branch on these: only [`TokenError::Expired`] warrants a silent
/// refresh, everything else forces re-authentication.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("token signature is invalid")]
    BadSignature,

    #[error("token is malformed")]
    Malformed,

    #[error("token cannot be verified: {0}")]
    Unverifiable(String),

    #[error("token signing failed: {0}")]
    Signing(String),
}

/// Failure reported by a persistence backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,

    #[error("phone already registered")]
    DuplicatePhone,

    /// Transient backend failure (connection loss, timeout, pool exhaustion).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Why an OTP verification was rejected. Only used for internal logging;
/// callers see a single unauthorized outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpRejection {
    /// No pending, unexpired, unconsumed challenge.
    NoChallenge,
    /// The challenge already reached the attempt cap.
    AttemptsExhausted,
    /// The submitted code did not match.
    Mismatch,
    /// A concurrent verification consumed the challenge first.
    AlreadyConsumed,
}

impl std::fmt::Display for OtpRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            OtpRejection::NoChallenge => "no active challenge",
            OtpRejection::AttemptsExhausted => "attempts exhausted",
            OtpRejection::Mismatch => "code mismatch",
            OtpRejection::AlreadyConsumed => "already consumed",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("email already registered")]
    DuplicateEmail,

    #[error("phone already registered")]
    DuplicatePhone,

    #[error("user not found")]
    UserNotFound,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid refresh token")]
    InvalidRefresh,

    #[error("invalid one-time code: {0}")]
    InvalidOtp(OtpRejection),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(StoreError),

    #[error("OTP delivery failed: {0}")]
    Delivery(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Kinds that external callers must see as one generic "unauthorized",
    /// so responses never reveal whether an account exists.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            AuthError::UserNotFound
                | AuthError::InvalidCredentials
                | AuthError::InvalidOtp(_)
                | AuthError::InvalidRefresh
                | AuthError::Token(_)
        )
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail => AuthError::DuplicateEmail,
            StoreError::DuplicatePhone => AuthError::DuplicatePhone,
            other => AuthError::Store(other),
        }
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
