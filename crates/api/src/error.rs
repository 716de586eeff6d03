use alem_core::error::{AuthError, StoreError, TokenError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Message shared by every failed password or OTP login so responses never
/// reveal whether an account exists.
pub const INVALID_CREDENTIALS: &str = "Invalid credentials";
pub const INVALID_REFRESH: &str = "Invalid refresh token";
pub const INVALID_TOKEN: &str = "Invalid or expired token";

/// Application-level error type for HTTP handlers.
///
/// Wraps [`AuthError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `alem_core`.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Missing or malformed credentials on a protected route.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        AppError::Auth(AuthError::Token(err))
    }
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Auth(err) => classify_auth_error(err),

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

/// Classify a domain error into an HTTP status, error code, and message.
///
/// - Every enumeration-sensitive kind maps to 401 with a fixed message.
/// - Expired access tokens get `TOKEN_EXPIRED` so clients refresh silently.
/// - Duplicates map to 409, validation to 400, store outages to 503.
fn classify_auth_error(err: &AuthError) -> (StatusCode, &'static str, String) {
    match err {
        AuthError::UserNotFound | AuthError::InvalidCredentials | AuthError::InvalidOtp(_) => (
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            INVALID_CREDENTIALS.to_string(),
        ),
        AuthError::InvalidRefresh => (
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            INVALID_REFRESH.to_string(),
        ),
        AuthError::Token(TokenError::Expired) => (
            StatusCode::UNAUTHORIZED,
            "TOKEN_EXPIRED",
            INVALID_TOKEN.to_string(),
        ),
        AuthError::Token(TokenError::Signing(msg)) => {
            tracing::error!(error = %msg, "Token signing failed");
            internal()
        }
        AuthError::Token(_) => (
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            INVALID_TOKEN.to_string(),
        ),
        AuthError::DuplicateEmail => (
            StatusCode::CONFLICT,
            "CONFLICT",
            "Email is already registered".to_string(),
        ),
        AuthError::DuplicatePhone => (
            StatusCode::CONFLICT,
            "CONFLICT",
            "Phone number is already registered".to_string(),
        ),
        AuthError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        AuthError::Store(StoreError::Unavailable(msg)) => {
            tracing::error!(error = %msg, "Store unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                "Service temporarily unavailable".to_string(),
            )
        }
        AuthError::Store(other) => {
            tracing::error!(error = %other, "Unexpected store error");
            internal()
        }
        AuthError::Delivery(msg) => {
            tracing::error!(error = %msg, "OTP delivery failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "DELIVERY_FAILED",
                "Could not send the code, try again later".to_string(),
            )
        }
        AuthError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal auth error");
            internal()
        }
    }
}
