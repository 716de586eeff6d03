//! Handlers for the `/auth` resource.
//!
//! Every handler is a thin translation between JSON and
//! [`AuthService`](alem_core::auth::AuthService); all policy lives in the
//! service.

use alem_core::identity::{Identity, Registration, TokenPair};
use alem_core::roles::Role;
use alem_core::types::DbId;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::client::ClientMeta;
use crate::middleware::rbac::RequireAdmin;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /auth/register`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub password: String,
    /// Defaults to `student`. `admin` is rejected.
    pub role: Option<Role>,
}

/// Request body for `POST /auth/login`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for `POST /auth/otp/send`.
#[derive(Debug, Deserialize)]
pub struct SendOtpRequest {
    pub phone: String,
}

/// Request body for `POST /auth/otp/verify`.
#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub phone: String,
    pub code: String,
}

/// Request body for `POST /auth/refresh` and `POST /auth/logout`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Response for a successful registration: the new identity plus its tokens.
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: Identity,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpSentResponse {
    /// Seconds until the issued code expires.
    pub expires_in: i64,
}

#[derive(Debug, Serialize)]
pub struct RevokedResponse {
    /// Number of sessions revoked by this call.
    pub revoked: u64,
}

/// The caller as seen by its access token.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user_id: DbId,
    pub role: Role,
    /// Access token expiry (UTC Unix timestamp).
    pub expires_at: i64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/auth/register
///
/// Create an identity with a password. Returns 201 with the identity and a
/// token pair.
pub async fn register(
    State(state): State<AppState>,
    ClientMeta(client): ClientMeta,
    Json(input): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    let role = input.role.unwrap_or_default();
    if role == Role::Admin {
        return Err(AppError::Forbidden(
            "Admin accounts cannot be self-registered".into(),
        ));
    }

    let registration = Registration {
        first_name: input.first_name,
        last_name: input.last_name,
        email: input.email,
        phone: input.phone,
        password: input.password,
        role,
    };
    let (user, tokens) = state.auth.register(registration, client).await?;

    Ok((StatusCode::CREATED, Json(RegisterResponse { user, tokens })))
}

/// POST /api/v1/auth/login
///
/// Authenticate with email + password.
pub async fn login(
    State(state): State<AppState>,
    ClientMeta(client): ClientMeta,
    Json(input): Json<LoginRequest>,
) -> AppResult<Json<TokenPair>> {
    let pair = state
        .auth
        .login(&input.email, &input.password, client)
        .await?;
    Ok(Json(pair))
}

/// POST /api/v1/auth/otp/send
///
/// Issue a login code to `phone`. Returns 202 whether or not OTP login is
/// enabled.
pub async fn send_otp(
    State(state): State<AppState>,
    Json(input): Json<SendOtpRequest>,
) -> AppResult<(StatusCode, Json<OtpSentResponse>)> {
    state.auth.send_otp(&input.phone).await?;
    let expires_in = state.auth.config().otp.ttl.num_seconds();
    Ok((StatusCode::ACCEPTED, Json(OtpSentResponse { expires_in })))
}

/// POST /api/v1/auth/otp/verify
///
/// Log in with a code, creating a phone-only account on first use.
pub async fn verify_otp(
    State(state): State<AppState>,
    ClientMeta(client): ClientMeta,
    Json(input): Json<VerifyOtpRequest>,
) -> AppResult<Json<TokenPair>> {
    let pair = state
        .auth
        .verify_otp(&input.phone, &input.code, client)
        .await?;
    Ok(Json(pair))
}

/// POST /api/v1/auth/refresh
///
/// Exchange a refresh token for a new pair. The presented token is spent.
pub async fn refresh(
    State(state): State<AppState>,
    ClientMeta(client): ClientMeta,
    Json(input): Json<RefreshRequest>,
) -> AppResult<Json<TokenPair>> {
    let pair = state
        .auth
        .refresh_tokens(&input.refresh_token, client)
        .await?;
    Ok(Json(pair))
}

/// POST /api/v1/auth/logout
///
/// Revoke the session behind a refresh token. Returns 204 No Content.
pub async fn logout(
    State(state): State<AppState>,
    Json(input): Json<RefreshRequest>,
) -> AppResult<StatusCode> {
    state.auth.logout(&input.refresh_token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/auth/logout-all
///
/// Revoke every session of the authenticated user.
pub async fn logout_all(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<RevokedResponse>> {
    let revoked = state.auth.logout_all(user.user_id).await?;
    Ok(Json(RevokedResponse { revoked }))
}

/// GET /api/v1/auth/me
pub async fn me(user: AuthUser) -> Json<MeResponse> {
    Json(MeResponse {
        user_id: user.user_id,
        role: user.role,
        expires_at: user.claims.exp,
    })
}

/// POST /api/v1/auth/admin/users/{id}/logout-all
///
/// Revoke every session of another user. Admin only.
pub async fn admin_logout_all(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(user_id): Path<DbId>,
) -> AppResult<Json<RevokedResponse>> {
    let revoked = state.auth.logout_all(user_id).await?;
    tracing::info!(admin_id = %admin.user_id, %user_id, revoked, "Admin revoked user sessions");
    Ok(Json(RevokedResponse { revoked }))
}
