pub mod auth;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /auth/register                       register (public)
/// /auth/login                          password login (public)
/// /auth/otp/send                       issue login code (public)
/// /auth/otp/verify                     OTP login (public)
/// /auth/refresh                        rotate refresh token (public)
/// /auth/logout                         revoke one session (public)
/// /auth/logout-all                     revoke own sessions (requires auth)
/// /auth/me                             current claims (requires auth)
/// /auth/admin/users/{id}/logout-all    revoke a user's sessions (admin only)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/auth", auth::router())
}
