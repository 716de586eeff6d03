//! Request extractors.
//!
//! - [`auth::AuthUser`] -- Extracts the authenticated user from a Bearer access token.
//! - [`rbac::RequireAdmin`] -- Requires the `admin` role.
//! - [`client::ClientMeta`] -- User agent and client IP recorded on sessions.

pub mod auth;
pub mod client;
pub mod rbac;
