use std::sync::Arc;

use alem_core::auth::AuthService;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool. `None` when the auth service runs over
    /// in-memory stores.
    pub pool: Option<alem_db::DbPool>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// The authentication orchestrator.
    pub auth: Arc<AuthService>,
}
