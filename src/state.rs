use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::services::auth::AuthService;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub config: Arc<Config>,
    /// Probed by `/health`. Absent when running on in-memory stores.
    pub db: Option<PgPool>,
}
