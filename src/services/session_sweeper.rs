use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::db::SessionStore;
use crate::services::metrics::SESSIONS_SWEPT_COUNTER;

/// Spawn a background task that deletes expired sessions every `interval`.
/// Lookups already treat expired rows as absent; this only reclaims space.
pub fn start(sessions: Arc<dyn SessionStore>, interval: Duration) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            sweep_once(sessions.as_ref()).await;
        }
    });
}

pub async fn sweep_once(sessions: &dyn SessionStore) -> u64 {
    match sessions.delete_expired(Utc::now()).await {
        Ok(0) => 0,
        Ok(n) => {
            SESSIONS_SWEPT_COUNTER.with_label_values(&["ok"]).inc_by(n as f64);
            info!("Session sweeper: removed {} expired session(s)", n);
            n
        }
        Err(e) => {
            SESSIONS_SWEPT_COUNTER.with_label_values(&["error"]).inc();
            warn!("Session sweeper: delete failed: {}", e);
            0
        }
    }
}
