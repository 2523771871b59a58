use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

use super::{ensure_ttl, hit_id, TtlCache, WindowHits};

struct Entry {
    value: String,
    expires_at: Instant,
}

struct Window {
    span: chrono::Duration,
    hits: Vec<(DateTime<Utc>, String)>,
}

/// Process-local [`TtlCache`]. Expiry follows the tokio clock, so tests can
/// drive it with `tokio::time::pause` / `advance`.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
    windows: Mutex<HashMap<String, Window>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live keys starting with `prefix`.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let now = Instant::now();
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && e.expires_at > now)
            .map(|(k, _)| k.clone())
            .collect()
    }
}

#[async_trait]
impl TtlCache for MemoryCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()> {
        ensure_ttl(ttl)?;
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.remove(key);
        Ok(())
    }

    async fn record_hit(
        &self,
        key: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> anyhow::Result<WindowHits> {
        ensure_ttl(window)?;
        let span = chrono::Duration::from_std(window)?;
        let mut windows = self.windows.lock().unwrap_or_else(|p| p.into_inner());

        // Windows whose newest hit has aged out are gone, like an expired Redis key.
        windows.retain(|_, w| w.hits.iter().any(|(at, _)| *at > now - w.span));

        let entry = windows.entry(key.to_string()).or_insert_with(|| Window {
            span,
            hits: Vec::new(),
        });
        entry.span = span;
        entry.hits.retain(|(at, _)| *at > now - span);
        let previous = entry.hits.iter().map(|(at, _)| *at).max();
        let hit = hit_id(now);
        entry.hits.push((now, hit.clone()));
        Ok(WindowHits {
            count: entry.hits.len() as u64,
            previous,
            hit,
        })
    }

    async fn forget_hit(&self, key: &str, hit: &str) -> anyhow::Result<()> {
        let mut windows = self.windows.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(entry) = windows.get_mut(key) {
            entry.hits.retain(|(_, id)| id != hit);
            if entry.hits.is_empty() {
                windows.remove(key);
            }
        }
        Ok(())
    }
}
