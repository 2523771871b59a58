use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use super::{ensure_ttl, hit_id, TtlCache, WindowHits};

#[derive(Clone)]
pub struct RedisCache {
    conn: MultiplexedConnection,
}

impl RedisCache {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl TtlCache for RedisCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()> {
        ensure_ttl(ttl)?;
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }

    /// One sorted set per key, scored by hit time in milliseconds.
    async fn record_hit(
        &self,
        key: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> anyhow::Result<WindowHits> {
        ensure_ttl(window)?;
        let mut conn = self.conn.clone();
        let now_ms = now.timestamp_millis();
        let window_ms = window.as_millis() as i64;
        let member = hit_id(now);

        let (latest, count): (Vec<(String, f64)>, u64) = redis::pipe()
            .atomic()
            .cmd("ZREMRANGEBYSCORE")
            .arg(key)
            .arg("-inf")
            .arg(now_ms - window_ms)
            .ignore()
            .cmd("ZREVRANGE")
            .arg(key)
            .arg(0)
            .arg(0)
            .arg("WITHSCORES")
            .cmd("ZADD")
            .arg(key)
            .arg(now_ms)
            .arg(&member)
            .ignore()
            .cmd("ZCARD")
            .arg(key)
            .cmd("PEXPIRE")
            .arg(key)
            .arg(window_ms)
            .ignore()
            .query_async(&mut conn)
            .await?;

        let previous = latest
            .first()
            .and_then(|(_, score)| DateTime::from_timestamp_millis(*score as i64));

        Ok(WindowHits {
            count,
            previous,
            hit: member,
        })
    }

    async fn forget_hit(&self, key: &str, hit: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("ZREM").arg(key).arg(hit).query_async(&mut conn).await?;
        Ok(())
    }
}
