//! # Redis Cache Backend
//!
//! Redis implementations of the `aaq-core` cache traits: chat session
//! buffers with sliding TTLs, per-session write locks (`SET NX` with a
//! short expiry) and atomic daily quota counters keyed
//! `quota:{workspace_id}:{yyyy-mm-dd}`.

use async_trait::async_trait;
use chrono::NaiveDate;
use redis::aio::ConnectionManager;
use std::time::Duration;
use uuid::Uuid;

use aaq_core::cache::{quota_key, session_key, session_lock_key, QuotaCounter, SessionStore};
use aaq_core::constants::QUOTA_KEY_TTL_SECS;
use aaq_core::model::ChatSession;
use aaq_core::{Error, Result};

/// Cache backend over one shared connection manager
#[derive(Clone)]
pub struct RedisCache {
    connection: ConnectionManager,
}

impl RedisCache {
    /// Connect and return the cache handle
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| Error::Cache(format!("invalid Redis URL: {e}")))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| Error::Cache(format!("failed to connect to Redis: {e}")))?;
        tracing::info!("connected to Redis");
        Ok(Self { connection })
    }

    fn conn(&self) -> ConnectionManager {
        self.connection.clone()
    }
}

#[async_trait]
impl SessionStore for RedisCache {
    async fn load(&self, session_id: Uuid, ttl: Duration) -> Result<Option<ChatSession>> {
        let mut con = self.conn();
        let raw: Option<String> = redis::cmd("GETEX")
            .arg(session_key(session_id))
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async(&mut con)
            .await
            .map_err(|e| Error::Cache(format!("session load: {e}")))?;

        raw.map(|raw| serde_json::from_str(&raw).map_err(Error::from))
            .transpose()
    }

    async fn save(&self, session: &ChatSession, ttl: Duration) -> Result<()> {
        let mut con = self.conn();
        let raw = serde_json::to_string(session)?;
        redis::cmd("SET")
            .arg(session_key(session.session_id))
            .arg(raw)
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async::<()>(&mut con)
            .await
            .map_err(|e| Error::Cache(format!("session save: {e}")))
    }

    async fn delete(&self, session_id: Uuid) -> Result<()> {
        let mut con = self.conn();
        redis::cmd("DEL")
            .arg(session_key(session_id))
            .query_async::<()>(&mut con)
            .await
            .map_err(|e| Error::Cache(format!("session delete: {e}")))
    }

    async fn try_lock(&self, session_id: Uuid, ttl: Duration) -> Result<bool> {
        let mut con = self.conn();
        let acquired: Option<String> = redis::cmd("SET")
            .arg(session_lock_key(session_id))
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut con)
            .await
            .map_err(|e| Error::Cache(format!("session lock: {e}")))?;
        Ok(acquired.is_some())
    }

    async fn unlock(&self, session_id: Uuid) -> Result<()> {
        let mut con = self.conn();
        redis::cmd("DEL")
            .arg(session_lock_key(session_id))
            .query_async::<()>(&mut con)
            .await
            .map_err(|e| Error::Cache(format!("session unlock: {e}")))
    }
}

#[async_trait]
impl QuotaCounter for RedisCache {
    async fn check_and_consume(
        &self,
        workspace_id: i64,
        date: NaiveDate,
        limit: Option<i64>,
        cost: i64,
    ) -> Result<i64> {
        let key = quota_key(workspace_id, date);
        let mut con = self.conn();

        let count: i64 = redis::cmd("INCRBY")
            .arg(&key)
            .arg(cost)
            .query_async(&mut con)
            .await
            .map_err(|e| Error::Cache(format!("quota increment: {e}")))?;

        // First increment of the day sets the expiry; the date component
        // makes the reset implicit, the TTL just bounds key growth
        if count == cost {
            redis::cmd("EXPIRE")
                .arg(&key)
                .arg(QUOTA_KEY_TTL_SECS)
                .query_async::<()>(&mut con)
                .await
                .map_err(|e| Error::Cache(format!("quota expire: {e}")))?;
        }

        if let Some(limit) = limit {
            if count > limit {
                // Undo this request's share; concurrent winners keep theirs
                redis::cmd("DECRBY")
                    .arg(&key)
                    .arg(cost)
                    .query_async::<()>(&mut con)
                    .await
                    .map_err(|e| Error::Cache(format!("quota rollback: {e}")))?;
                return Err(Error::QuotaExceeded { workspace_id });
            }
        }

        Ok(count)
    }

    async fn current(&self, workspace_id: i64, date: NaiveDate) -> Result<i64> {
        let mut con = self.conn();
        let count: Option<i64> = redis::cmd("GET")
            .arg(quota_key(workspace_id, date))
            .query_async(&mut con)
            .await
            .map_err(|e| Error::Cache(format!("quota read: {e}")))?;
        Ok(count.unwrap_or(0))
    }
}
