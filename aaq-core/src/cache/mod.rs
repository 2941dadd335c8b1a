//! # Cache Abstraction
//!
//! Traits over the volatile store: chat session buffers, per-session write
//! locks and daily quota counters. The Redis implementation lives in
//! `aaq-cache-redis`.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::time::Duration;
use uuid::Uuid;

use crate::model::ChatSession;
use crate::Result;

/// Chat session persistence with sliding TTL
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a session and slide its TTL
    async fn load(&self, session_id: Uuid, ttl: Duration) -> Result<Option<ChatSession>>;

    /// Save a session with the given TTL
    async fn save(&self, session: &ChatSession, ttl: Duration) -> Result<()>;

    async fn delete(&self, session_id: Uuid) -> Result<()>;

    /// Try to take the per-session write lock (SETNX with short TTL).
    /// Returns `false` when another writer holds it.
    async fn try_lock(&self, session_id: Uuid, ttl: Duration) -> Result<bool>;

    async fn unlock(&self, session_id: Uuid) -> Result<()>;
}

/// Daily accepted-query accounting.
///
/// The counter key is `(workspace_id, yyyy-mm-dd UTC)`; reset is implicit
/// via the date component.
#[async_trait]
pub trait QuotaCounter: Send + Sync {
    /// Atomically add `cost` to today's counter, failing `QuotaExceeded`
    /// (without consuming) when `count + cost` would exceed `limit`.
    /// Returns the counter value after the increment. A `limit` of `None`
    /// still counts but never rejects.
    async fn check_and_consume(
        &self,
        workspace_id: i64,
        date: NaiveDate,
        limit: Option<i64>,
        cost: i64,
    ) -> Result<i64>;

    /// Current counter value (0 when absent)
    async fn current(&self, workspace_id: i64, date: NaiveDate) -> Result<i64>;
}

/// Counter key shared by every [`QuotaCounter`] implementation
#[must_use]
pub fn quota_key(workspace_id: i64, date: NaiveDate) -> String {
    format!("quota:{workspace_id}:{}", date.format("%Y-%m-%d"))
}

/// Session key shared by every [`SessionStore`] implementation
#[must_use]
pub fn session_key(session_id: Uuid) -> String {
    format!("session:{session_id}")
}

/// Lock key guarding writes to one session
#[must_use]
pub fn session_lock_key(session_id: Uuid) -> String {
    format!("session-lock:{session_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_formats() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        assert_eq!(quota_key(12, date), "quota:12:2026-08-01");

        let id = Uuid::nil();
        assert_eq!(session_key(id), format!("session:{id}"));
        assert_eq!(session_lock_key(id), format!("session-lock:{id}"));
    }
}
