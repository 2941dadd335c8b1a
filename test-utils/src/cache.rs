//! In-memory implementations of the cache traits.

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use uuid::Uuid;

use aaq_core::cache::{quota_key, QuotaCounter, SessionStore};
use aaq_core::model::ChatSession;
use aaq_core::{Error, Result};

/// Session store backed by a `HashMap`, honoring TTLs via stored deadlines
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<Uuid, (ChatSession, Instant)>>,
    locks: Mutex<HashSet<Uuid>>,
}

impl InMemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: Uuid, ttl: Duration) -> Result<Option<ChatSession>> {
        let mut sessions = self.sessions.lock();
        match sessions.get_mut(&session_id) {
            Some((session, expires_at)) => {
                if *expires_at < Instant::now() {
                    sessions.remove(&session_id);
                    return Ok(None);
                }
                // Slide the TTL on access
                *expires_at = Instant::now() + ttl;
                Ok(Some(session.clone()))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, session: &ChatSession, ttl: Duration) -> Result<()> {
        self.sessions
            .lock()
            .insert(session.session_id, (session.clone(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, session_id: Uuid) -> Result<()> {
        self.sessions.lock().remove(&session_id);
        Ok(())
    }

    async fn try_lock(&self, session_id: Uuid, _ttl: Duration) -> Result<bool> {
        Ok(self.locks.lock().insert(session_id))
    }

    async fn unlock(&self, session_id: Uuid) -> Result<()> {
        self.locks.lock().remove(&session_id);
        Ok(())
    }
}

/// Quota counter backed by a `HashMap`; same check-then-consume atomicity as
/// the Redis implementation, provided by the mutex
#[derive(Default)]
pub struct InMemoryQuotaCounter {
    counters: Mutex<HashMap<String, i64>>,
}

impl InMemoryQuotaCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuotaCounter for InMemoryQuotaCounter {
    async fn check_and_consume(
        &self,
        workspace_id: i64,
        date: NaiveDate,
        limit: Option<i64>,
        cost: i64,
    ) -> Result<i64> {
        let key = quota_key(workspace_id, date);
        let mut counters = self.counters.lock();
        let count = counters.entry(key).or_insert(0);
        if let Some(limit) = limit {
            if *count + cost > limit {
                return Err(Error::QuotaExceeded { workspace_id });
            }
        }
        *count += cost;
        Ok(*count)
    }

    async fn current(&self, workspace_id: i64, date: NaiveDate) -> Result<i64> {
        Ok(*self
            .counters
            .lock()
            .get(&quota_key(workspace_id, date))
            .unwrap_or(&0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn quota_counter_rejects_without_consuming() {
        let counter = InMemoryQuotaCounter::new();
        let date = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();

        assert_eq!(counter.check_and_consume(1, date, Some(2), 1).await.unwrap(), 1);
        assert_eq!(counter.check_and_consume(1, date, Some(2), 1).await.unwrap(), 2);
        assert!(counter.check_and_consume(1, date, Some(2), 1).await.is_err());
        assert_eq!(counter.current(1, date).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn quota_resets_with_the_date() {
        let counter = InMemoryQuotaCounter::new();
        let today = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        let tomorrow = NaiveDate::from_ymd_opt(2026, 8, 2).unwrap();

        counter.check_and_consume(1, today, Some(1), 1).await.unwrap();
        assert!(counter.check_and_consume(1, today, Some(1), 1).await.is_err());
        assert_eq!(counter.check_and_consume(1, tomorrow, Some(1), 1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn session_lock_is_exclusive() {
        let store = InMemorySessionStore::new();
        let id = Uuid::new_v4();
        let ttl = Duration::from_secs(5);

        assert!(store.try_lock(id, ttl).await.unwrap());
        assert!(!store.try_lock(id, ttl).await.unwrap());
        store.unlock(id).await.unwrap();
        assert!(store.try_lock(id, ttl).await.unwrap());
    }
}
