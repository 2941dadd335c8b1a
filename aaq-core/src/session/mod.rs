//! Chat session lifecycle over the cache-backed [`SessionStore`].
//!
//! Sessions are server-side; clients pass an opaque `session_id`. Writes to
//! one session serialize through the store's per-session lock so concurrent
//! requests cannot interleave their turn pairs.

use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::cache::SessionStore;
use crate::config::SessionSettings;
use crate::constants::SESSION_LOCK_TTL_SECS;
use crate::error::{Error, Result};
use crate::model::{ChatSession, ChatTurn, TurnRole};

/// How long a writer waits for the per-session lock before giving up
const LOCK_WAIT: Duration = Duration::from_secs(2);
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Session manager bounding the buffer and serializing writers
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    settings: SessionSettings,
}

impl SessionManager {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, settings: SessionSettings) -> Self {
        Self { store, settings }
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(self.settings.ttl_secs)
    }

    /// Load an existing session (sliding its TTL) or start a fresh one.
    ///
    /// A stale or unknown id starts a fresh session rather than erroring:
    /// expiry is an expected lifecycle event, not a caller mistake. A
    /// session belonging to another workspace is treated as unknown.
    pub async fn get_or_create(
        &self,
        session_id: Option<Uuid>,
        workspace_id: i64,
        user_id: Option<i64>,
    ) -> Result<ChatSession> {
        if let Some(id) = session_id {
            if let Some(session) = self.store.load(id, self.ttl()).await? {
                if session.workspace_id == workspace_id {
                    return Ok(session);
                }
                tracing::warn!(session_id = %id, "session belongs to another workspace");
            }
        }
        let session = ChatSession::new(workspace_id, user_id);
        self.store.save(&session, self.ttl()).await?;
        Ok(session)
    }

    /// Record one user/assistant exchange under the per-session lock
    pub async fn append_exchange(
        &self,
        session_id: Uuid,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<()> {
        self.with_lock(session_id, |session| {
            session.push_turn(
                ChatTurn::new(TurnRole::User, user_text.to_string()),
                self.settings.max_turns,
                self.settings.max_turn_chars,
            );
            session.push_turn(
                ChatTurn::new(TurnRole::Assistant, assistant_text.to_string()),
                self.settings.max_turns,
                self.settings.max_turn_chars,
            );
        })
        .await
    }

    /// Drop a session explicitly
    pub async fn end(&self, session_id: Uuid) -> Result<()> {
        self.store.delete(session_id).await
    }

    async fn with_lock(&self, session_id: Uuid, mutate: impl FnOnce(&mut ChatSession)) -> Result<()> {
        let lock_ttl = Duration::from_secs(SESSION_LOCK_TTL_SECS);
        let deadline = tokio::time::Instant::now() + LOCK_WAIT;

        loop {
            if self.store.try_lock(session_id, lock_ttl).await? {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::Cache(format!(
                    "timed out waiting for session lock {session_id}"
                )));
            }
            tokio::time::sleep(LOCK_RETRY_DELAY).await;
        }

        let result = async {
            let mut session = self
                .store
                .load(session_id, self.ttl())
                .await?
                .ok_or_else(|| Error::NotFound(format!("session {session_id}")))?;
            mutate(&mut session);
            self.store.save(&session, self.ttl()).await
        }
        .await;

        // Release even when the mutation failed
        if let Err(e) = self.store.unlock(session_id).await {
            tracing::warn!(error = %e, %session_id, "failed to release session lock");
        }

        result
    }
}
