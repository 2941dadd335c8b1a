//! Chat sessions: bounded multi-turn buffers kept in the cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// Speaker of a chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One exchange half inside a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
    pub ts: DateTime<Utc>,
}

impl ChatTurn {
    #[must_use]
    pub fn new(role: TurnRole, content: String) -> Self {
        Self {
            role,
            content,
            ts: Utc::now(),
        }
    }
}

/// Server-side conversation state.
///
/// The turn buffer is bounded: oldest turns are evicted on overflow and each
/// turn is capped at a configured character count, keeping the newest text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub session_id: Uuid,
    pub workspace_id: i64,
    pub user_id: Option<i64>,
    pub turns: VecDeque<ChatTurn>,
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    /// Start an empty session
    #[must_use]
    pub fn new(workspace_id: i64, user_id: Option<i64>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            workspace_id,
            user_id,
            turns: VecDeque::new(),
            updated_at: Utc::now(),
        }
    }

    /// Append a turn, enforcing the turn count and per-turn character caps
    pub fn push_turn(&mut self, mut turn: ChatTurn, max_turns: usize, max_turn_chars: usize) {
        if turn.content.chars().count() > max_turn_chars {
            // Keep the newest text
            let tail: String = turn
                .content
                .chars()
                .rev()
                .take(max_turn_chars)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            turn.content = tail;
        }
        self.turns.push_back(turn);
        while self.turns.len() > max_turns {
            self.turns.pop_front();
        }
        self.updated_at = Utc::now();
    }

    /// Render the buffer as `(role, content)` pairs for prompt assembly
    #[must_use]
    pub fn history(&self) -> Vec<(TurnRole, &str)> {
        self.turns
            .iter()
            .map(|t| (t.role, t.content.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_evicts_oldest() {
        let mut session = ChatSession::new(1, None);
        for i in 0..12 {
            session.push_turn(ChatTurn::new(TurnRole::User, format!("turn {i}")), 10, 4000);
        }
        assert_eq!(session.turns.len(), 10);
        assert_eq!(session.turns.front().unwrap().content, "turn 2");
        assert_eq!(session.turns.back().unwrap().content, "turn 11");
    }

    #[test]
    fn oversized_turn_keeps_newest_chars() {
        let mut session = ChatSession::new(1, None);
        session.push_turn(ChatTurn::new(TurnRole::User, "abcdefgh".to_string()), 10, 5);
        assert_eq!(session.turns[0].content, "defgh");
    }
}
