//! Conversation state
//!
//! Per-session, append-only log of answered turns. Prompts never see the
//! whole log, only the window returned by [`ConversationState::recent`].

use crate::llm::ChatMessage;
use crate::router::RouteDecision;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One answered question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub question: String,
    pub answer: String,
    pub route: RouteDecision,
    /// SQL that was executed for this turn, if any
    #[serde(default)]
    pub sql: Option<String>,
    pub asked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationState {
    turns: Vec<TurnRecord>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: TurnRecord) {
        self.turns.push(record);
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> &[TurnRecord] {
        &self.turns
    }

    /// The last `window` turns, oldest first
    pub fn recent(&self, window: usize) -> &[TurnRecord] {
        let start = self.turns.len().saturating_sub(window);
        &self.turns[start..]
    }
}

impl TurnRecord {
    /// The turn as a user/assistant message pair. With `include_sql` the
    /// executed SQL is appended to the assistant side so follow-ups can refer
    /// to it.
    pub fn to_messages(&self, include_sql: bool) -> [ChatMessage; 2] {
        let answer = match (&self.sql, include_sql) {
            (Some(sql), true) => format!("{}\n\nSQL: {}", self.answer, sql),
            _ => self.answer.clone(),
        };
        [ChatMessage::user(self.question.clone()), ChatMessage::assistant(answer)]
    }
}

/// Flatten turns into prompt history, oldest first
pub fn history_messages(turns: &[TurnRecord], include_sql: bool) -> Vec<ChatMessage> {
    turns.iter().flat_map(|t| t.to_messages(include_sql)).collect()
}

/// An interactive session; owns its conversation exclusively
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub conversation: ConversationState,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation: ConversationState::new(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(question: &str) -> TurnRecord {
        TurnRecord {
            question: question.to_string(),
            answer: format!("answer to {}", question),
            route: RouteDecision::Sql,
            sql: None,
            asked_at: Utc::now(),
        }
    }

    #[test]
    fn test_recent_window_keeps_order() {
        let mut state = ConversationState::new();
        for q in ["a", "b", "c", "d"] {
            state.record(turn(q));
        }
        let recent: Vec<&str> = state.recent(2).iter().map(|t| t.question.as_str()).collect();
        assert_eq!(recent, vec!["c", "d"]);
        assert_eq!(state.recent(10).len(), 4);
        assert!(state.recent(0).is_empty());
        assert_eq!(state.len(), 4);
    }

    #[test]
    fn test_history_messages_carry_sql() {
        let mut with_sql = turn("how many orders?");
        with_sql.sql = Some("SELECT COUNT(*) FROM public.orders".to_string());
        let turns = vec![turn("hello"), with_sql];

        let messages = history_messages(&turns, true);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2].content, "how many orders?");
        assert!(messages[3].content.ends_with("SQL: SELECT COUNT(*) FROM public.orders"));

        let messages = history_messages(&turns, false);
        assert!(!messages[3].content.contains("SQL:"));
    }
}
