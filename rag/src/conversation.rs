//! Conversation history for multi-turn question answering.

use serde::{Deserialize, Serialize};

/// One completed question and answer exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// The user's question.
    pub question: String,

    /// The answer that was returned.
    pub answer: String,
}

impl ConversationTurn {
    /// Create a new turn.
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// Ordered turns of one conversation, oldest first.
///
/// Turns are only appended by a successful [`RagEngine::ask`](crate::RagEngine::ask);
/// callers may inspect, serialize or clear the history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// All turns, oldest first.
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// The last `n` turns, oldest first.
    pub fn recent(&self, n: usize) -> &[ConversationTurn] {
        &self.turns[self.turns.len().saturating_sub(n)..]
    }

    /// Get the most recent turn.
    pub fn last(&self) -> Option<&ConversationTurn> {
        self.turns.last()
    }

    /// Number of turns.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Check if the history is empty.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Forget every turn.
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub(crate) fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }
}

impl From<Vec<ConversationTurn>> for ConversationHistory {
    fn from(turns: Vec<ConversationTurn>) -> Self {
        Self { turns }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn history(n: usize) -> ConversationHistory {
        (0..n)
            .map(|i| ConversationTurn::new(format!("q{i}"), format!("a{i}")))
            .collect::<Vec<_>>()
            .into()
    }

    #[test]
    fn test_recent_takes_the_tail() {
        let history = history(5);
        let recent: Vec<&str> = history
            .recent(3)
            .iter()
            .map(|t| t.question.as_str())
            .collect();
        assert_eq!(recent, vec!["q2", "q3", "q4"]);
        assert_eq!(history.recent(10).len(), 5);
        assert!(history.recent(0).is_empty());
    }

    #[test]
    fn test_push_and_clear() {
        let mut history = ConversationHistory::new();
        history.push(ConversationTurn::new("Who is Radahn?", "A demigod."));
        assert_eq!(history.len(), 1);
        assert_eq!(history.last().map(|t| t.answer.as_str()), Some("A demigod."));

        history.clear();
        assert!(history.is_empty());
    }

    #[test]
    fn test_serializes_as_turn_list() {
        let json = serde_json::to_value(history(1)).unwrap();
        assert_eq!(json, serde_json::json!([{ "question": "q0", "answer": "a0" }]));
    }
}
