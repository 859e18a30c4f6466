//! Prompt context assembly.
//!
//! Pure formatting of retrieved chunks into an evidence block and of the
//! conversation so far into a history block.

use crate::conversation::ConversationHistory;
use crate::retriever::RetrievedChunk;

/// History block used when there is nothing to show.
pub const NO_HISTORY: &str = "No prior conversation.";

/// Format chunks as numbered sources, in retrieval order.
///
/// Each block is `[Source i] <title>` followed by the chunk text on the next
/// line; blocks are separated by a blank line. No chunks yields `""`.
pub fn format_evidence(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, rc)| {
            format!(
                "[Source {}] {}\n{}",
                i + 1,
                rc.chunk.source_title(),
                rc.chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Format the last `max_turns` turns, oldest first.
///
/// Returns [`NO_HISTORY`] when the history is empty or `max_turns` is zero.
pub fn format_history(history: &ConversationHistory, max_turns: usize) -> String {
    let turns = history.recent(max_turns);
    if turns.is_empty() {
        return NO_HISTORY.to_string();
    }

    turns
        .iter()
        .map(|turn| format!("User: {}\nAssistant: {}", turn.question, turn.answer))
        .collect::<Vec<_>>()
        .join("\n\n")
}
