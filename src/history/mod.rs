//! Conversation history
//!
//! Finalized turns are appended to a bounded store (the most recent
//! [`HISTORY_LIMIT`] entries). The store is also read, as a snapshot, when a
//! session opens so the model receives the recent conversation as context.

mod entry;
mod store;

pub use entry::{HistoryEntry, Speaker};
pub use store::{FileHistoryStore, HistoryStore, MemoryHistoryStore, HISTORY_KEY, HISTORY_LIMIT};

/// Render entries as alternating speaker-labelled lines.
pub fn render_history(entries: &[HistoryEntry]) -> String {
    entries
        .iter()
        .map(|entry| format!("{}: {}", entry.speaker.label(), entry.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the system instruction sent when a session opens: the fixed base
/// policy text, followed by the recent conversation if there is any.
pub fn build_system_instruction(base: &str, entries: &[HistoryEntry]) -> String {
    if entries.is_empty() {
        return base.to_string();
    }

    format!(
        "{}\n\nConversation so far:\n{}",
        base.trim_end(),
        render_history(entries)
    )
}
