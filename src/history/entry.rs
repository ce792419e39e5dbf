use serde::{Deserialize, Serialize};
use std::fmt;

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

impl Speaker {
    /// Label used when rendering history into the system instruction
    pub fn label(self) -> &'static str {
        match self {
            Speaker::User => "User",
            Speaker::Assistant => "Assistant",
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A finalized conversation turn
///
/// Entries are never mutated after they are emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Unique entry identifier (UUID v4)
    pub id: String,

    /// Sanitized, trimmed turn text
    pub text: String,

    /// Speaker of the turn
    pub speaker: Speaker,

    /// Always true for emitted entries
    pub complete: bool,
}

impl HistoryEntry {
    /// Create a complete entry with a fresh id
    pub fn new(text: impl Into<String>, speaker: Speaker) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            speaker,
            complete: true,
        }
    }
}
