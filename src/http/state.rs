use crate::history::HistoryStore;
use crate::session::VoiceSession;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The voice session controlled through the API
    pub session: VoiceSession,

    /// Conversation history (the session's store)
    pub history: Arc<dyn HistoryStore>,
}

impl AppState {
    pub fn new(session: VoiceSession) -> Self {
        let history = session.history();
        Self { session, history }
    }
}
