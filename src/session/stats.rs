use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::status::SessionStatus;
use crate::transcript::TranscriptBuffer;

/// Statistics about the current (or last) voice session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub status: SessionStatus,

    /// Id of the running session, if any
    pub session_id: Option<String>,

    /// When the running session connected
    pub started_at: Option<DateTime<Utc>>,

    /// Connected duration in seconds
    pub duration_secs: f64,

    /// Microphone blocks delivered to the model
    pub chunks_sent: usize,

    /// Speech payloads scheduled for playback
    pub units_scheduled: usize,

    /// Interruption signals handled
    pub interruptions: usize,

    /// Turns written to history
    pub turns_recorded: usize,

    /// Assistant audio is playing
    pub speaking: bool,

    /// In-progress transcript text
    pub partial_transcript: String,
}

/// Counters shared between the session tasks
#[derive(Debug, Default)]
pub(crate) struct SessionCounters {
    pub chunks_sent: std::sync::Arc<AtomicUsize>,
    pub units_scheduled: AtomicUsize,
    pub interruptions: AtomicUsize,
    pub turns_recorded: AtomicUsize,
    pub speaking: AtomicBool,
    pub partial: std::sync::Mutex<TranscriptBuffer>,
}

impl SessionCounters {
    pub fn reset(&self) {
        self.chunks_sent.store(0, Ordering::SeqCst);
        self.units_scheduled.store(0, Ordering::SeqCst);
        self.interruptions.store(0, Ordering::SeqCst);
        self.turns_recorded.store(0, Ordering::SeqCst);
        self.speaking.store(false, Ordering::SeqCst);
        self.set_partial(TranscriptBuffer::default());
    }

    pub fn set_partial(&self, buffer: TranscriptBuffer) {
        if let Ok(mut partial) = self.partial.lock() {
            *partial = buffer;
        }
    }

    pub fn partial_text(&self) -> String {
        self.partial
            .lock()
            .map(|p| p.text.clone())
            .unwrap_or_default()
    }
}
