use serde::{Deserialize, Serialize};

use crate::audio::{CAPTURE_BLOCK_SIZE, INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE};

/// Default policy text placed at the top of every system instruction
pub const DEFAULT_BASE_INSTRUCTION: &str = "You are a friendly voice assistant. \
Keep answers short and conversational, and never read out markup or tags.";

/// Configuration for a voice session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Prefix for generated session ids (e.g., "voice" -> "voice-<uuid>")
    pub session_prefix: String,

    /// Microphone capture rate (the model expects 16kHz)
    pub input_sample_rate: u32,

    /// Rate of synthesized speech (24kHz)
    pub output_sample_rate: u32,

    /// Samples per capture block
    pub block_size: usize,

    /// Voice requested from the model
    pub voice: String,

    /// Fixed policy text; recent history is appended when a session opens
    pub base_instruction: String,
}

impl SessionConfig {
    pub fn new_session_id(&self) -> String {
        format!("{}-{}", self.session_prefix, uuid::Uuid::new_v4())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_prefix: "voice".to_string(),
            input_sample_rate: INPUT_SAMPLE_RATE,
            output_sample_rate: OUTPUT_SAMPLE_RATE,
            block_size: CAPTURE_BLOCK_SIZE,
            voice: "Puck".to_string(),
            base_instruction: DEFAULT_BASE_INSTRUCTION.to_string(),
        }
    }
}
