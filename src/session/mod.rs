//! Voice session management
//!
//! This module provides the `VoiceSession` controller that manages:
//! - The session lifecycle (disconnected, connecting, connected, error)
//! - Microphone capture and PCM16 encoding toward the live model
//! - Gapless playback of synthesized speech, with interruption
//! - Transcript aggregation into conversation history
//! - Session statistics

mod config;
mod runtime;
mod session;
mod stats;
mod status;

pub use config::{SessionConfig, DEFAULT_BASE_INSTRUCTION};
pub use session::VoiceSession;
pub use stats::SessionStats;
pub use status::SessionStatus;
