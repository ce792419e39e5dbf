pub mod audio;
pub mod config;
pub mod history;
pub mod http;
pub mod session;
pub mod transcript;
pub mod transport;

pub use audio::{
    AudioBackendConfig, AudioBackendFactory, AudioChunk, AudioFile, AudioSink, AudioSource,
    CaptureEncoder, DeviceFactory, InputDevice, OutputDevice, PlaybackScheduler, ScheduledUnit,
};
pub use config::Config;
pub use history::{FileHistoryStore, HistoryEntry, HistoryStore, MemoryHistoryStore, Speaker};
pub use http::{create_router, AppState};
pub use session::{SessionConfig, SessionStats, SessionStatus, VoiceSession};
pub use transcript::{sanitize, TranscriptAggregator};
pub use transport::{InboundMessage, LiveConnection, LiveTransport, NatsTransport, OutboundMessage};
