use serde::{Deserialize, Serialize};

/// MIME type of outbound microphone audio
pub const INPUT_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// Base64-encoded media payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaChunk {
    pub data: String, // Base64-encoded PCM16 little-endian bytes
    pub mime_type: String,
}

/// Message sent from the client to the live session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub media: MediaChunk,
}

impl OutboundMessage {
    pub fn pcm16(data: String) -> Self {
        Self {
            media: MediaChunk {
                data,
                mime_type: INPUT_MIME_TYPE.to_string(),
            },
        }
    }
}

/// Configuration sent when a live session opens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSetup {
    pub session_id: String,
    pub response_modalities: Vec<String>,
    pub voice_name: String,
    pub system_instruction: String,
    pub input_audio_transcription: bool,
    pub output_audio_transcription: bool,
}

impl SessionSetup {
    /// Audio responses with transcription requested in both directions
    pub fn audio(session_id: String, voice_name: String, system_instruction: String) -> Self {
        Self {
            session_id,
            response_modalities: vec!["AUDIO".to_string()],
            voice_name,
            system_instruction,
            input_audio_transcription: true,
            output_audio_transcription: true,
        }
    }
}

/// A transcript fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcription {
    pub text: String,
}

/// Message received from the live session
///
/// Every field is optional and any combination may arrive together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InboundMessage {
    /// Base64-encoded PCM16 speech at 24 kHz mono
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,

    /// The user started speaking over the assistant
    pub interrupted: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_transcription: Option<Transcription>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_transcription: Option<Transcription>,

    pub turn_complete: bool,
}

/// Events raised by an open connection (message, error, close callbacks)
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Message(InboundMessage),
    Error(String),
    Closed,
}
