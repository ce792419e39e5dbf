use anyhow::Result;
use serde::Deserialize;

use crate::audio::{CAPTURE_BLOCK_SIZE, INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE};
use crate::session::{SessionConfig, DEFAULT_BASE_INSTRUCTION};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub transport: TransportConfig,
    pub history: HistoryConfig,
    pub assistant: AssistantConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// "microphone" or a WAV file path
    pub input: String,
    /// "speaker" or a WAV file path
    pub output: String,
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub block_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub nats_url: String,
    pub subject_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Directory holding the history file; "~" is expanded
    pub dir: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub voice: String,
    pub base_instruction: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "voice-session".to_string(),
            http: HttpConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 3870,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input: "microphone".to_string(),
            output: "speaker".to_string(),
            input_sample_rate: INPUT_SAMPLE_RATE,
            output_sample_rate: OUTPUT_SAMPLE_RATE,
            block_size: CAPTURE_BLOCK_SIZE,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            nats_url: "nats://localhost:4222".to_string(),
            subject_prefix: "voice.session".to_string(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            dir: "~/.local/share/voice-session".to_string(),
        }
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            voice: "Puck".to_string(),
            base_instruction: DEFAULT_BASE_INSTRUCTION.to_string(),
        }
    }
}

impl Config {
    /// Load `path` (any format the config crate knows, extension optional)
    /// with `VOICE_SESSION__SECTION__KEY` environment overrides
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("VOICE_SESSION").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            input_sample_rate: self.audio.input_sample_rate,
            output_sample_rate: self.audio.output_sample_rate,
            block_size: self.audio.block_size,
            voice: self.assistant.voice.clone(),
            base_instruction: self.assistant.base_instruction.clone(),
            ..SessionConfig::default()
        }
    }
}
