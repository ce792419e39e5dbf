use anyhow::Result;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Wire sample rate of captured microphone audio
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of synthesized speech
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Samples per capture block
pub const CAPTURE_BLOCK_SIZE: usize = 4096;

/// Identifies a scheduled playback unit on an output device
pub type UnitId = u64;

/// A fixed-size block of mono microphone samples in `[-1.0, 1.0]`
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Block sequence number since capture started
    pub sequence: u64,
}

/// Configuration for opening an audio device
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBackendConfig {
    pub sample_rate: u32,
    /// Number of channels (always mono for this client)
    pub channels: u16,
    /// Samples per delivered block (input devices only)
    pub block_size: usize,
}

impl AudioBackendConfig {
    pub fn input() -> Self {
        Self {
            sample_rate: INPUT_SAMPLE_RATE,
            channels: 1,
            block_size: CAPTURE_BLOCK_SIZE,
        }
    }

    pub fn output() -> Self {
        Self {
            sample_rate: OUTPUT_SAMPLE_RATE,
            channels: 1,
            block_size: CAPTURE_BLOCK_SIZE,
        }
    }
}

/// Microphone-like capture device
///
/// Device callbacks must never block: blocks are pushed with `try_send` and
/// dropped when the consumer falls behind.
#[async_trait::async_trait]
pub trait InputDevice: Send {
    /// Start capturing (this is where microphone permission is requested)
    ///
    /// Returns a channel receiver that will receive fixed-size blocks
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioChunk>>;

    /// Stop capturing; stopping a stopped device is a no-op
    async fn stop(&mut self) -> Result<()>;

    fn is_capturing(&self) -> bool;

    /// Device name for logging
    fn name(&self) -> &str;
}

/// Speaker-like playback device with its own clock
///
/// When a scheduled unit finishes playing naturally, the device sends its id
/// on the completion channel it was opened with. Units removed with
/// [`OutputDevice::stop_unit`] produce no completion.
pub trait OutputDevice: Send {
    /// Current time on the output clock in seconds (monotonic)
    fn now(&self) -> f64;

    /// Play `samples` starting at `start_at` seconds on the output clock
    fn schedule(&mut self, id: UnitId, start_at: f64, samples: Vec<f32>) -> Result<()>;

    /// Stop a unit immediately, whether it started playing or not
    fn stop_unit(&mut self, id: UnitId) -> Result<()>;

    /// Release the device; closing a closed device is a no-op
    fn close(&mut self) -> Result<()>;

    /// Device name for logging
    fn name(&self) -> &str;
}

/// Opens the devices for one session
#[async_trait::async_trait]
pub trait DeviceFactory: Send + Sync {
    async fn open_input(&self, config: AudioBackendConfig) -> Result<Box<dyn InputDevice>>;

    fn open_output(
        &self,
        config: AudioBackendConfig,
        finished: mpsc::UnboundedSender<UnitId>,
    ) -> Result<Box<dyn OutputDevice>>;
}

/// Where captured audio comes from
#[derive(Debug, Clone, PartialEq)]
pub enum AudioSource {
    /// Default microphone (requires the `live-audio` feature)
    Microphone,
    /// WAV file played in real time (for testing/batch processing)
    File(PathBuf),
}

impl AudioSource {
    /// "microphone" selects the live device, anything else is a file path
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "microphone" | "mic" => AudioSource::Microphone,
            path => AudioSource::File(PathBuf::from(path)),
        }
    }
}

/// Where synthesized speech goes
#[derive(Debug, Clone, PartialEq)]
pub enum AudioSink {
    /// Default speaker (requires the `live-audio` feature)
    Speaker,
    /// WAV file written when the session stops
    Wav(PathBuf),
}

impl AudioSink {
    /// "speaker" selects the live device, anything else is a file path
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "speaker" | "speakers" => AudioSink::Speaker,
            path => AudioSink::Wav(PathBuf::from(path)),
        }
    }
}

/// Audio backend factory
///
/// Creates devices based on platform and configuration
pub struct AudioBackendFactory {
    source: AudioSource,
    sink: AudioSink,
}

impl AudioBackendFactory {
    pub fn new(source: AudioSource, sink: AudioSink) -> Self {
        Self { source, sink }
    }
}

#[async_trait::async_trait]
impl DeviceFactory for AudioBackendFactory {
    async fn open_input(&self, config: AudioBackendConfig) -> Result<Box<dyn InputDevice>> {
        match &self.source {
            AudioSource::Microphone => {
                #[cfg(feature = "live-audio")]
                {
                    let device = super::cpal_backend::CpalInput::new(config)?;
                    Ok(Box::new(device))
                }

                #[cfg(not(feature = "live-audio"))]
                {
                    let _ = config;
                    anyhow::bail!("Microphone capture requires the `live-audio` feature")
                }
            }

            AudioSource::File(path) => {
                let device = super::file::WavFileInput::open(path, config)?;
                Ok(Box::new(device))
            }
        }
    }

    fn open_output(
        &self,
        config: AudioBackendConfig,
        finished: mpsc::UnboundedSender<UnitId>,
    ) -> Result<Box<dyn OutputDevice>> {
        match &self.sink {
            AudioSink::Speaker => {
                #[cfg(feature = "live-audio")]
                {
                    let device = super::cpal_backend::CpalOutput::new(config, finished)?;
                    Ok(Box::new(device))
                }

                #[cfg(not(feature = "live-audio"))]
                {
                    let _ = (config, finished);
                    anyhow::bail!("Speaker playback requires the `live-audio` feature")
                }
            }

            AudioSink::Wav(path) => {
                let device = super::wav_sink::WavSink::new(path.clone(), config, finished);
                Ok(Box::new(device))
            }
        }
    }
}
