use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::backend::{AudioBackendConfig, AudioChunk, InputDevice};
use super::resample::resample;

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved samples normalized to `[-1.0, 1.0]`
    pub samples: Vec<f32>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read audio samples")?,
            SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<Vec<_>, _>>()
                    .context("Failed to read audio samples")?
            }
        };

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Mono samples at `target_rate`
    ///
    /// Channels are averaged before rate conversion.
    pub fn to_mono(&self, target_rate: u32) -> Result<Vec<f32>> {
        let channels = self.channels.max(1) as usize;
        let mono: Vec<f32> = self
            .samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();

        resample(&mono, self.sample_rate, target_rate)
    }
}

/// Input device that replays a WAV file in real time
///
/// Blocks are paced at the rate a microphone would deliver them. The final
/// partial block is zero-padded to the fixed block size.
pub struct WavFileInput {
    name: String,
    samples: Arc<Vec<f32>>,
    config: AudioBackendConfig,
    capturing: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl WavFileInput {
    pub fn open(path: impl AsRef<Path>, config: AudioBackendConfig) -> Result<Self> {
        let audio = AudioFile::open(path.as_ref())?;
        let samples = audio.to_mono(config.sample_rate)?;

        Ok(Self {
            name: format!("WAV input ({})", audio.path),
            samples: Arc::new(samples),
            config,
            capturing: Arc::new(AtomicBool::new(false)),
            task: None,
        })
    }
}

#[async_trait::async_trait]
impl InputDevice for WavFileInput {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioChunk>> {
        if self.capturing.load(Ordering::SeqCst) {
            anyhow::bail!("Already capturing");
        }

        let (tx, rx) = mpsc::channel(32);
        let samples = Arc::clone(&self.samples);
        let capturing = Arc::clone(&self.capturing);
        let block_size = self.config.block_size.max(1);
        let sample_rate = self.config.sample_rate;
        let period = Duration::from_secs_f64(block_size as f64 / sample_rate as f64);

        capturing.store(true, Ordering::SeqCst);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);

            for (sequence, block) in samples.chunks(block_size).enumerate() {
                ticker.tick().await;
                if !capturing.load(Ordering::SeqCst) {
                    break;
                }

                let mut block = block.to_vec();
                block.resize(block_size, 0.0);

                let chunk = AudioChunk {
                    samples: block,
                    sample_rate,
                    sequence: sequence as u64,
                };

                if let Err(mpsc::error::TrySendError::Closed(_)) = tx.try_send(chunk) {
                    break;
                }
            }

            capturing.store(false, Ordering::SeqCst);
            info!("WAV input finished");
        });

        self.task = Some(task);
        info!("{} started", self.name);

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);

        if let Some(task) = self.task.take() {
            task.abort();
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("WAV input task failed: {}", e);
                }
            }
        }

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
