// Live microphone and speaker devices (cpal)
//
// cpal streams are not `Send` on every platform, so each stream lives on its
// own thread for as long as the device is open. The audio callbacks only push
// into a channel or read shared state; they never wait on the session.
//
// Hardware without a native 16 kHz input or 24 kHz output mode runs at its
// default rate and is resampled: capture inside the stream callback, speech
// when a unit is scheduled.

use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::backend::{AudioBackendConfig, AudioChunk, InputDevice, OutputDevice, UnitId};
use super::encoder::float_to_pcm16;
use super::resample::{resample, StreamResampler};

/// Keeps a stream thread alive until dropped or shut down
struct StreamThread {
    shutdown: Option<std_mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl StreamThread {
    /// Spawn a thread that builds a stream with `build` and holds it
    fn spawn<F>(name: &str, build: F) -> Result<Self>
    where
        F: FnOnce() -> Result<cpal::Stream> + Send + 'static,
    {
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<()>>();
        let (shutdown_tx, shutdown_rx) = std_mpsc::channel::<()>();

        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let stream = match build().and_then(|s| {
                    s.play().context("Failed to start stream")?;
                    Ok(s)
                }) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Blocks until shutdown is requested or the sender is dropped
                let _ = shutdown_rx.recv();
                drop(stream);
            })
            .context("Failed to spawn audio thread")?;

        ready_rx
            .recv()
            .map_err(|_| anyhow!("Audio thread exited before the stream started"))??;

        Ok(Self {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Audio thread panicked");
            }
        }
    }
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn find_config(
    configs: impl Iterator<Item = cpal::SupportedStreamConfigRange>,
    sample_rate: u32,
) -> Option<cpal::SupportedStreamConfig> {
    let mut fallback = None;

    for range in configs {
        if range.min_sample_rate().0 > sample_rate || range.max_sample_rate().0 < sample_rate {
            continue;
        }
        let config = range.with_sample_rate(cpal::SampleRate(sample_rate));
        if config.sample_format() == cpal::SampleFormat::F32 {
            return Some(config);
        }
        if fallback.is_none() && config.sample_format() == cpal::SampleFormat::I16 {
            fallback = Some(config);
        }
    }

    fallback
}

/// A native config at `sample_rate`, or the device default
fn input_config(device: &cpal::Device, sample_rate: u32) -> Result<cpal::SupportedStreamConfig> {
    if let Some(config) = find_config(device.supported_input_configs()?, sample_rate) {
        return Ok(config);
    }

    let config = device
        .default_input_config()
        .context("No usable input configuration")?;
    info!(
        "Input device has no {}Hz mode, capturing at {}Hz",
        sample_rate,
        config.sample_rate().0
    );
    Ok(config)
}

fn output_config(device: &cpal::Device, sample_rate: u32) -> Result<cpal::SupportedStreamConfig> {
    if let Some(config) = find_config(device.supported_output_configs()?, sample_rate) {
        return Ok(config);
    }

    let config = device
        .default_output_config()
        .context("No usable output configuration")?;
    info!(
        "Output device has no {}Hz mode, playing at {}Hz",
        sample_rate,
        config.sample_rate().0
    );
    Ok(config)
}

/// Accumulates device frames into fixed-size mono blocks at the capture rate
struct BlockAssembler {
    mono: Vec<f32>,
    pending: Vec<f32>,
    resampler: StreamResampler,
    block_size: usize,
    channels: usize,
    sample_rate: u32,
    sequence: u64,
    tx: mpsc::Sender<AudioChunk>,
}

impl BlockAssembler {
    fn push_frames<T: Copy>(&mut self, data: &[T], to_f32: impl Fn(T) -> f32) {
        self.mono.clear();
        for frame in data.chunks(self.channels) {
            let sum: f32 = frame.iter().map(|&s| to_f32(s)).sum();
            self.mono.push(sum / frame.len() as f32);
        }

        if let Err(e) = self.resampler.process(&self.mono, &mut self.pending) {
            warn!("Dropping capture frames: {:#}", e);
            return;
        }

        while self.pending.len() >= self.block_size {
            let rest = self.pending.split_off(self.block_size);
            let samples = std::mem::replace(&mut self.pending, rest);
            let chunk = AudioChunk {
                samples,
                sample_rate: self.sample_rate,
                sequence: self.sequence,
            };
            self.sequence += 1;

            // Lossy when the consumer falls behind
            let _ = self.tx.try_send(chunk);
        }
    }
}

/// Default microphone
pub struct CpalInput {
    name: String,
    config: AudioBackendConfig,
    stream: Option<StreamThread>,
    capturing: Arc<AtomicBool>,
}

impl CpalInput {
    pub fn new(config: AudioBackendConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow!("No input device available"))?;
        let name = device.name().unwrap_or_else(|_| "microphone".to_string());

        info!("Audio input device: {}", name);

        Ok(Self {
            name,
            config,
            stream: None,
            capturing: Arc::new(AtomicBool::new(false)),
        })
    }
}

#[async_trait::async_trait]
impl InputDevice for CpalInput {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioChunk>> {
        if self.stream.is_some() {
            bail!("Already capturing");
        }

        let (tx, rx) = mpsc::channel(32);
        let config = self.config.clone();

        let stream = StreamThread::spawn("voice-capture", move || {
            let host = cpal::default_host();
            let device = host
                .default_input_device()
                .ok_or_else(|| anyhow!("No input device available"))?;

            let supported = input_config(&device, config.sample_rate)?;

            let mut assembler = BlockAssembler {
                mono: Vec::new(),
                pending: Vec::with_capacity(config.block_size * 2),
                resampler: StreamResampler::new(supported.sample_rate().0, config.sample_rate)?,
                block_size: config.block_size,
                channels: supported.channels().max(1) as usize,
                sample_rate: config.sample_rate,
                sequence: 0,
                tx,
            };

            let err_fn = |err| error!("Input stream error: {}", err);
            let stream_config: cpal::StreamConfig = supported.config();

            let stream = match supported.sample_format() {
                cpal::SampleFormat::F32 => device.build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &_| assembler.push_frames(data, |s| s),
                    err_fn,
                    None,
                )?,
                cpal::SampleFormat::I16 => device.build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &_| {
                        assembler.push_frames(data, |s| s as f32 / i16::MAX as f32)
                    },
                    err_fn,
                    None,
                )?,
                other => bail!("Unsupported sample format: {:?}", other),
            };

            Ok(stream)
        })
        .context("Microphone access failed")?;

        self.stream = Some(stream);
        self.capturing.store(true, Ordering::SeqCst);
        info!("Microphone capture started ({}Hz)", self.config.sample_rate);

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown();
            info!("Microphone capture stopped");
        }
        self.capturing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct PlayingUnit {
    id: UnitId,
    start_frame: u64,
    samples: Vec<f32>,
}

#[derive(Default)]
struct PlayState {
    frame: u64,
    units: Vec<PlayingUnit>,
}

impl PlayState {
    fn render(&mut self, data: &mut [f32], channels: usize, finished: &mpsc::UnboundedSender<UnitId>) {
        let channels = channels.max(1);

        for (i, frame) in data.chunks_mut(channels).enumerate() {
            let t = self.frame + i as u64;
            let mut value = 0.0;
            for unit in &self.units {
                if t >= unit.start_frame {
                    if let Some(sample) = unit.samples.get((t - unit.start_frame) as usize) {
                        value += *sample;
                    }
                }
            }
            frame.fill(value);
        }

        self.frame += (data.len() / channels) as u64;

        let now = self.frame;
        self.units.retain(|unit| {
            let done = unit.start_frame + unit.samples.len() as u64 <= now;
            if done {
                let _ = finished.send(unit.id);
            }
            !done
        });
    }
}

/// Default speaker
pub struct CpalOutput {
    name: String,
    /// Rate of scheduled speech
    sample_rate: u32,
    /// Rate the device actually plays at
    device_rate: u32,
    state: Arc<Mutex<PlayState>>,
    stream: Option<StreamThread>,
}

impl CpalOutput {
    pub fn new(config: AudioBackendConfig, finished: mpsc::UnboundedSender<UnitId>) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow!("No output device available"))?;
        let name = device.name().unwrap_or_else(|_| "speaker".to_string());
        let device_rate = output_config(&device, config.sample_rate)?.sample_rate().0;

        info!("Audio output device: {} ({}Hz)", name, device_rate);

        let state = Arc::new(Mutex::new(PlayState::default()));
        let shared = Arc::clone(&state);
        let sample_rate = config.sample_rate;

        let stream = StreamThread::spawn("voice-playback", move || {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| anyhow!("No output device available"))?;

            let supported = output_config(&device, sample_rate)?;
            if supported.sample_rate().0 != device_rate {
                bail!("Output device changed rate while opening");
            }

            let channels = supported.channels() as usize;
            let err_fn = |err| error!("Output stream error: {}", err);
            let stream_config: cpal::StreamConfig = supported.config();

            let stream = match supported.sample_format() {
                cpal::SampleFormat::F32 => device.build_output_stream(
                    &stream_config,
                    move |data: &mut [f32], _: &_| match shared.lock() {
                        Ok(mut state) => state.render(data, channels, &finished),
                        Err(_) => data.fill(0.0),
                    },
                    err_fn,
                    None,
                )?,
                cpal::SampleFormat::I16 => {
                    let mut scratch = Vec::new();
                    device.build_output_stream(
                        &stream_config,
                        move |data: &mut [i16], _: &_| {
                            scratch.clear();
                            scratch.resize(data.len(), 0.0);
                            if let Ok(mut state) = shared.lock() {
                                state.render(&mut scratch, channels, &finished);
                            }
                            for (out, sample) in data.iter_mut().zip(&scratch) {
                                *out = float_to_pcm16(*sample);
                            }
                        },
                        err_fn,
                        None,
                    )?
                }
                other => bail!("Unsupported sample format: {:?}", other),
            };

            Ok(stream)
        })
        .context("Failed to open speaker")?;

        Ok(Self {
            name,
            sample_rate,
            device_rate,
            state,
            stream: Some(stream),
        })
    }
}

impl OutputDevice for CpalOutput {
    fn now(&self) -> f64 {
        match self.state.lock() {
            Ok(state) => state.frame as f64 / self.device_rate as f64,
            Err(_) => 0.0,
        }
    }

    fn schedule(&mut self, id: UnitId, start_at: f64, samples: Vec<f32>) -> Result<()> {
        if self.stream.is_none() {
            bail!("Speaker is closed");
        }

        let samples = resample(&samples, self.sample_rate, self.device_rate)?;
        let start_frame = (start_at.max(0.0) * self.device_rate as f64).round() as u64;
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("Playback state poisoned"))?;
        state.units.push(PlayingUnit {
            id,
            start_frame,
            samples,
        });

        Ok(())
    }

    fn stop_unit(&mut self, id: UnitId) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("Playback state poisoned"))?;
        state.units.retain(|unit| unit.id != id);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown();
            info!("Speaker closed");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
