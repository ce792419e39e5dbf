// Output device that renders scheduled speech into a WAV file
//
// The clock is wall time since the sink opened. Each unit is written into a
// timeline at its scheduled position and a timer reports completion when the
// unit's end passes. The file is written on close.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use super::backend::{AudioBackendConfig, OutputDevice, UnitId};
use super::encoder::float_to_pcm16;

struct PendingUnit {
    start_frame: usize,
    len: usize,
    timer: JoinHandle<()>,
}

pub struct WavSink {
    path: PathBuf,
    name: String,
    sample_rate: u32,
    origin: Instant,
    timeline: Vec<f32>,
    units: HashMap<UnitId, PendingUnit>,
    finished: mpsc::UnboundedSender<UnitId>,
    closed: bool,
}

impl WavSink {
    /// Must be created inside a tokio runtime (completion timers are tasks)
    pub fn new(
        path: PathBuf,
        config: AudioBackendConfig,
        finished: mpsc::UnboundedSender<UnitId>,
    ) -> Self {
        info!("WAV sink: {} ({}Hz)", path.display(), config.sample_rate);

        Self {
            name: format!("WAV sink ({})", path.display()),
            path,
            sample_rate: config.sample_rate,
            origin: Instant::now(),
            timeline: Vec::new(),
            units: HashMap::new(),
            finished,
            closed: false,
        }
    }

    /// Units scheduled that have not yet played to their end
    pub fn pending_units(&self) -> usize {
        self.units.len()
    }

    /// Forget units that already played out; their timers fire on their own
    fn prune_finished(&mut self) {
        let now_frame = self.frame_at(self.now());
        self.units
            .retain(|_, unit| unit.start_frame + unit.len > now_frame);
    }

    fn frame_at(&self, seconds: f64) -> usize {
        (seconds.max(0.0) * self.sample_rate as f64).round() as usize
    }

    fn write_file(&self) -> Result<()> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(&self.path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", self.path))?;

        for &sample in &self.timeline {
            writer
                .write_sample(float_to_pcm16(sample))
                .context("Failed to write sample to WAV")?;
        }

        writer.finalize().context("Failed to finalize WAV file")?;

        info!(
            "Wrote {:.1}s of playback to {}",
            self.timeline.len() as f64 / self.sample_rate as f64,
            self.path.display()
        );

        Ok(())
    }
}

impl OutputDevice for WavSink {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn schedule(&mut self, id: UnitId, start_at: f64, samples: Vec<f32>) -> Result<()> {
        if self.closed {
            anyhow::bail!("WAV sink is closed");
        }
        self.prune_finished();

        let start_frame = self.frame_at(start_at);
        let len = samples.len();
        if self.timeline.len() < start_frame + len {
            self.timeline.resize(start_frame + len, 0.0);
        }
        self.timeline[start_frame..start_frame + len].copy_from_slice(&samples);

        let end = start_at + len as f64 / self.sample_rate as f64;
        let deadline = self.origin + std::time::Duration::from_secs_f64(end.max(0.0));
        let finished = self.finished.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = finished.send(id);
        });

        self.units.insert(
            id,
            PendingUnit {
                start_frame,
                len,
                timer,
            },
        );

        Ok(())
    }

    fn stop_unit(&mut self, id: UnitId) -> Result<()> {
        self.prune_finished();
        let Some(unit) = self.units.remove(&id) else {
            return Ok(());
        };

        unit.timer.abort();

        // Silence whatever had not played yet
        let cut = self.frame_at(self.now()).max(unit.start_frame);
        let end = (unit.start_frame + unit.len).min(self.timeline.len());
        if cut < end {
            self.timeline[cut..end].fill(0.0);
        }

        // Drop trailing silence no other unit will fill
        let keep = self
            .units
            .values()
            .map(|u| u.start_frame + u.len)
            .max()
            .unwrap_or(0)
            .max(cut);
        if keep < self.timeline.len() {
            self.timeline.truncate(keep);
        }

        debug!("Stopped unit {}", id);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        for (_, unit) in self.units.drain() {
            unit.timer.abort();
        }

        self.write_file()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
