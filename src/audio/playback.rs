// Gapless playback scheduling
//
// Each inbound speech payload becomes one playback unit. The cursor is the
// next free instant on the output clock: a unit starts at max(cursor, now)
// and moves the cursor to its end. Slot reservation and cursor advance happen
// in the same `&mut self` call, so units keep their arrival order and never
// share a slot.

use anyhow::{bail, Context, Result};
use base64::Engine;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::backend::{OutputDevice, UnitId};

/// Decode a base64 PCM16 little-endian payload into float samples
///
/// A trailing odd byte (truncated sample) is ignored.
pub fn decode_pcm16(payload: &str) -> Result<Vec<f32>> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .context("Speech payload is not valid base64")?;

    let samples: Vec<f32> = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect();

    if samples.is_empty() {
        bail!("Speech payload holds no samples");
    }

    Ok(samples)
}

/// A unit's reserved interval on the output clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledUnit {
    pub id: UnitId,
    pub start_at: f64,
    pub duration: f64,
}

impl ScheduledUnit {
    pub fn end(&self) -> f64 {
        self.start_at + self.duration
    }
}

/// Schedules speech back-to-back on an output device
pub struct PlaybackScheduler {
    device: Box<dyn OutputDevice>,
    sample_rate: u32,
    cursor: f64,
    active: BTreeMap<UnitId, ScheduledUnit>,
    next_id: UnitId,
    closed: bool,
}

impl PlaybackScheduler {
    pub fn new(device: Box<dyn OutputDevice>, sample_rate: u32) -> Self {
        info!(
            "Playback scheduler on {} ({}Hz)",
            device.name(),
            sample_rate
        );

        Self {
            device,
            sample_rate,
            cursor: 0.0,
            active: BTreeMap::new(),
            next_id: 0,
            closed: false,
        }
    }

    /// Decode and schedule a base64 speech payload
    ///
    /// Undecodable payloads are rejected without touching the cursor.
    pub fn enqueue(&mut self, payload: &str) -> Result<ScheduledUnit> {
        let samples = decode_pcm16(payload)?;
        self.enqueue_samples(samples)
    }

    /// Schedule already-decoded samples
    pub fn enqueue_samples(&mut self, samples: Vec<f32>) -> Result<ScheduledUnit> {
        if self.closed {
            bail!("Playback scheduler is closed");
        }
        if samples.is_empty() {
            bail!("Cannot schedule an empty unit");
        }

        let duration = samples.len() as f64 / self.sample_rate as f64;
        let start_at = self.cursor.max(self.device.now());

        let unit = ScheduledUnit {
            id: self.next_id,
            start_at,
            duration,
        };

        self.device
            .schedule(unit.id, start_at, samples)
            .with_context(|| format!("Failed to schedule unit {}", unit.id))?;

        self.next_id += 1;
        self.cursor = unit.end();
        self.active.insert(unit.id, unit);

        debug!(
            "Scheduled unit {} at {:.3}s for {:.3}s ({} active)",
            unit.id,
            unit.start_at,
            unit.duration,
            self.active.len()
        );

        Ok(unit)
    }

    /// Handle a natural playback completion
    ///
    /// Returns false for units that are no longer tracked (already interrupted).
    pub fn on_unit_finished(&mut self, id: UnitId) -> bool {
        let known = self.active.remove(&id).is_some();
        if known && self.active.is_empty() {
            debug!("Playback drained");
        }
        known
    }

    /// Stop every scheduled or playing unit and rewind the cursor
    ///
    /// Returns the number of units stopped.
    pub fn interrupt(&mut self) -> usize {
        let stopped = self.active.len();

        for id in self.active.keys() {
            if let Err(e) = self.device.stop_unit(*id) {
                debug!("Ignoring failure stopping unit {}: {}", id, e);
            }
        }

        self.active.clear();
        self.cursor = 0.0;

        if stopped > 0 {
            info!("Playback interrupted ({} units stopped)", stopped);
        }

        stopped
    }

    /// Interrupt and release the output device; safe to call repeatedly
    pub fn close(&mut self) {
        self.interrupt();

        if self.closed {
            return;
        }
        self.closed = true;

        if let Err(e) = self.device.close() {
            warn!("Ignoring failure closing {}: {}", self.device.name(), e);
        }
    }

    pub fn is_speaking(&self) -> bool {
        !self.active.is_empty()
    }

    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    pub fn active_units(&self) -> Vec<ScheduledUnit> {
        self.active.values().copied().collect()
    }

    pub fn now(&self) -> f64 {
        self.device.now()
    }
}
