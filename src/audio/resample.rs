// Sample rate conversion (rubato)
//
// Devices and files rarely run at the wire rates (16 kHz capture, 24 kHz
// speech). `StreamResampler` converts mono audio incrementally for device
// callbacks; `resample` converts a whole buffer and removes the filter delay.

use anyhow::{Context, Result};
use rubato::{FftFixedIn, Resampler};

/// Input frames per resampler chunk (rounded up by rubato as needed)
const CHUNK_FRAMES: usize = 1024;

/// Incremental mono resampler
pub struct StreamResampler {
    inner: Option<FftFixedIn<f32>>,
    pending: Vec<f32>,
}

impl StreamResampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Result<Self> {
        let inner = if from_rate == to_rate {
            None
        } else {
            let resampler =
                FftFixedIn::<f32>::new(from_rate as usize, to_rate as usize, CHUNK_FRAMES, 2, 1)
                    .with_context(|| {
                        format!("Failed to create {}Hz -> {}Hz resampler", from_rate, to_rate)
                    })?;
            Some(resampler)
        };

        Ok(Self {
            inner,
            pending: Vec::new(),
        })
    }

    /// Whether conversion is needed at all
    pub fn is_passthrough(&self) -> bool {
        self.inner.is_none()
    }

    /// Output frames the filter lags behind its input
    pub fn output_delay(&self) -> usize {
        self.inner.as_ref().map_or(0, |r| r.output_delay())
    }

    /// Input frames consumed per conversion step
    pub fn chunk_frames(&self) -> usize {
        self.inner.as_ref().map_or(1, |r| r.input_frames_next())
    }

    /// Feed `input` and append every completed output frame to `output`
    ///
    /// Input that does not fill a whole chunk is kept for the next call.
    pub fn process(&mut self, input: &[f32], output: &mut Vec<f32>) -> Result<()> {
        let Some(resampler) = self.inner.as_mut() else {
            output.extend_from_slice(input);
            return Ok(());
        };

        self.pending.extend_from_slice(input);
        loop {
            let needed = resampler.input_frames_next();
            if self.pending.len() < needed {
                return Ok(());
            }

            let converted = resampler
                .process(&[&self.pending[..needed]], None)
                .context("Resampling failed")?;
            output.extend_from_slice(&converted[0]);
            self.pending.drain(..needed);
        }
    }
}

/// Convert a complete mono buffer from `from_rate` to `to_rate`
///
/// The result is aligned with the input (filter delay removed) and holds
/// `len * to_rate / from_rate` samples.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let expected = (samples.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    let mut resampler = StreamResampler::new(from_rate, to_rate)?;
    let delay = resampler.output_delay();

    let mut output = Vec::with_capacity(expected + delay);
    resampler.process(samples, &mut output)?;

    // Flush the tail and the filter delay with silence
    let silence = vec![0.0; resampler.chunk_frames()];
    while output.len() < delay + expected {
        resampler.process(&silence, &mut output)?;
    }

    output.drain(..delay);
    output.truncate(expected);
    Ok(output)
}
