use base64::Engine;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::backend::AudioChunk;
use crate::transport::{LiveConnection, OutboundMessage};

/// Convert one float sample to PCM16, clamping out-of-range input
pub fn float_to_pcm16(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    (clamped * 32767.0).round() as i16
}

/// Pack float samples as little-endian PCM16 bytes
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&s| float_to_pcm16(s).to_le_bytes())
        .collect()
}

/// Turns microphone blocks into wire messages and forwards them to the session
pub struct CaptureEncoder {
    stopping: Arc<AtomicBool>,
    chunks_sent: Arc<AtomicUsize>,
}

impl CaptureEncoder {
    pub fn new(stopping: Arc<AtomicBool>, chunks_sent: Arc<AtomicUsize>) -> Self {
        Self {
            stopping,
            chunks_sent,
        }
    }

    /// Encode a block as a base64 PCM16 media message
    pub fn encode(&self, chunk: &AudioChunk) -> OutboundMessage {
        let pcm_bytes = encode_pcm16(&chunk.samples);
        OutboundMessage::pcm16(base64::engine::general_purpose::STANDARD.encode(pcm_bytes))
    }

    /// Forward blocks until the device closes the channel or a stop begins
    ///
    /// Send failures (session not ready, already closing) are dropped; capture
    /// keeps going.
    pub async fn run(
        self,
        mut audio_rx: mpsc::Receiver<AudioChunk>,
        connection: Arc<dyn LiveConnection>,
    ) {
        info!("Capture encoder started");

        while let Some(chunk) = audio_rx.recv().await {
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }

            let message = self.encode(&chunk);

            match connection.send(message).await {
                Ok(()) => {
                    self.chunks_sent.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    debug!("Dropped capture block {}: {}", chunk.sequence, e);
                }
            }
        }

        info!("Capture encoder stopped");
    }
}
