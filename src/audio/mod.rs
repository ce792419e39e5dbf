pub mod backend;
pub mod encoder;
pub mod file;
pub mod playback;
pub mod resample;
pub mod wav_sink;

#[cfg(feature = "live-audio")]
pub mod cpal_backend;

pub use backend::{
    AudioBackendConfig, AudioBackendFactory, AudioChunk, AudioSink, AudioSource, DeviceFactory,
    InputDevice, OutputDevice, UnitId, CAPTURE_BLOCK_SIZE, INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE,
};
pub use encoder::{encode_pcm16, float_to_pcm16, CaptureEncoder};
pub use file::{AudioFile, WavFileInput};
pub use playback::{decode_pcm16, PlaybackScheduler, ScheduledUnit};
pub use resample::{resample, StreamResampler};
pub use wav_sink::WavSink;
