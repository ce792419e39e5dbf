// Integration tests for the file-backed audio devices
//
// Fixtures are generated with hound into a temporary directory.

use anyhow::Result;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use voice_session::audio::{
    AudioBackendConfig, AudioFile, InputDevice, OutputDevice, WavFileInput, WavSink,
};

fn write_tone(path: &Path, sample_rate: u32, channels: u16, frames: usize) -> Result<()> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for i in 0..frames {
        let value = ((i as f32 * 0.05).sin() * 8000.0) as i16;
        for _ in 0..channels {
            writer.write_sample(value)?;
        }
    }
    writer.finalize()?;
    Ok(())
}

#[test]
fn test_audio_file_open() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tone.wav");
    write_tone(&path, 48000, 2, 4800)?;

    let audio = AudioFile::open(&path)?;
    assert_eq!(audio.sample_rate, 48000);
    assert_eq!(audio.channels, 2);
    assert_eq!(audio.samples.len(), 9600);
    assert!((audio.duration_seconds - 0.1).abs() < 1e-6);
    assert!(audio.samples.iter().all(|s| (-1.0..=1.0).contains(s)));

    // 0.1s of stereo 48kHz is 1600 mono frames at 16kHz
    let mono = audio.to_mono(16000)?;
    assert_eq!(mono.len(), 1600);

    Ok(())
}

#[test]
fn test_audio_file_nonexistent() {
    assert!(AudioFile::open("/nonexistent/path/to/audio.wav").is_err());
}

#[tokio::test]
async fn test_wav_input_delivers_fixed_blocks() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("speech.wav");
    write_tone(&path, 16000, 1, 5000)?;

    let config = AudioBackendConfig {
        sample_rate: 16000,
        channels: 1,
        block_size: 1024,
    };
    let mut input = WavFileInput::open(&path, config)?;
    let mut rx = input.start().await?;
    assert!(input.is_capturing());

    let mut blocks = Vec::new();
    while let Some(chunk) = tokio::time::timeout(Duration::from_secs(3), rx.recv()).await? {
        blocks.push(chunk);
    }

    // 5000 samples: four full blocks plus a zero-padded fifth
    assert_eq!(blocks.len(), 5);
    assert!(blocks.iter().all(|b| b.samples.len() == 1024));
    assert_eq!(blocks[4].sequence, 4);
    assert!(blocks[4].samples[5000 - 4 * 1024..].iter().all(|s| *s == 0.0));

    input.stop().await?;
    input.stop().await?;
    assert!(!input.is_capturing());

    Ok(())
}

#[tokio::test]
async fn test_wav_sink_reports_completion_and_writes_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("playback.wav");
    let (finished_tx, mut finished_rx) = mpsc::unbounded_channel();

    let mut sink = WavSink::new(path.clone(), AudioBackendConfig::output(), finished_tx);
    sink.schedule(0, 0.0, vec![0.25; 240])?;
    sink.schedule(1, 0.01, vec![-0.25; 240])?;

    let first = tokio::time::timeout(Duration::from_secs(2), finished_rx.recv()).await?;
    let second = tokio::time::timeout(Duration::from_secs(2), finished_rx.recv()).await?;
    assert_eq!(first, Some(0));
    assert_eq!(second, Some(1));

    sink.close()?;
    sink.close()?;
    assert!(sink.schedule(2, 1.0, vec![0.0; 10]).is_err());

    let reader = hound::WavReader::open(&path)?;
    assert_eq!(reader.spec().sample_rate, 24000);
    let samples: Vec<i16> = reader.into_samples::<i16>().collect::<Result<_, _>>()?;
    assert_eq!(samples.len(), 480);
    assert_eq!(samples[0], 8192);
    assert_eq!(samples[479], -8192);

    Ok(())
}

#[tokio::test]
async fn test_wav_sink_forgets_played_units() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("long.wav");
    let (finished_tx, mut finished_rx) = mpsc::unbounded_channel();

    let mut sink = WavSink::new(path.clone(), AudioBackendConfig::output(), finished_tx);
    sink.schedule(0, 0.0, vec![0.1; 240])?;
    let done = tokio::time::timeout(Duration::from_secs(2), finished_rx.recv()).await?;
    assert_eq!(done, Some(0));

    let start = sink.now();
    sink.schedule(1, start, vec![0.1; 24000])?;
    assert_eq!(sink.pending_units(), 1);

    sink.stop_unit(1)?;
    assert_eq!(sink.pending_units(), 0);
    sink.close()?;

    // Only the played unit and the silence before the interruption remain
    let reader = hound::WavReader::open(&path)?;
    let samples: Vec<i16> = reader.into_samples::<i16>().collect::<Result<_, _>>()?;
    assert!(samples.len() < 24000);
    assert!(samples[..240].iter().all(|s| *s != 0));

    Ok(())
}

#[tokio::test]
async fn test_wav_input_resamples_to_capture_rate() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("hifi.wav");
    write_tone(&path, 44100, 2, 4410)?;

    let config = AudioBackendConfig {
        sample_rate: 16000,
        channels: 1,
        block_size: 400,
    };
    let mut input = WavFileInput::open(&path, config)?;
    let mut rx = input.start().await?;

    let mut total = 0;
    while let Some(chunk) = tokio::time::timeout(Duration::from_secs(3), rx.recv()).await? {
        assert_eq!(chunk.sample_rate, 16000);
        total += chunk.samples.len();
    }

    // 0.1s at 16kHz is exactly four 400-sample blocks
    assert_eq!(total, 1600);
    input.stop().await?;

    Ok(())
}

#[tokio::test]
async fn test_wav_sink_stopped_unit_is_silenced() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("interrupted.wav");
    let (finished_tx, mut finished_rx) = mpsc::unbounded_channel();

    let mut sink = WavSink::new(path.clone(), AudioBackendConfig::output(), finished_tx);
    sink.schedule(0, 5.0, vec![0.5; 24000])?;
    sink.stop_unit(0)?;
    sink.close()?;

    // Stopped units never report completion
    assert!(finished_rx.try_recv().is_err());

    let reader = hound::WavReader::open(&path)?;
    let samples: Vec<i16> = reader.into_samples::<i16>().collect::<Result<_, _>>()?;
    assert!(samples.iter().all(|s| *s == 0));

    Ok(())
}
