// Test doubles for the session's collaborators
//
// FakeTransport records outbound traffic and lets tests inject inbound
// events. FakeDevices hands out a scripted microphone and an output device
// driven by a manual clock.

#![allow(dead_code)]

use anyhow::Result;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use voice_session::audio::{
    AudioBackendConfig, AudioChunk, DeviceFactory, InputDevice, OutputDevice, UnitId,
};
use voice_session::transport::{
    InboundMessage, LiveConnection, LiveTransport, OutboundMessage, SessionSetup, TransportEvent,
};

/// Poll `condition` until it holds or a second passes
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

// ============================================================================
// Transport
// ============================================================================

#[derive(Default)]
pub struct TransportLog {
    pub open_calls: usize,
    pub setups: Vec<SessionSetup>,
    pub sent: Vec<OutboundMessage>,
    pub close_calls: usize,
    pub events: Option<mpsc::UnboundedSender<TransportEvent>>,
}

#[derive(Clone, Default)]
pub struct FakeTransport {
    pub log: Arc<Mutex<TransportLog>>,
    fail_open: bool,
    error_on_open: bool,
    gate: Option<Arc<Notify>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    /// Report a transport error before `open` even returns
    pub fn erroring() -> Self {
        Self {
            error_on_open: true,
            ..Self::default()
        }
    }

    /// `open` waits until the returned gate is notified
    pub fn gated() -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let transport = Self {
            gate: Some(Arc::clone(&gate)),
            ..Self::default()
        };
        (transport, gate)
    }

    pub fn open_calls(&self) -> usize {
        self.log.lock().unwrap().open_calls
    }

    /// Deliver an event as if it came from the remote session
    pub fn inject(&self, event: TransportEvent) {
        let log = self.log.lock().unwrap();
        if let Some(events) = &log.events {
            let _ = events.send(event);
        }
    }

    pub fn message(&self, message: InboundMessage) {
        self.inject(TransportEvent::Message(message));
    }

    pub fn close_calls(&self) -> usize {
        self.log.lock().unwrap().close_calls
    }

    pub fn sent_count(&self) -> usize {
        self.log.lock().unwrap().sent.len()
    }

    pub fn last_setup(&self) -> Option<SessionSetup> {
        self.log.lock().unwrap().setups.last().cloned()
    }
}

struct FakeConnection {
    log: Arc<Mutex<TransportLog>>,
}

#[async_trait::async_trait]
impl LiveTransport for FakeTransport {
    async fn open(
        &self,
        setup: SessionSetup,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn LiveConnection>> {
        self.log.lock().unwrap().open_calls += 1;
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail_open {
            anyhow::bail!("relay unreachable");
        }
        if self.error_on_open {
            let _ = events.send(TransportEvent::Error("relay dropped the model".to_string()));
        }

        let mut log = self.log.lock().unwrap();
        log.setups.push(setup);
        log.events = Some(events);

        Ok(Arc::new(FakeConnection {
            log: Arc::clone(&self.log),
        }))
    }
}

#[async_trait::async_trait]
impl LiveConnection for FakeConnection {
    async fn send(&self, message: OutboundMessage) -> Result<()> {
        self.log.lock().unwrap().sent.push(message);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.log.lock().unwrap().close_calls += 1;
        Ok(())
    }
}

// ============================================================================
// Devices
// ============================================================================

#[derive(Default)]
pub struct DeviceLog {
    pub mic: Option<mpsc::Sender<AudioChunk>>,
    pub input_stops: usize,
    pub clock: f64,
    pub scheduled: Vec<(UnitId, f64, usize)>,
    pub stopped: Vec<UnitId>,
    pub output_closes: usize,
    pub finished: Option<mpsc::UnboundedSender<UnitId>>,
}

#[derive(Clone, Default)]
pub struct FakeDevices {
    pub log: Arc<Mutex<DeviceLog>>,
    deny_microphone: bool,
}

impl FakeDevices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_microphone() -> Self {
        Self {
            deny_microphone: true,
            ..Self::default()
        }
    }

    /// Push one captured block into the session
    pub fn speak(&self, samples: Vec<f32>) {
        let log = self.log.lock().unwrap();
        if let Some(mic) = &log.mic {
            let _ = mic.try_send(AudioChunk {
                samples,
                sample_rate: 16000,
                sequence: 0,
            });
        }
    }

    pub fn set_clock(&self, seconds: f64) {
        self.log.lock().unwrap().clock = seconds;
    }

    /// Report a unit as played to the end
    pub fn finish(&self, id: UnitId) {
        let log = self.log.lock().unwrap();
        if let Some(finished) = &log.finished {
            let _ = finished.send(id);
        }
    }

    pub fn scheduled(&self) -> Vec<(UnitId, f64, usize)> {
        self.log.lock().unwrap().scheduled.clone()
    }

    pub fn stopped(&self) -> Vec<UnitId> {
        self.log.lock().unwrap().stopped.clone()
    }

    pub fn input_stops(&self) -> usize {
        self.log.lock().unwrap().input_stops
    }

    pub fn output_closes(&self) -> usize {
        self.log.lock().unwrap().output_closes
    }
}

struct FakeInput {
    log: Arc<Mutex<DeviceLog>>,
    deny: bool,
    capturing: bool,
}

#[async_trait::async_trait]
impl InputDevice for FakeInput {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioChunk>> {
        if self.deny {
            anyhow::bail!("microphone permission denied");
        }
        let (tx, rx) = mpsc::channel(32);
        self.log.lock().unwrap().mic = Some(tx);
        self.capturing = true;
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        log.input_stops += 1;
        log.mic = None;
        self.capturing = false;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "fake microphone"
    }
}

struct FakeOutput {
    log: Arc<Mutex<DeviceLog>>,
}

impl OutputDevice for FakeOutput {
    fn now(&self) -> f64 {
        self.log.lock().unwrap().clock
    }

    fn schedule(&mut self, id: UnitId, start_at: f64, samples: Vec<f32>) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .scheduled
            .push((id, start_at, samples.len()));
        Ok(())
    }

    fn stop_unit(&mut self, id: UnitId) -> Result<()> {
        self.log.lock().unwrap().stopped.push(id);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.log.lock().unwrap().output_closes += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "fake speaker"
    }
}

#[async_trait::async_trait]
impl DeviceFactory for FakeDevices {
    async fn open_input(&self, _config: AudioBackendConfig) -> Result<Box<dyn InputDevice>> {
        Ok(Box::new(FakeInput {
            log: Arc::clone(&self.log),
            deny: self.deny_microphone,
            capturing: false,
        }))
    }

    fn open_output(
        &self,
        _config: AudioBackendConfig,
        finished: mpsc::UnboundedSender<UnitId>,
    ) -> Result<Box<dyn OutputDevice>> {
        self.log.lock().unwrap().finished = Some(finished);
        Ok(Box::new(FakeOutput {
            log: Arc::clone(&self.log),
        }))
    }
}
