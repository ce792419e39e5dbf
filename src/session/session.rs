use super::config::SessionConfig;
use super::runtime::{run_event_loop, LoopExit, SessionRuntime};
use super::stats::{SessionCounters, SessionStats};
use super::status::SessionStatus;
use crate::audio::{
    AudioBackendConfig, AudioChunk, CaptureEncoder, DeviceFactory, InputDevice, PlaybackScheduler,
    UnitId,
};
use crate::history::{build_system_instruction, HistoryStore};
use crate::transport::{LiveConnection, LiveTransport, SessionSetup, TransportEvent};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Everything one connected session owns
struct ActiveSession {
    session_id: String,
    started_at: DateTime<Utc>,
    connection: Arc<dyn LiveConnection>,
    input: Box<dyn InputDevice>,
    capture_task: JoinHandle<()>,
    loop_task: JoinHandle<(SessionRuntime, LoopExit)>,
    shutdown_tx: oneshot::Sender<()>,
}

/// Resources acquired while a session is opening
#[derive(Default)]
struct PendingSession {
    scheduler: Option<PlaybackScheduler>,
    input: Option<Box<dyn InputDevice>>,
    connection: Option<Arc<dyn LiveConnection>>,
}

impl PendingSession {
    /// Best-effort release of whatever was acquired
    async fn release(mut self) {
        if let Some(connection) = self.connection.take() {
            if let Err(e) = connection.close().await {
                debug!("Ignoring close failure: {}", e);
            }
        }
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.close();
        }
        if let Some(mut input) = self.input.take() {
            if let Err(e) = input.stop().await {
                debug!("Ignoring input stop failure: {}", e);
            }
        }
    }
}

/// Channels produced by a successful open
struct OpenedChannels {
    audio_rx: mpsc::Receiver<AudioChunk>,
    transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    finished_rx: mpsc::UnboundedReceiver<UnitId>,
}

struct SessionShared {
    config: SessionConfig,
    transport: Arc<dyn LiveTransport>,
    devices: Arc<dyn DeviceFactory>,
    history: Arc<dyn HistoryStore>,
    status: watch::Sender<SessionStatus>,
    stopping: Arc<AtomicBool>,
    /// Bumped by every stop; a start that straddles a stop is abandoned
    epoch: AtomicU64,
    active: Mutex<Option<ActiveSession>>,
    counters: Arc<SessionCounters>,
}

/// The voice session controller
///
/// Owns the session lifecycle: opening devices and the live connection,
/// wiring capture to the outbound channel and inbound events to playback and
/// transcripts, and tearing everything down exactly once. Cloning yields
/// another handle to the same session.
#[derive(Clone)]
pub struct VoiceSession {
    shared: Arc<SessionShared>,
}

impl VoiceSession {
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn LiveTransport>,
        devices: Arc<dyn DeviceFactory>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        let (status, _) = watch::channel(SessionStatus::Disconnected);

        Self {
            shared: Arc::new(SessionShared {
                config,
                transport,
                devices,
                history,
                status,
                stopping: Arc::new(AtomicBool::new(false)),
                epoch: AtomicU64::new(0),
                active: Mutex::new(None),
                counters: Arc::new(SessionCounters::default()),
            }),
        }
    }

    pub fn status(&self) -> SessionStatus {
        *self.shared.status.borrow()
    }

    /// Watch status transitions
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.shared.status.subscribe()
    }

    /// Assistant speech is scheduled or playing
    pub fn is_speaking(&self) -> bool {
        self.shared.counters.speaking.load(Ordering::SeqCst)
    }

    /// The in-progress turn's transcript, empty between turns
    pub fn partial_transcript(&self) -> String {
        self.shared.counters.partial_text()
    }

    pub fn history(&self) -> Arc<dyn HistoryStore> {
        Arc::clone(&self.shared.history)
    }

    fn set_status(&self, status: SessionStatus) {
        let previous = self.shared.status.send_replace(status);
        if previous != status {
            info!("Session status: {} -> {}", previous, status);
        }
    }

    /// Start a session
    ///
    /// No-op while connecting or connected. On failure the status becomes
    /// `Error`, everything acquired so far is released, and the error is
    /// returned.
    pub async fn start(&self) -> Result<()> {
        if self.shared.stopping.load(Ordering::SeqCst) {
            warn!("Stop in progress, ignoring start");
            return Ok(());
        }

        let claimed = self.shared.status.send_if_modified(|status| {
            if status.is_active() {
                false
            } else {
                *status = SessionStatus::Connecting;
                true
            }
        });
        if !claimed {
            warn!("Session already {}", self.status());
            return Ok(());
        }

        info!("Session status: connecting");
        let epoch = self.shared.epoch.load(Ordering::SeqCst);
        self.shared.counters.reset();

        let mut pending = PendingSession::default();
        let opened = match self.open(&mut pending).await {
            Ok(opened) => opened,
            Err(e) => {
                error!("Failed to start session: {:#}", e);
                pending.release().await;
                // A stop that ran meanwhile already settled the status
                if self.shared.epoch.load(Ordering::SeqCst) == epoch {
                    self.fail();
                    self.stop().await;
                }
                return Err(e);
            }
        };

        self.install(epoch, pending, opened).await;
        Ok(())
    }

    /// Acquire devices, microphone and the live connection
    async fn open(&self, pending: &mut PendingSession) -> Result<(String, OpenedChannels)> {
        let shared = &self.shared;
        let config = &shared.config;

        let input_config = AudioBackendConfig {
            sample_rate: config.input_sample_rate,
            channels: 1,
            block_size: config.block_size,
        };
        let output_config = AudioBackendConfig {
            sample_rate: config.output_sample_rate,
            channels: 1,
            block_size: config.block_size,
        };

        let input = shared
            .devices
            .open_input(input_config)
            .await
            .context("Failed to open input device")?;
        let input = pending.input.insert(input);

        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        let output = shared
            .devices
            .open_output(output_config, finished_tx)
            .context("Failed to open output device")?;
        pending.scheduler = Some(PlaybackScheduler::new(output, config.output_sample_rate));

        let audio_rx = input
            .start()
            .await
            .context("Microphone access failed")?;

        let recent = shared
            .history
            .list()
            .context("Failed to read conversation history")?;
        let session_id = config.new_session_id();
        let setup = SessionSetup::audio(
            session_id.clone(),
            config.voice.clone(),
            build_system_instruction(&config.base_instruction, &recent),
        );

        info!(
            "Opening live session {} ({} history turns)",
            session_id,
            recent.len()
        );

        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let connection = shared
            .transport
            .open(setup, transport_tx)
            .await
            .context("Failed to open live session")?;
        pending.connection = Some(connection);

        Ok((
            session_id,
            OpenedChannels {
                audio_rx,
                transport_rx,
                finished_rx,
            },
        ))
    }

    /// Spawn the session tasks and publish `Connected`
    ///
    /// If a stop ran while the session was opening, the freshly acquired
    /// resources are released instead.
    async fn install(&self, epoch: u64, mut pending: PendingSession, opened: (String, OpenedChannels)) {
        let shared = &self.shared;
        let mut active = shared.active.lock().await;

        let cancelled = shared.epoch.load(Ordering::SeqCst) != epoch
            || shared.stopping.load(Ordering::SeqCst);
        let parts = match (
            cancelled,
            pending.connection.take(),
            pending.scheduler.take(),
            pending.input.take(),
        ) {
            (false, Some(connection), Some(scheduler), Some(input)) => (connection, scheduler, input),
            (_, connection, scheduler, input) => {
                drop(active);
                info!("Session start cancelled by stop");
                PendingSession {
                    scheduler,
                    input,
                    connection,
                }
                .release()
                .await;
                return;
            }
        };
        let (connection, scheduler, input) = parts;
        let (session_id, channels) = opened;

        // Published before the tasks exist, so a failure they report cannot
        // be overwritten by this transition
        let connected = shared.status.send_if_modified(|status| {
            if *status == SessionStatus::Connecting {
                *status = SessionStatus::Connected;
                true
            } else {
                false
            }
        });
        if !connected {
            drop(active);
            info!("Session start abandoned ({})", self.status());
            PendingSession {
                scheduler: Some(scheduler),
                input: Some(input),
                connection: Some(connection),
            }
            .release()
            .await;
            return;
        }
        info!("Session status: connecting -> connected");

        let runtime = SessionRuntime::new(
            scheduler,
            Arc::clone(&shared.history),
            Arc::clone(&shared.counters),
        );
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let session = self.clone();
        let loop_task = tokio::spawn(async move {
            let (runtime, exit) = run_event_loop(
                runtime,
                channels.transport_rx,
                channels.finished_rx,
                shutdown_rx,
            )
            .await;
            session.on_loop_exit(epoch, &exit);
            (runtime, exit)
        });

        let encoder = CaptureEncoder::new(
            Arc::clone(&shared.stopping),
            Arc::clone(&shared.counters.chunks_sent),
        );
        let capture_task = tokio::spawn(encoder.run(channels.audio_rx, Arc::clone(&connection)));

        *active = Some(ActiveSession {
            session_id: session_id.clone(),
            started_at: Utc::now(),
            connection,
            input,
            capture_task,
            loop_task,
            shutdown_tx,
        });
        info!("Session {} connected", session_id);
    }

    /// Called from the event loop task as it exits
    ///
    /// `epoch` identifies the session the loop belonged to. If that session
    /// was already stopped, the exit is stale and must not touch a newer one.
    fn on_loop_exit(&self, epoch: u64, exit: &LoopExit) {
        if matches!(exit, LoopExit::Shutdown) {
            return;
        }
        if self.shared.epoch.load(Ordering::SeqCst) != epoch {
            debug!("Ignoring stale loop exit: {:?}", exit);
            return;
        }

        match exit {
            LoopExit::TransportError(reason) => {
                error!("Live session error: {}", reason);
                self.fail();
            }
            _ => info!("Live session closed by remote"),
        }

        let session = self.clone();
        tokio::spawn(async move { session.stop_epoch(Some(epoch)).await });
    }

    /// Mark the session failed, unless a stop is already tearing it down
    fn fail(&self) {
        if !self.shared.stopping.load(Ordering::SeqCst) {
            self.set_status(SessionStatus::Error);
        }
    }

    /// Stop the session
    ///
    /// Idempotent: concurrent or repeated calls collapse into one teardown.
    /// Every release is best-effort and errors are only logged. The status
    /// ends as `Disconnected`, except that `Error` is preserved so callers
    /// can tell a failure stop from a clean one.
    pub async fn stop(&self) {
        self.stop_epoch(None).await
    }

    /// Stop, limited to the session started in `expected` when given
    async fn stop_epoch(&self, expected: Option<u64>) {
        let shared = &self.shared;
        if shared
            .stopping
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Stop already in progress");
            return;
        }

        let active = {
            let mut guard = shared.active.lock().await;
            let epoch = shared.epoch.load(Ordering::SeqCst);
            if matches!(expected, Some(e) if e != epoch) {
                drop(guard);
                debug!("Session already replaced, skipping stop");
                shared.stopping.store(false, Ordering::SeqCst);
                return;
            }
            shared.epoch.fetch_add(1, Ordering::SeqCst);
            guard.take()
        };

        if let Some(active) = active {
            info!("Stopping session {}", active.session_id);
            Self::teardown(active).await;
        }

        shared.counters.speaking.store(false, Ordering::SeqCst);
        shared.counters.set_partial(Default::default());

        shared.status.send_modify(|status| {
            if *status != SessionStatus::Error {
                *status = SessionStatus::Disconnected;
            }
        });
        info!("Session stopped ({})", self.status());

        shared.stopping.store(false, Ordering::SeqCst);
    }

    async fn teardown(active: ActiveSession) {
        let ActiveSession {
            connection,
            mut input,
            capture_task,
            loop_task,
            shutdown_tx,
            ..
        } = active;

        if let Err(e) = connection.close().await {
            debug!("Ignoring close failure: {}", e);
        }

        // The loop may already have exited on its own
        let _ = shutdown_tx.send(());
        match loop_task.await {
            Ok((mut runtime, _)) => runtime.shutdown(),
            Err(e) => error!("Session event loop failed: {}", e),
        }

        capture_task.abort();
        if let Err(e) = capture_task.await {
            if !e.is_cancelled() {
                warn!("Capture task failed: {}", e);
            }
        }

        if let Err(e) = input.stop().await {
            debug!("Ignoring input stop failure: {}", e);
        }
    }

    /// Stop if connected, otherwise start
    pub async fn toggle(&self) -> Result<()> {
        if self.status() == SessionStatus::Connected {
            self.stop().await;
            Ok(())
        } else {
            self.start().await
        }
    }

    /// Get current session statistics
    pub async fn stats(&self) -> SessionStats {
        let (session_id, started_at) = {
            let active = self.shared.active.lock().await;
            match active.as_ref() {
                Some(a) => (Some(a.session_id.clone()), Some(a.started_at)),
                None => (None, None),
            }
        };

        let duration_secs = started_at
            .map(|t| Utc::now().signed_duration_since(t).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);
        let counters = &self.shared.counters;

        SessionStats {
            status: self.status(),
            session_id,
            started_at,
            duration_secs,
            chunks_sent: counters.chunks_sent.load(Ordering::SeqCst),
            units_scheduled: counters.units_scheduled.load(Ordering::SeqCst),
            interruptions: counters.interruptions.load(Ordering::SeqCst),
            turns_recorded: counters.turns_recorded.load(Ordering::SeqCst),
            speaking: counters.speaking.load(Ordering::SeqCst),
            partial_transcript: counters.partial_text(),
        }
    }
}
