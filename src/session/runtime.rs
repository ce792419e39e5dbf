// Session event loop
//
// All playback, transcript and history mutation for one session happens in
// this task. Inputs are transport events and playback completions; a handler
// runs to completion before the next event is taken, so an interruption is
// applied before any later payload can be scheduled.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::stats::SessionCounters;
use crate::audio::{PlaybackScheduler, UnitId};
use crate::history::{HistoryStore, Speaker};
use crate::transcript::TranscriptAggregator;
use crate::transport::{InboundMessage, TransportEvent};

/// Why the event loop ended
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LoopExit {
    Shutdown,
    TransportError(String),
    TransportClosed,
}

/// Per-session state owned by the event loop
pub(crate) struct SessionRuntime {
    pub scheduler: PlaybackScheduler,
    pub aggregator: TranscriptAggregator,
    history: Arc<dyn HistoryStore>,
    counters: Arc<SessionCounters>,
}

impl SessionRuntime {
    pub fn new(
        scheduler: PlaybackScheduler,
        history: Arc<dyn HistoryStore>,
        counters: Arc<SessionCounters>,
    ) -> Self {
        Self {
            scheduler,
            aggregator: TranscriptAggregator::new(),
            history,
            counters,
        }
    }

    /// Route one inbound message
    ///
    /// Fields are handled in a fixed order: interruption, speech, user
    /// transcript, assistant transcript, turn boundary.
    pub fn handle_message(&mut self, message: InboundMessage) {
        if message.interrupted {
            self.scheduler.interrupt();
            self.counters.interruptions.fetch_add(1, Ordering::Relaxed);
        }

        if let Some(payload) = message.audio.as_deref() {
            match self.scheduler.enqueue(payload) {
                Ok(_) => {
                    self.counters.units_scheduled.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => warn!("Dropping speech payload: {:#}", e),
            }
        }

        let mut transcript_changed = false;
        if let Some(fragment) = &message.input_transcription {
            transcript_changed |= self.aggregator.append(Speaker::User, &fragment.text);
        }
        if let Some(fragment) = &message.output_transcription {
            transcript_changed |= self.aggregator.append(Speaker::Assistant, &fragment.text);
        }

        if message.turn_complete {
            if let Some(entry) = self.aggregator.flush_on_turn_complete() {
                info!("Turn complete ({}): {}", entry.speaker, entry.text);
                match self.history.append(entry) {
                    Ok(()) => {
                        self.counters.turns_recorded.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => error!("Failed to record turn: {:#}", e),
                }
            }
            transcript_changed = true;
        }

        if transcript_changed {
            self.counters.set_partial(self.aggregator.current().clone());
        }
        self.publish_speaking();
    }

    pub fn on_unit_finished(&mut self, id: UnitId) {
        if self.scheduler.on_unit_finished(id) {
            self.publish_speaking();
        }
    }

    /// Stop playback, release the output device and drop the partial turn
    pub fn shutdown(&mut self) {
        self.scheduler.close();
        self.aggregator.reset();
        self.counters.set_partial(Default::default());
        self.publish_speaking();
    }

    fn publish_speaking(&self) {
        self.counters
            .speaking
            .store(self.scheduler.is_speaking(), Ordering::SeqCst);
    }
}

/// Process events until shutdown is requested or the transport goes away
pub(crate) async fn run_event_loop(
    mut runtime: SessionRuntime,
    mut transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    mut finished_rx: mpsc::UnboundedReceiver<UnitId>,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> (SessionRuntime, LoopExit) {
    info!("Session event loop started");

    let exit = loop {
        tokio::select! {
            biased;

            _ = &mut shutdown_rx => break LoopExit::Shutdown,

            Some(id) = finished_rx.recv() => runtime.on_unit_finished(id),

            event = transport_rx.recv() => match event {
                Some(TransportEvent::Message(message)) => runtime.handle_message(message),
                Some(TransportEvent::Error(reason)) => break LoopExit::TransportError(reason),
                Some(TransportEvent::Closed) | None => break LoopExit::TransportClosed,
            },
        }
    };

    debug!("Session event loop exited: {:?}", exit);
    (runtime, exit)
}
