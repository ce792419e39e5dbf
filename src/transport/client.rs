use anyhow::{bail, Context, Result};
use async_nats::{Client, Subscriber};
use futures::stream::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::messages::{InboundMessage, OutboundMessage, SessionSetup, TransportEvent};
use super::{LiveConnection, LiveTransport};

/// Live sessions relayed over NATS
///
/// A relay process bridges these subjects to the speech model:
/// - `<prefix>.<session>.setup` - session configuration (published once)
/// - `<prefix>.<session>.media` - outbound microphone chunks
/// - `<prefix>.<session>.events` - inbound model messages
/// - `<prefix>.<session>.error` - relay-reported failures
pub struct NatsTransport {
    url: String,
    subject_prefix: String,
}

impl NatsTransport {
    pub fn new(url: impl Into<String>, subject_prefix: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            subject_prefix: subject_prefix.into(),
        }
    }

    fn subject(&self, session_id: &str, leaf: &str) -> String {
        format!("{}.{}.{}", self.subject_prefix, session_id, leaf)
    }
}

#[async_trait::async_trait]
impl LiveTransport for NatsTransport {
    async fn open(
        &self,
        setup: SessionSetup,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn LiveConnection>> {
        info!("Connecting to NATS relay at {}", self.url);

        let client = async_nats::connect(self.url.as_str())
            .await
            .context("Failed to connect to NATS")?;

        let session_id = setup.session_id.clone();

        // Subscribe before publishing the setup so no early reply is missed
        let inbound = client
            .subscribe(self.subject(&session_id, "events"))
            .await
            .context("Failed to subscribe to session events")?;
        let failures = client
            .subscribe(self.subject(&session_id, "error"))
            .await
            .context("Failed to subscribe to session errors")?;

        let payload = serde_json::to_vec(&setup)?;
        client
            .publish(self.subject(&session_id, "setup"), payload.into())
            .await
            .context("Failed to publish session setup")?;
        client.flush().await.context("Failed to flush session setup")?;

        info!("Live session {} opened", session_id);

        let closed = Arc::new(AtomicBool::new(false));
        let listener = tokio::spawn(listen(inbound, failures, events, Arc::clone(&closed)));

        Ok(Arc::new(NatsConnection {
            client,
            media_subject: self.subject(&session_id, "media"),
            closed,
            listener: Mutex::new(Some(listener)),
        }))
    }
}

async fn listen(
    mut inbound: Subscriber,
    mut failures: Subscriber,
    events: mpsc::UnboundedSender<TransportEvent>,
    closed: Arc<AtomicBool>,
) {
    loop {
        let event = tokio::select! {
            msg = inbound.next() => match msg {
                Some(msg) => match serde_json::from_slice::<InboundMessage>(&msg.payload) {
                    Ok(message) => TransportEvent::Message(message),
                    Err(e) => {
                        warn!("Failed to parse session event: {}", e);
                        continue;
                    }
                },
                None => break,
            },
            msg = failures.next() => match msg {
                Some(msg) => TransportEvent::Error(String::from_utf8_lossy(&msg.payload).into_owned()),
                None => break,
            },
        };

        if events.send(event).is_err() {
            debug!("Session event receiver dropped");
            return;
        }
    }

    if !closed.load(Ordering::SeqCst) {
        let _ = events.send(TransportEvent::Closed);
    }
}

/// An open NATS-relayed session
pub struct NatsConnection {
    client: Client,
    media_subject: String,
    closed: Arc<AtomicBool>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait::async_trait]
impl LiveConnection for NatsConnection {
    async fn send(&self, message: OutboundMessage) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            bail!("Session is closed");
        }

        let payload = serde_json::to_vec(&message)?;
        self.client
            .publish(self.media_subject.clone(), payload.into())
            .await
            .context("Failed to publish media chunk")?;

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        info!("Closing live session ({})", self.media_subject);

        let listener = self
            .listener
            .lock()
            .map_err(|_| anyhow::anyhow!("Listener lock poisoned"))?
            .take();
        if let Some(listener) = listener {
            listener.abort();
        }

        self.client
            .flush()
            .await
            .context("Failed to flush NATS connection")?;

        Ok(())
    }
}
