//! Live session transport
//!
//! The session controller talks to the remote speech model through the
//! [`LiveTransport`] / [`LiveConnection`] pair. Connection callbacks (message,
//! error, close) are delivered as [`TransportEvent`]s on the channel handed to
//! [`LiveTransport::open`].

pub mod client;
pub mod messages;

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;

pub use client::{NatsConnection, NatsTransport};
pub use messages::{
    InboundMessage, MediaChunk, OutboundMessage, SessionSetup, Transcription, TransportEvent,
    INPUT_MIME_TYPE,
};

/// Opens live sessions with the remote model
#[async_trait::async_trait]
pub trait LiveTransport: Send + Sync {
    /// Open a session configured with `setup`
    ///
    /// Inbound messages, errors and the close notification are sent to
    /// `events` for as long as the connection lives.
    async fn open(
        &self,
        setup: SessionSetup,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn LiveConnection>>;
}

/// An open live session
#[async_trait::async_trait]
pub trait LiveConnection: Send + Sync {
    /// Send a message to the model
    async fn send(&self, message: OutboundMessage) -> Result<()>;

    /// Close the session; later sends fail
    async fn close(&self) -> Result<()>;
}
