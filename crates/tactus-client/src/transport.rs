//! The socket seam.
//!
//! The client never talks to a WebSocket library directly. It drives a
//! [`Transport`] and receives the transport's lifecycle through a
//! [`TransportEvents`] handle. [`WsTransport`](crate::WsTransport) is the
//! production implementation; tests substitute an in-memory one.

use async_trait::async_trait;
use tactus_types::TactusError;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::connection::ConnectionMachine;

/// Something that happened on the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Closed,
    ErrorOccurred { reason: String },
    MessageReceived { text: String },
}

/// Work item for the inbound dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Inbound {
    Frame(String),
    TransportError(String),
    Disconnected,
}

/// Where a transport reports its events.
///
/// Open and close update the connection phase at once, from whatever thread
/// the transport runs on. Frames and faults are queued for the dispatcher so
/// they are processed one at a time, in arrival order.
#[derive(Debug, Clone)]
pub struct TransportEvents {
    connection: ConnectionMachine,
    inbound: mpsc::UnboundedSender<Inbound>,
}

impl TransportEvents {
    pub(crate) fn new(connection: ConnectionMachine, inbound: mpsc::UnboundedSender<Inbound>) -> Self {
        Self { connection, inbound }
    }

    pub fn emit(&self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                if self.connection.socket_opened() {
                    info!("socket open");
                }
            }
            TransportEvent::Closed => {
                self.connection.reset();
                info!("socket closed");
                self.enqueue(Inbound::Disconnected);
            }
            TransportEvent::ErrorOccurred { reason } => {
                warn!(reason = %reason, "transport error");
                self.enqueue(Inbound::TransportError(reason));
            }
            TransportEvent::MessageReceived { text } => self.enqueue(Inbound::Frame(text)),
        }
    }

    fn enqueue(&self, item: Inbound) {
        // The dispatcher is gone once the client disconnects; late events are dropped.
        let _ = self.inbound.send(item);
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Start opening a socket to `url`.
    ///
    /// Returns once the attempt is underway; the outcome is reported through
    /// `events` as [`TransportEvent::Opened`] or [`TransportEvent::Closed`].
    async fn open(&self, url: &str, events: TransportEvents) -> Result<(), TactusError>;

    /// Queue one text frame.
    async fn send(&self, text: String) -> Result<(), TactusError>;

    async fn close(&self) -> Result<(), TactusError>;
}
