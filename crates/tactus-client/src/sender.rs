//! Outbound path: connection gate, correlation ids, encoding.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tactus_protocol::{codec, ClientMessage};
use tactus_types::{ConnectionPhase, TactusError};
use tracing::{debug, instrument};

use crate::audit::AuditSink;
use crate::connection::ConnectionMachine;
use crate::transport::Transport;

pub(crate) struct SendPath {
    transport: Arc<dyn Transport>,
    connection: ConnectionMachine,
    audit: Arc<dyn AuditSink>,
    next_id: AtomicU32,
    timeout: Option<Duration>,
}

impl SendPath {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        connection: ConnectionMachine,
        audit: Arc<dyn AuditSink>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            transport,
            connection,
            audit,
            next_id: AtomicU32::new(1),
            timeout,
        }
    }

    /// Next correlation id. Starts at 1 and skips 0 on wrap-around.
    fn next_id(&self) -> u32 {
        let bump = |n: u32| Some(n.checked_add(1).unwrap_or(1));
        match self.next_id.fetch_update(Ordering::Relaxed, Ordering::Relaxed, bump) {
            Ok(id) | Err(id) => id,
        }
    }

    /// Stamp `message` with a fresh id and send it once the connection allows.
    ///
    /// Every message waits for the socket to open. The identification request
    /// goes out as soon as it has; everything else also waits for the server
    /// to identify itself.
    #[instrument(skip_all, fields(kind = %message.kind()))]
    pub(crate) async fn send(&self, message: ClientMessage) -> Result<u32, TactusError> {
        if self.connection.phase() == ConnectionPhase::Idle {
            return Err(TactusError::NotConnected);
        }
        let id = self.next_id();
        let message = message.with_id(id);
        let kind = message.kind();

        self.connection.wait_until_socket_open(self.timeout).await?;
        if message.is_handshake() {
            self.connection.identifying();
        } else {
            self.connection.wait_until_identified(self.timeout).await?;
        }

        let text = codec::encode(&message).map_err(|e| TactusError::Serialization(e.to_string()))?;
        self.transport.send(text).await?;
        debug!(id, "message sent");
        self.audit.record_sent(kind, id);
        Ok(id)
    }
}
