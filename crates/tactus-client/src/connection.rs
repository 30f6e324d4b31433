//! Connection state machine.
//!
//! The current [`ConnectionPhase`] lives in a [`tokio::sync::watch`] channel.
//! Transitions only move forward (`Idle -> Connecting -> SocketOpen ->
//! Identifying -> Identified`), except that a closed socket drops any phase
//! back to `Idle`. Waiters subscribe to the channel and wake on every change,
//! so a socket that closes mid-handshake releases them with
//! [`TactusError::NotConnected`] instead of leaving them parked.

use std::sync::Arc;
use std::time::Duration;

use tactus_types::{ConnectionPhase, ConnectionState, TactusError};
use tokio::sync::watch;
use tracing::debug;

/// Shared handle to the connection phase. Clones observe the same state.
#[derive(Clone, Debug)]
pub struct ConnectionMachine {
    phase: Arc<watch::Sender<ConnectionPhase>>,
}

impl Default for ConnectionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionMachine {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionPhase::Idle);
        Self { phase: Arc::new(tx) }
    }

    pub fn phase(&self) -> ConnectionPhase {
        *self.phase.borrow()
    }

    pub fn state(&self) -> ConnectionState {
        self.phase().into()
    }

    /// `Idle -> Connecting`. Any other starting phase is rejected.
    pub(crate) fn begin_connect(&self) -> Result<(), TactusError> {
        let moved = self.advance(&[ConnectionPhase::Idle], ConnectionPhase::Connecting);
        if moved { Ok(()) } else { Err(TactusError::AlreadyConnected) }
    }

    pub(crate) fn socket_opened(&self) -> bool {
        self.advance(&[ConnectionPhase::Connecting], ConnectionPhase::SocketOpen)
    }

    pub(crate) fn identifying(&self) -> bool {
        self.advance(&[ConnectionPhase::SocketOpen], ConnectionPhase::Identifying)
    }

    /// A `ServerInfo` arrived. Ignored unless the socket is open.
    pub(crate) fn identified(&self) -> bool {
        self.advance(
            &[ConnectionPhase::SocketOpen, ConnectionPhase::Identifying],
            ConnectionPhase::Identified,
        )
    }

    /// The socket closed or the client is tearing down.
    pub(crate) fn reset(&self) {
        let previous = self.phase.send_replace(ConnectionPhase::Idle);
        if previous != ConnectionPhase::Idle {
            debug!(from = %previous, "connection reset to idle");
        }
    }

    fn advance(&self, from: &[ConnectionPhase], to: ConnectionPhase) -> bool {
        let mut previous = None;
        let moved = self.phase.send_if_modified(|current| {
            if from.contains(current) {
                previous = Some(*current);
                *current = to;
                true
            } else {
                false
            }
        });
        if let Some(previous) = previous {
            debug!(from = %previous, to = %to, "connection phase");
        }
        moved
    }

    pub async fn wait_until_socket_open(&self, deadline: Option<Duration>) -> Result<(), TactusError> {
        self.wait_for(ConnectionPhase::SocketOpen, deadline).await
    }

    pub async fn wait_until_identified(&self, deadline: Option<Duration>) -> Result<(), TactusError> {
        self.wait_for(ConnectionPhase::Identified, deadline).await
    }

    /// Wait until the phase reaches `target`.
    ///
    /// Returns [`TactusError::NotConnected`] if the phase is, or falls back
    /// to, `Idle` first, and [`TactusError::Timeout`] once `deadline` elapses.
    async fn wait_for(&self, target: ConnectionPhase, deadline: Option<Duration>) -> Result<(), TactusError> {
        let mut rx = self.phase.subscribe();
        let wait = async move {
            let reached = match rx
                .wait_for(|p| *p >= target || *p == ConnectionPhase::Idle)
                .await
            {
                Ok(phase) => *phase >= target,
                Err(_) => false,
            };
            if reached { Ok(()) } else { Err(TactusError::NotConnected) }
        };
        match deadline {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| TactusError::Timeout { phase: target })?,
            None => wait.await,
        }
    }
}
