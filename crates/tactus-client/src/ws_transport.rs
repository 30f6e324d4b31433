//! [`Transport`] over a real WebSocket (`tokio-tungstenite`).
//!
//! `open` spawns a socket task that connects, then pumps frames both ways in
//! a `select!` loop until either side closes.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tactus_types::TactusError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::transport::{Transport, TransportEvent, TransportEvents};

/// How long `close` waits for the socket task before aborting it.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

#[derive(Default)]
pub struct WsTransport {
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WsTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, url: &str, events: TransportEvents) -> Result<(), TactusError> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.outbound.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        let handle = tokio::spawn(run_socket(url.to_string(), rx, events));
        let previous = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
        Ok(())
    }

    async fn send(&self, text: String) -> Result<(), TactusError> {
        let outbound = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = outbound
            .as_ref()
            .ok_or_else(|| TactusError::Transport("socket is not open".to_string()))?;
        tx.send(Message::Text(text.into()))
            .map_err(|_| TactusError::Transport("socket task has stopped".to_string()))
    }

    async fn close(&self) -> Result<(), TactusError> {
        let outbound = self.outbound.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(tx) = outbound {
            let _ = tx.send(Message::Close(None));
        }
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(mut task) = task {
            if tokio::time::timeout(CLOSE_GRACE, &mut task).await.is_err() {
                warn!("socket task did not stop in time; aborting");
                task.abort();
            }
        }
        Ok(())
    }
}

async fn run_socket(url: String, mut outbound: mpsc::UnboundedReceiver<Message>, events: TransportEvents) {
    let (ws, _response) = match connect_async(url.as_str()).await {
        Ok(pair) => pair,
        Err(e) => {
            error!(url = %url, error = %e, "WebSocket connect failed");
            events.emit(TransportEvent::ErrorOccurred { reason: e.to_string() });
            events.emit(TransportEvent::Closed);
            return;
        }
    };
    info!(url = %url, "WebSocket connected");
    events.emit(TransportEvent::Opened);

    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            out = outbound.recv() => match out {
                Some(Message::Close(frame)) => {
                    let _ = sink.send(Message::Close(frame)).await;
                    break;
                }
                Some(msg) => {
                    if let Err(e) = sink.send(msg).await {
                        error!(error = %e, "WebSocket send error");
                        events.emit(TransportEvent::ErrorOccurred { reason: e.to_string() });
                        break;
                    }
                }
                None => {
                    let _ = sink.close().await;
                    break;
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    events.emit(TransportEvent::MessageReceived { text: text.to_string() });
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!(url = %url, "server closed the socket");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!(error = %e, "WebSocket receive error");
                    events.emit(TransportEvent::ErrorOccurred { reason: e.to_string() });
                    break;
                }
            },
        }
    }
    events.emit(TransportEvent::Closed);
}
