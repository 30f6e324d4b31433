//! The public client facade.

use std::sync::{Arc, PoisonError};
use std::time::Duration;

use tactus_protocol::{Bare, ClientMessage, RequestServerInfo, ServerInfo};
use tactus_types::{
    CommandDescriptor, ConnectionPhase, ConnectionState, Device, SensorSnapshot, TactusError,
};
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audit::{AuditSink, TracingAudit};
use crate::bus::{ClientEvent, ListenerId, MessageListener, NotificationBus};
use crate::config::ClientConfig;
use crate::connection::ConnectionMachine;
use crate::dispatcher::{Dispatcher, ServerInfoSlot};
use crate::registry::{DeviceRegistry, SensorSlot};
use crate::router::{
    CommandOutcome, CommandRouter, LinearCommand, Routed, RotateCommand, ScalarCommand, SensorAction,
};
use crate::sender::SendPath;
use crate::transport::{Transport, TransportEvents};

/// Tasks owned by one connection attempt.
struct Session {
    shutdown: watch::Sender<bool>,
    dispatcher: JoinHandle<()>,
    handshake: JoinHandle<()>,
}

/// Asynchronous client for a device server.
///
/// ```no_run
/// # async fn demo() -> Result<(), tactus_types::TactusError> {
/// use std::sync::Arc;
/// use tactus_client::{Actuation, Client, ClientConfig, WsTransport};
///
/// let client = Client::new(ClientConfig::new("ws://127.0.0.1:12345"), Arc::new(WsTransport::new()));
/// client.connect().await?;
/// client.wait_until_identified(None).await?;
/// client.start_scan().await?;
/// for device in client.devices() {
///     client.send_scalar(&device, Actuation::uniform(0.5)).await?;
/// }
/// client.disconnect().await?;
/// # Ok(())
/// # }
/// ```
pub struct Client {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    connection: ConnectionMachine,
    registry: Arc<DeviceRegistry>,
    sensors: Arc<SensorSlot>,
    server_info: ServerInfoSlot,
    bus: Arc<NotificationBus>,
    audit: Arc<dyn AuditSink>,
    sender: Arc<SendPath>,
    session: Mutex<Option<Session>>,
}

impl Client {
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let connection = ConnectionMachine::new();
        let audit: Arc<dyn AuditSink> = Arc::new(TracingAudit);
        let sender = Arc::new(SendPath::new(
            Arc::clone(&transport),
            connection.clone(),
            Arc::clone(&audit),
            config.send_timeout(),
        ));
        Self {
            bus: Arc::new(NotificationBus::new(config.event_capacity)),
            config,
            transport,
            connection,
            registry: Arc::new(DeviceRegistry::new()),
            sensors: Arc::new(SensorSlot::default()),
            server_info: ServerInfoSlot::default(),
            audit,
            sender,
            session: Mutex::new(None),
        }
    }

    /// Replace the default [`TracingAudit`] sink.
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.sender = Arc::new(SendPath::new(
            Arc::clone(&self.transport),
            self.connection.clone(),
            Arc::clone(&audit),
            self.config.send_timeout(),
        ));
        self.audit = audit;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // ───────────────────────────────────────────────────────────────────────
    // Connection lifecycle
    // ───────────────────────────────────────────────────────────────────────

    /// Open the socket and start the handshake.
    ///
    /// Returns once the transport has begun connecting. Progress is visible
    /// through [`phase`](Self::phase) and
    /// [`wait_until_identified`](Self::wait_until_identified).
    ///
    /// # Errors
    ///
    /// [`TactusError::AlreadyConnected`] unless the client is idle, or the
    /// transport's error if the attempt could not start.
    pub async fn connect(&self) -> Result<(), TactusError> {
        let mut session = self.session.lock().await;
        self.connection.begin_connect()?;
        if let Some(previous) = session.take() {
            previous.stop().await;
        }
        self.clear_session_state();

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let dispatcher = Dispatcher {
            registry: Arc::clone(&self.registry),
            sensors: Arc::clone(&self.sensors),
            server_info: Arc::clone(&self.server_info),
            connection: self.connection.clone(),
            bus: Arc::clone(&self.bus),
            audit: Arc::clone(&self.audit),
        }
        .spawn(inbound_rx, shutdown_rx.clone());

        let events = TransportEvents::new(self.connection.clone(), inbound_tx);
        if let Err(e) = self.transport.open(&self.config.url, events).await {
            warn!(url = %self.config.url, error = %e, "connect failed");
            self.connection.reset();
            shutdown.send_replace(true);
            let _ = dispatcher.await;
            return Err(e);
        }
        info!(url = %self.config.url, "connecting");

        let handshake = tokio::spawn(run_handshake(
            Arc::clone(&self.sender),
            Arc::clone(&self.transport),
            self.connection.clone(),
            Arc::clone(&self.server_info),
            self.config.clone(),
            shutdown_rx,
        ));
        *session = Some(Session { shutdown, dispatcher, handshake });
        Ok(())
    }

    /// Stop the dispatcher and handshake tasks and close the socket.
    ///
    /// Pending sends are released with [`TactusError::NotConnected`], and the
    /// devices, sensor reading and server details of the session are
    /// forgotten. Disconnecting an idle client is a no-op.
    pub async fn disconnect(&self) -> Result<(), TactusError> {
        let Some(session) = self.session.lock().await.take() else {
            self.connection.reset();
            return Ok(());
        };
        session.stop().await;
        self.connection.reset();
        self.clear_session_state();
        self.transport.close().await?;
        info!("disconnected");
        Ok(())
    }

    /// Device indices are only meaningful to the server that assigned them.
    fn clear_session_state(&self) {
        self.registry.clear();
        self.sensors.clear();
        *self.server_info.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.connection.phase()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub async fn wait_until_identified(&self, deadline: Option<Duration>) -> Result<(), TactusError> {
        self.connection.wait_until_identified(deadline).await
    }

    /// Identification details from the last `ServerInfo`.
    pub fn server_info(&self) -> Option<ServerInfo> {
        self.server_info.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    // ───────────────────────────────────────────────────────────────────────
    // Registry views
    // ───────────────────────────────────────────────────────────────────────

    pub fn devices(&self) -> Vec<Device> {
        self.registry.snapshot()
    }

    /// Read-only handle on the registry, e.g. for listeners.
    pub fn registry(&self) -> Arc<DeviceRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn sensor_snapshot(&self) -> Option<SensorSnapshot> {
        self.sensors.snapshot()
    }

    pub fn command_descriptors(&self, device: &Device, command: &str) -> Result<Vec<CommandDescriptor>, TactusError> {
        self.registry.descriptors(device.id, command)
    }

    // ───────────────────────────────────────────────────────────────────────
    // Notifications
    // ───────────────────────────────────────────────────────────────────────

    pub fn add_listener(&self, listener: impl MessageListener + 'static) -> ListenerId {
        self.bus.add_listener(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.bus.remove_listener(id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.bus.subscribe()
    }

    // ───────────────────────────────────────────────────────────────────────
    // Server commands
    // ───────────────────────────────────────────────────────────────────────

    /// Returns the correlation id the request went out with.
    pub async fn start_scan(&self) -> Result<u32, TactusError> {
        self.sender.send(ClientMessage::StartScanning(Bare::default())).await
    }

    pub async fn stop_scan(&self) -> Result<u32, TactusError> {
        self.sender.send(ClientMessage::StopScanning(Bare::default())).await
    }

    pub async fn request_device_list(&self) -> Result<u32, TactusError> {
        self.sender.send(ClientMessage::RequestDeviceList(Bare::default())).await
    }

    pub async fn stop_all_devices(&self) -> Result<u32, TactusError> {
        self.dispatch(CommandRouter::stop_all()).await.map(|o| o.id)
    }

    // ───────────────────────────────────────────────────────────────────────
    // Device commands
    // ───────────────────────────────────────────────────────────────────────

    pub async fn stop_device(&self, device: &Device) -> Result<u32, TactusError> {
        self.ensure_started()?;
        let routed = self.router().stop_device(device.id)?;
        self.dispatch(routed).await.map(|o| o.id)
    }

    pub async fn send_scalar(&self, device: &Device, command: ScalarCommand) -> Result<CommandOutcome, TactusError> {
        self.ensure_started()?;
        let routed = self.router().scalar(device.id, &command)?;
        self.dispatch(routed).await
    }

    pub async fn send_linear(&self, device: &Device, command: LinearCommand) -> Result<CommandOutcome, TactusError> {
        self.ensure_started()?;
        let routed = self.router().linear(device.id, &command)?;
        self.dispatch(routed).await
    }

    pub async fn send_rotate(&self, device: &Device, command: RotateCommand) -> Result<CommandOutcome, TactusError> {
        self.ensure_started()?;
        let routed = self.router().rotate(device.id, &command)?;
        self.dispatch(routed).await
    }

    pub async fn sensor_read(&self, device: &Device, sensor_index: u32) -> Result<u32, TactusError> {
        self.sensor(device, sensor_index, SensorAction::Read).await
    }

    pub async fn sensor_subscribe(&self, device: &Device, sensor_index: u32) -> Result<u32, TactusError> {
        self.sensor(device, sensor_index, SensorAction::Subscribe).await
    }

    pub async fn sensor_unsubscribe(&self, device: &Device, sensor_index: u32) -> Result<u32, TactusError> {
        self.sensor(device, sensor_index, SensorAction::Unsubscribe).await
    }

    async fn sensor(&self, device: &Device, sensor_index: u32, action: SensorAction) -> Result<u32, TactusError> {
        self.ensure_started()?;
        let routed = self.router().sensor(device.id, sensor_index, action)?;
        self.dispatch(routed).await.map(|o| o.id)
    }

    fn router(&self) -> CommandRouter<'_> {
        CommandRouter::new(&self.registry)
    }

    /// Routing against an empty registry would report `UnknownDevice`;
    /// an idle client reports `NotConnected` instead.
    fn ensure_started(&self) -> Result<(), TactusError> {
        if self.connection.phase() == ConnectionPhase::Idle {
            Err(TactusError::NotConnected)
        } else {
            Ok(())
        }
    }

    async fn dispatch(&self, routed: Routed) -> Result<CommandOutcome, TactusError> {
        if !routed.skipped.is_empty() {
            debug!(skipped = ?routed.skipped, "actuator indices out of range");
        }
        let id = self.sender.send(routed.message).await?;
        Ok(CommandOutcome { id, skipped: routed.skipped })
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.shutdown.send_replace(true);
            session.handshake.abort();
        }
    }
}

impl Session {
    /// Signal shutdown, then wait for both tasks.
    async fn stop(self) {
        self.shutdown.send_replace(true);
        if self.dispatcher.await.is_err() {
            warn!("dispatcher task ended abnormally");
        }
        self.handshake.abort();
        let _ = self.handshake.await;
    }
}

/// Identify to the server, then keep the session alive with `Ping` at half
/// the server's `MaxPingTime` for as long as the connection stays identified.
///
/// A server that never identifies itself within the handshake timeout gets
/// its socket closed, so nothing stays parked behind the identification gate.
async fn run_handshake(
    sender: Arc<SendPath>,
    transport: Arc<dyn Transport>,
    connection: ConnectionMachine,
    server_info: ServerInfoSlot,
    config: ClientConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let hello = ClientMessage::RequestServerInfo(RequestServerInfo {
        id: 0,
        client_name: config.client_name.clone(),
        message_version: config.message_version,
    });
    if let Err(e) = sender.send(hello).await {
        debug!(error = %e, "identification request not sent");
        return;
    }
    if let Err(e) = connection.wait_until_identified(config.handshake_timeout()).await {
        warn!(error = %e, "server did not identify itself");
        if matches!(e, TactusError::Timeout { .. }) {
            connection.reset();
            if let Err(e) = transport.close().await {
                warn!(error = %e, "closing unidentified socket failed");
            }
        }
        return;
    }

    let max_ping = server_info
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
        .map_or(0, |info| info.max_ping_time);
    if !config.ping || max_ping == 0 {
        return;
    }
    let period = Duration::from_millis(u64::from(max_ping / 2).max(1));
    debug!(period_ms = period.as_millis() as u64, "ping loop started");
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                if connection.phase() != ConnectionPhase::Identified {
                    break;
                }
                if let Err(e) = sender.send(ClientMessage::Ping(Bare::default())).await {
                    debug!(error = %e, "ping loop stopped");
                    break;
                }
            }
        }
    }
}
