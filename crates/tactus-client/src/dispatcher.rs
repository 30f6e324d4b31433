//! Inbound dispatcher.
//!
//! A single task drains the inbound queue in arrival order. Each frame is
//! decoded into its batch of messages; each message updates the registry (or
//! the connection phase, or the sensor slot) and is then announced on the
//! notification bus. An entry that fails to decode is reported and skipped
//! without disturbing its neighbours.

use std::sync::{Arc, PoisonError, RwLock};

use tactus_protocol::{codec, ServerInfo, ServerMessage};
use tactus_types::{Device, SensorSnapshot};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audit::AuditSink;
use crate::bus::{ClientEvent, NotificationBus};
use crate::connection::ConnectionMachine;
use crate::registry::{DeviceRegistry, SensorSlot};
use crate::transport::Inbound;

pub(crate) type ServerInfoSlot = Arc<RwLock<Option<ServerInfo>>>;

pub(crate) struct Dispatcher {
    pub(crate) registry: Arc<DeviceRegistry>,
    pub(crate) sensors: Arc<SensorSlot>,
    pub(crate) server_info: ServerInfoSlot,
    pub(crate) connection: ConnectionMachine,
    pub(crate) bus: Arc<NotificationBus>,
    pub(crate) audit: Arc<dyn AuditSink>,
}

impl Dispatcher {
    pub(crate) fn spawn(self, inbound: mpsc::UnboundedReceiver<Inbound>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(inbound, shutdown))
    }

    async fn run(self, mut inbound: mpsc::UnboundedReceiver<Inbound>, mut shutdown: watch::Receiver<bool>) {
        debug!("dispatcher started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                item = inbound.recv() => match item {
                    Some(item) => self.handle(item),
                    None => break,
                },
            }
        }
        debug!("dispatcher stopped");
    }

    pub(crate) fn handle(&self, item: Inbound) {
        match item {
            Inbound::Frame(text) => self.handle_frame(&text),
            Inbound::TransportError(reason) => self.bus.notify(ClientEvent::TransportError(reason)),
            Inbound::Disconnected => self.bus.notify(ClientEvent::Disconnected),
        }
    }

    fn handle_frame(&self, text: &str) {
        let batch = match codec::decode_server_frame(text) {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, "dropping undecodable frame");
                self.bus.notify(ClientEvent::ProtocolError(e.into()));
                return;
            }
        };
        for entry in batch {
            match entry {
                Ok(message) => self.apply(message),
                Err(e) => {
                    warn!(error = %e, "skipping undecodable message");
                    self.bus.notify(ClientEvent::ProtocolError(e.into()));
                }
            }
        }
    }

    fn apply(&self, message: ServerMessage) {
        match &message {
            ServerMessage::ServerInfo(server) => {
                info!(
                    server = %server.server_name,
                    version = server.message_version,
                    max_ping_ms = server.max_ping_time,
                    "server identified"
                );
                *self.server_info.write().unwrap_or_else(PoisonError::into_inner) = Some(server.clone());
                self.connection.identified();
            }
            ServerMessage::DeviceList(list) => {
                self.registry.replace_all(list.devices.iter().map(Device::from).collect());
            }
            ServerMessage::DeviceAdded(added) => self.registry.upsert(Device::from(&added.device)),
            ServerMessage::DeviceRemoved(removed) => {
                self.registry.remove(removed.device_index);
            }
            ServerMessage::SensorReading(reading) => self.sensors.store(SensorSnapshot {
                device_id: reading.device_index,
                sensor_index: reading.sensor_index,
                sensor_type: reading.sensor_type.clone(),
                data: reading.data.clone(),
            }),
            ServerMessage::Error(err) => {
                warn!(id = err.id, code = err.error_code, message = %err.error_message, "server error");
            }
            ServerMessage::Ok(_) | ServerMessage::ScanningFinished(_) => {}
        }
        self.audit.record_received(message.kind(), message.id());
        self.bus.notify(ClientEvent::Message(message));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::audit::{Direction, TracingAudit};
    use tactus_protocol::MessageKind;
    use tactus_types::ConnectionPhase;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(Direction, MessageKind, u32)>>);

    impl AuditSink for Recorder {
        fn record(&self, direction: Direction, kind: MessageKind, id: u32) {
            self.0.lock().unwrap().push((direction, kind, id));
        }
    }

    fn dispatcher(audit: Arc<dyn AuditSink>) -> Dispatcher {
        Dispatcher {
            registry: Arc::new(DeviceRegistry::new()),
            sensors: Arc::new(SensorSlot::default()),
            server_info: ServerInfoSlot::default(),
            connection: ConnectionMachine::new(),
            bus: Arc::new(NotificationBus::new(16)),
            audit,
        }
    }

    const ADDED_7: &str = r#"[{"DeviceAdded":{"Id":0,"DeviceName":"Edge","DeviceIndex":7,
        "DeviceMessages":[{"CmdType":"ScalarCmd","DeviceCmdAttributes":[
            {"FeatureDescriptor":"","StepCount":20,"ActuatorType":"Vibrate"}]}]}}]"#;

    #[test]
    fn add_then_remove_leaves_registry_empty() {
        let d = dispatcher(Arc::new(TracingAudit));
        d.handle(Inbound::Frame(ADDED_7.to_string()));
        assert!(d.registry.get(7).is_some());
        d.handle(Inbound::Frame(r#"[{"DeviceRemoved":{"Id":0,"DeviceIndex":7}}]"#.to_string()));
        assert!(d.registry.get(7).is_none());
    }

    #[test]
    fn device_list_replaces_earlier_announcements() {
        let d = dispatcher(Arc::new(TracingAudit));
        d.handle(Inbound::Frame(ADDED_7.to_string()));
        d.handle(Inbound::Frame(
            r#"[{"DeviceList":{"Id":3,"Devices":[
                {"DeviceName":"Listed","DeviceIndex":1,"DeviceMessages":[
                    {"CmdType":"ScalarCmd","DeviceCmdAttributes":[
                        {"FeatureDescriptor":"","StepCount":20,"ActuatorType":"Vibrate"}]},
                    {"CmdType":"StopDeviceCmd"}]},
                {"DeviceName":"Mapped","DeviceIndex":2,"DeviceMessages":{
                    "RotateCmd":[{"FeatureDescriptor":"","StepCount":10,"ActuatorType":"Rotate"}],
                    "StopDeviceCmd":{}}}]}}]"#
                .to_string(),
        ));
        let ids: Vec<_> = d.registry.snapshot().iter().map(|dev| dev.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(d.registry.get(2).unwrap().command_types, vec!["RotateCmd", "StopDeviceCmd"]);

        d.handle(Inbound::Frame(r#"[{"DeviceRemoved":{"Id":0,"DeviceIndex":1}}]"#.to_string()));
        let remaining = d.registry.snapshot();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, 2);
        assert_eq!(remaining[0].name, "Mapped");
    }

    #[test]
    fn server_info_identifies_the_connection() {
        let d = dispatcher(Arc::new(TracingAudit));
        d.connection.begin_connect().unwrap();
        d.connection.socket_opened();
        d.connection.identifying();
        d.handle(Inbound::Frame(
            r#"[{"ServerInfo":{"Id":1,"ServerName":"S","MessageVersion":3,"MaxPingTime":0}}]"#.to_string(),
        ));
        assert_eq!(d.connection.phase(), ConnectionPhase::Identified);
        assert_eq!(d.server_info.read().unwrap().as_ref().unwrap().server_name, "S");
    }

    #[test]
    fn sensor_reading_fills_the_slot() {
        let d = dispatcher(Arc::new(TracingAudit));
        d.handle(Inbound::Frame(
            r#"[{"SensorReading":{"Id":0,"DeviceIndex":2,"SensorIndex":1,"SensorType":"Battery","Data":[87]}}]"#
                .to_string(),
        ));
        let snap = d.sensors.snapshot().unwrap();
        assert_eq!((snap.device_id, snap.sensor_index, snap.data), (2, 1, vec![87]));
        assert_eq!(snap.sensor_type, "Battery");
    }

    #[test]
    fn bad_entry_is_reported_and_the_rest_applied() {
        let d = dispatcher(Arc::new(TracingAudit));
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            d.bus.add_listener(move |e: &ClientEvent| seen.lock().unwrap().push(e.clone()));
        }
        d.handle(Inbound::Frame(
            r#"[{"Bogus":{}},{"DeviceRemoved":{"Id":0,"DeviceIndex":1}}]"#.to_string(),
        ));
        d.handle(Inbound::Frame("not json".to_string()));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(matches!(seen[0], ClientEvent::ProtocolError(_)));
        assert!(matches!(seen[1], ClientEvent::Message(ServerMessage::DeviceRemoved(_))));
        assert!(matches!(seen[2], ClientEvent::ProtocolError(_)));
    }

    #[test]
    fn received_messages_are_audited() {
        let recorder = Arc::new(Recorder::default());
        let d = dispatcher(recorder.clone());
        d.handle(Inbound::Frame(r#"[{"Ok":{"Id":5}},{"ScanningFinished":{"Id":0}}]"#.to_string()));
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![
                (Direction::Received, MessageKind::Ok, 5),
                (Direction::Received, MessageKind::ScanningFinished, 0),
            ]
        );
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let d = dispatcher(Arc::new(TracingAudit));
        let (_tx, rx) = mpsc::unbounded_channel();
        let (stop, stop_rx) = watch::channel(false);
        let handle = d.spawn(rx, stop_rx);
        stop.send_replace(true);
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
