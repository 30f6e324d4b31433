use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Server-assigned device identifier (`DeviceIndex` on the wire).
pub type DeviceIndex = u32;

/// Well-known command type strings advertised in a device's message list.
pub mod command_type {
    pub const SCALAR: &str = "ScalarCmd";
    pub const LINEAR: &str = "LinearCmd";
    pub const ROTATE: &str = "RotateCmd";
    pub const SENSOR_READ: &str = "SensorReadCmd";
    pub const SENSOR_SUBSCRIBE: &str = "SensorSubscribeCmd";
    pub const STOP_DEVICE: &str = "StopDeviceCmd";
}

/// One addressable actuator or sensor channel on a device.
///
/// The position of a descriptor inside its owning list is the wire-protocol
/// actuator / sensor index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDescriptor {
    pub feature_descriptor: String,
    pub step_count: u32,
    pub actuator_type: String,
    pub sensor_type: String,
    /// Flattened `[min, max, min, max, ...]` pairs.
    pub sensor_range: Vec<i32>,
}

/// A remote device as known to the client.
///
/// Values handed out by the registry are copies; mutating one never touches
/// the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceIndex,
    pub name: String,
    pub display_name: String,
    /// Every command type the device advertises, in server order.
    pub command_types: Vec<String>,
    /// Descriptor lists keyed by command type. Command types without
    /// attributes (e.g. `StopDeviceCmd`) have no entry.
    pub command_attributes: BTreeMap<String, Vec<CommandDescriptor>>,
}

impl Device {
    /// Whether the device advertises `command` at all.
    pub fn supports(&self, command: &str) -> bool {
        self.command_types.iter().any(|c| c == command)
    }

    /// Descriptor list for `command`, if the device advertises one.
    pub fn descriptors(&self, command: &str) -> Option<&[CommandDescriptor]> {
        self.command_attributes.get(command).map(Vec::as_slice)
    }

    /// Name to show a human: the display name when set, else the device name.
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }
}

/// The most recent sensor reading received from the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub device_id: DeviceIndex,
    pub sensor_index: u32,
    pub sensor_type: String,
    pub data: Vec<i32>,
}

/// Phase of the two-step connection handshake.
///
/// Phases are ordered: a phase "has reached" another when it compares
/// greater or equal. Only [`ConnectionPhase::Idle`] is reachable from every
/// other phase (socket closed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConnectionPhase {
    Idle,
    Connecting,
    SocketOpen,
    Identifying,
    Identified,
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionPhase::Idle => "idle",
            ConnectionPhase::Connecting => "connecting",
            ConnectionPhase::SocketOpen => "socket-open",
            ConnectionPhase::Identifying => "identifying",
            ConnectionPhase::Identified => "identified",
        };
        f.write_str(s)
    }
}

/// Flag view of a [`ConnectionPhase`].
///
/// `identified` implies `transport_open`, and `handshaking` and
/// `identified` are never both set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub transport_open: bool,
    pub handshaking: bool,
    pub identified: bool,
}

impl From<ConnectionPhase> for ConnectionState {
    fn from(phase: ConnectionPhase) -> Self {
        use ConnectionPhase::*;
        Self {
            transport_open: matches!(phase, SocketOpen | Identifying | Identified),
            handshaking: matches!(phase, Connecting | SocketOpen | Identifying),
            identified: phase == Identified,
        }
    }
}

/// Error type shared by every tactus crate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TactusError {
    #[error("not connected: call connect() before sending")]
    NotConnected,

    #[error("a connection is already in progress or established")]
    AlreadyConnected,

    #[error("timed out waiting for the connection to reach {phase}")]
    Timeout { phase: ConnectionPhase },

    #[error("protocol decode error: {0}")]
    Protocol(String),

    #[error("unknown device {0}")]
    UnknownDevice(DeviceIndex),

    #[error("device {device} does not support {command}")]
    UnsupportedCommand { device: DeviceIndex, command: String },

    #[error("device {device}: index {index} out of range ({count} descriptors)")]
    ActuatorIndexOutOfRange {
        device: DeviceIndex,
        index: u32,
        count: usize,
    },

    #[error("device {device}: no actuator values supplied")]
    EmptyCommand { device: DeviceIndex },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vibrator() -> Device {
        let mut attrs = BTreeMap::new();
        attrs.insert(
            command_type::SCALAR.to_string(),
            vec![CommandDescriptor {
                feature_descriptor: "Clitoral Stimulator".to_string(),
                step_count: 20,
                actuator_type: "Vibrate".to_string(),
                ..Default::default()
            }],
        );
        Device {
            id: 3,
            name: "Lovense Edge".to_string(),
            display_name: String::new(),
            command_types: vec![
                command_type::SCALAR.to_string(),
                command_type::STOP_DEVICE.to_string(),
            ],
            command_attributes: attrs,
        }
    }

    #[test]
    fn device_supports_and_descriptors() {
        let dev = vibrator();
        assert!(dev.supports("ScalarCmd"));
        assert!(dev.supports("StopDeviceCmd"));
        assert!(!dev.supports("LinearCmd"));
        assert_eq!(dev.descriptors("ScalarCmd").map(<[_]>::len), Some(1));
        assert!(dev.descriptors("StopDeviceCmd").is_none());
    }

    #[test]
    fn device_label_prefers_display_name() {
        let mut dev = vibrator();
        assert_eq!(dev.label(), "Lovense Edge");
        dev.display_name = "Bedroom".to_string();
        assert_eq!(dev.label(), "Bedroom");
    }

    #[test]
    fn device_serialization_roundtrip() {
        let dev = vibrator();
        let json = serde_json::to_string(&dev).unwrap();
        let back: Device = serde_json::from_str(&json).unwrap();
        assert_eq!(dev, back);
    }

    #[test]
    fn phases_are_ordered() {
        assert!(ConnectionPhase::Idle < ConnectionPhase::Connecting);
        assert!(ConnectionPhase::SocketOpen < ConnectionPhase::Identifying);
        assert!(ConnectionPhase::Identifying < ConnectionPhase::Identified);
    }

    #[test]
    fn connection_state_flags_respect_invariants() {
        use ConnectionPhase::*;
        for phase in [Idle, Connecting, SocketOpen, Identifying, Identified] {
            let state = ConnectionState::from(phase);
            if state.identified {
                assert!(state.transport_open, "{phase}: identified without transport");
            }
            assert!(
                !(state.handshaking && state.identified),
                "{phase}: handshaking and identified together"
            );
        }
        assert_eq!(ConnectionState::from(Idle), ConnectionState::default());
    }

    #[test]
    fn tactus_error_display() {
        let err = TactusError::UnsupportedCommand {
            device: 4,
            command: "RotateCmd".to_string(),
        };
        assert!(err.to_string().contains("RotateCmd"));

        let err = TactusError::Timeout {
            phase: ConnectionPhase::Identified,
        };
        assert!(err.to_string().contains("identified"));
    }
}
