//! Payload structs and the two message envelopes.
//!
//! [`ClientMessage`] and [`ServerMessage`] are externally tagged, so serde
//! produces exactly the `{"Kind": {..fields..}}` object the protocol uses.

use serde::{Deserialize, Serialize};
use tactus_types::DeviceIndex;

use crate::device::DeviceInfo;
use crate::kind::MessageKind;

/// Payload of every message that carries nothing but its id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Bare {
    pub id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestServerInfo {
    pub id: u32,
    pub client_name: String,
    pub message_version: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StopDeviceCmd {
    pub id: u32,
    pub device_index: DeviceIndex,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Scalar {
    pub index: u32,
    #[serde(rename = "ScalarVal", alias = "Scalar")]
    pub scalar: f64,
    pub actuator_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScalarCmd {
    pub id: u32,
    pub device_index: DeviceIndex,
    pub scalars: Vec<Scalar>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LinearVector {
    pub index: u32,
    /// Milliseconds to reach `position`.
    pub duration: u32,
    pub position: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LinearCmd {
    pub id: u32,
    pub device_index: DeviceIndex,
    pub vectors: Vec<LinearVector>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Rotation {
    pub index: u32,
    pub speed: f64,
    pub clockwise: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RotateCmd {
    pub id: u32,
    pub device_index: DeviceIndex,
    pub rotations: Vec<Rotation>,
}

/// Shared payload of `SensorReadCmd`, `SensorSubscribeCmd` and
/// `SensorUnsubscribeCmd`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SensorCmd {
    pub id: u32,
    pub device_index: DeviceIndex,
    pub sensor_index: u32,
    pub sensor_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorMessage {
    pub id: u32,
    pub error_message: String,
    pub error_code: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerInfo {
    pub id: u32,
    pub server_name: String,
    pub message_version: u32,
    /// Milliseconds; `0` disables the protocol-level ping requirement.
    #[serde(default)]
    pub max_ping_time: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceList {
    pub id: u32,
    pub devices: Vec<DeviceInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceAdded {
    pub id: u32,
    #[serde(flatten)]
    pub device: DeviceInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceRemoved {
    pub id: u32,
    pub device_index: DeviceIndex,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SensorReading {
    pub id: u32,
    pub device_index: DeviceIndex,
    pub sensor_index: u32,
    pub sensor_type: String,
    pub data: Vec<i32>,
}

/// Every message a client sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    RequestServerInfo(RequestServerInfo),
    Ping(Bare),
    RequestDeviceList(Bare),
    StartScanning(Bare),
    StopScanning(Bare),
    StopDeviceCmd(StopDeviceCmd),
    StopAllDevices(Bare),
    ScalarCmd(ScalarCmd),
    LinearCmd(LinearCmd),
    RotateCmd(RotateCmd),
    SensorReadCmd(SensorCmd),
    SensorSubscribeCmd(SensorCmd),
    SensorUnsubscribeCmd(SensorCmd),
}

impl ClientMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            ClientMessage::RequestServerInfo(_) => MessageKind::RequestServerInfo,
            ClientMessage::Ping(_) => MessageKind::Ping,
            ClientMessage::RequestDeviceList(_) => MessageKind::RequestDeviceList,
            ClientMessage::StartScanning(_) => MessageKind::StartScanning,
            ClientMessage::StopScanning(_) => MessageKind::StopScanning,
            ClientMessage::StopDeviceCmd(_) => MessageKind::StopDeviceCmd,
            ClientMessage::StopAllDevices(_) => MessageKind::StopAllDevices,
            ClientMessage::ScalarCmd(_) => MessageKind::ScalarCmd,
            ClientMessage::LinearCmd(_) => MessageKind::LinearCmd,
            ClientMessage::RotateCmd(_) => MessageKind::RotateCmd,
            ClientMessage::SensorReadCmd(_) => MessageKind::SensorReadCmd,
            ClientMessage::SensorSubscribeCmd(_) => MessageKind::SensorSubscribeCmd,
            ClientMessage::SensorUnsubscribeCmd(_) => MessageKind::SensorUnsubscribeCmd,
        }
    }

    /// Correlation id carried by the message.
    pub fn id(&self) -> u32 {
        match self {
            ClientMessage::RequestServerInfo(m) => m.id,
            ClientMessage::Ping(m)
            | ClientMessage::RequestDeviceList(m)
            | ClientMessage::StartScanning(m)
            | ClientMessage::StopScanning(m)
            | ClientMessage::StopAllDevices(m) => m.id,
            ClientMessage::StopDeviceCmd(m) => m.id,
            ClientMessage::ScalarCmd(m) => m.id,
            ClientMessage::LinearCmd(m) => m.id,
            ClientMessage::RotateCmd(m) => m.id,
            ClientMessage::SensorReadCmd(m)
            | ClientMessage::SensorSubscribeCmd(m)
            | ClientMessage::SensorUnsubscribeCmd(m) => m.id,
        }
    }

    pub fn set_id(&mut self, id: u32) {
        match self {
            ClientMessage::RequestServerInfo(m) => m.id = id,
            ClientMessage::Ping(m)
            | ClientMessage::RequestDeviceList(m)
            | ClientMessage::StartScanning(m)
            | ClientMessage::StopScanning(m)
            | ClientMessage::StopAllDevices(m) => m.id = id,
            ClientMessage::StopDeviceCmd(m) => m.id = id,
            ClientMessage::ScalarCmd(m) => m.id = id,
            ClientMessage::LinearCmd(m) => m.id = id,
            ClientMessage::RotateCmd(m) => m.id = id,
            ClientMessage::SensorReadCmd(m)
            | ClientMessage::SensorSubscribeCmd(m)
            | ClientMessage::SensorUnsubscribeCmd(m) => m.id = id,
        }
    }

    /// Builder-style [`set_id`](Self::set_id).
    pub fn with_id(mut self, id: u32) -> Self {
        self.set_id(id);
        self
    }

    /// Whether this is the identification request that drives the handshake.
    pub fn is_handshake(&self) -> bool {
        matches!(self, ClientMessage::RequestServerInfo(_))
    }
}

/// Every message a server sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerMessage {
    Ok(Bare),
    Error(ErrorMessage),
    ServerInfo(ServerInfo),
    ScanningFinished(Bare),
    DeviceList(DeviceList),
    DeviceAdded(DeviceAdded),
    DeviceRemoved(DeviceRemoved),
    SensorReading(SensorReading),
}

impl ServerMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            ServerMessage::Ok(_) => MessageKind::Ok,
            ServerMessage::Error(_) => MessageKind::Error,
            ServerMessage::ServerInfo(_) => MessageKind::ServerInfo,
            ServerMessage::ScanningFinished(_) => MessageKind::ScanningFinished,
            ServerMessage::DeviceList(_) => MessageKind::DeviceList,
            ServerMessage::DeviceAdded(_) => MessageKind::DeviceAdded,
            ServerMessage::DeviceRemoved(_) => MessageKind::DeviceRemoved,
            ServerMessage::SensorReading(_) => MessageKind::SensorReading,
        }
    }

    pub fn id(&self) -> u32 {
        match self {
            ServerMessage::Ok(m) | ServerMessage::ScanningFinished(m) => m.id,
            ServerMessage::Error(m) => m.id,
            ServerMessage::ServerInfo(m) => m.id,
            ServerMessage::DeviceList(m) => m.id,
            ServerMessage::DeviceAdded(m) => m.id,
            ServerMessage::DeviceRemoved(m) => m.id,
            ServerMessage::SensorReading(m) => m.id,
        }
    }
}
