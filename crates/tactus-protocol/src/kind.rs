//! [`MessageKind`] – every message-type tag the protocol defines.

use std::fmt;
use std::str::FromStr;

/// Closed enumeration of protocol message kinds.
///
/// The wire tag of each kind is its variant name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Ok,
    Error,
    Ping,
    RequestServerInfo,
    ServerInfo,
    StartScanning,
    StopScanning,
    ScanningFinished,
    RequestDeviceList,
    DeviceList,
    DeviceAdded,
    DeviceRemoved,
    StopDeviceCmd,
    StopAllDevices,
    ScalarCmd,
    LinearCmd,
    RotateCmd,
    SensorReadCmd,
    SensorReading,
    SensorSubscribeCmd,
    SensorUnsubscribeCmd,
}

impl MessageKind {
    pub const ALL: [MessageKind; 21] = [
        MessageKind::Ok,
        MessageKind::Error,
        MessageKind::Ping,
        MessageKind::RequestServerInfo,
        MessageKind::ServerInfo,
        MessageKind::StartScanning,
        MessageKind::StopScanning,
        MessageKind::ScanningFinished,
        MessageKind::RequestDeviceList,
        MessageKind::DeviceList,
        MessageKind::DeviceAdded,
        MessageKind::DeviceRemoved,
        MessageKind::StopDeviceCmd,
        MessageKind::StopAllDevices,
        MessageKind::ScalarCmd,
        MessageKind::LinearCmd,
        MessageKind::RotateCmd,
        MessageKind::SensorReadCmd,
        MessageKind::SensorReading,
        MessageKind::SensorSubscribeCmd,
        MessageKind::SensorUnsubscribeCmd,
    ];

    /// The wire tag for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Ok => "Ok",
            MessageKind::Error => "Error",
            MessageKind::Ping => "Ping",
            MessageKind::RequestServerInfo => "RequestServerInfo",
            MessageKind::ServerInfo => "ServerInfo",
            MessageKind::StartScanning => "StartScanning",
            MessageKind::StopScanning => "StopScanning",
            MessageKind::ScanningFinished => "ScanningFinished",
            MessageKind::RequestDeviceList => "RequestDeviceList",
            MessageKind::DeviceList => "DeviceList",
            MessageKind::DeviceAdded => "DeviceAdded",
            MessageKind::DeviceRemoved => "DeviceRemoved",
            MessageKind::StopDeviceCmd => "StopDeviceCmd",
            MessageKind::StopAllDevices => "StopAllDevices",
            MessageKind::ScalarCmd => "ScalarCmd",
            MessageKind::LinearCmd => "LinearCmd",
            MessageKind::RotateCmd => "RotateCmd",
            MessageKind::SensorReadCmd => "SensorReadCmd",
            MessageKind::SensorReading => "SensorReading",
            MessageKind::SensorSubscribeCmd => "SensorSubscribeCmd",
            MessageKind::SensorUnsubscribeCmd => "SensorUnsubscribeCmd",
        }
    }

    /// Whether servers send this kind to clients.
    pub fn is_server_kind(self) -> bool {
        matches!(
            self,
            MessageKind::Ok
                | MessageKind::Error
                | MessageKind::ServerInfo
                | MessageKind::ScanningFinished
                | MessageKind::DeviceList
                | MessageKind::DeviceAdded
                | MessageKind::DeviceRemoved
                | MessageKind::SensorReading
        )
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned by [`MessageKind::from_str`] for a tag outside the protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownKind(pub String);

impl FromStr for MessageKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}
