//! Wire shape of a device description.
//!
//! The canonical encoding lists a device's messages as
//! `[{"CmdType": .., "StopDeviceCmd": .., "DeviceCmdAttributes": [..]}]`.
//! Servers speaking message version 3 send a map keyed by command type
//! instead (`{"ScalarCmd": [..], "StopDeviceCmd": {}}`); both decode to the
//! same [`DeviceInfo`]. Sensor ranges may likewise arrive flat or as
//! `[[min, max], ..]` pairs and are stored flat.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{Deserializer, IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use tactus_types::{CommandDescriptor, Device, DeviceIndex};

/// One actuator or sensor channel as described on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CmdAttribute {
    #[serde(default)]
    pub feature_descriptor: String,
    #[serde(default)]
    pub step_count: u32,
    #[serde(default)]
    pub actuator_type: String,
    #[serde(default)]
    pub sensor_type: String,
    #[serde(default, deserialize_with = "flat_or_paired_range")]
    pub sensor_range: Vec<i32>,
}

/// A command type the device accepts, with its per-channel attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceMessage {
    pub cmd_type: String,
    #[serde(default)]
    pub stop_device_cmd: String,
    #[serde(default)]
    pub device_cmd_attributes: Vec<CmdAttribute>,
}

/// A device as carried in `DeviceList` and `DeviceAdded`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceInfo {
    pub device_name: String,
    pub device_index: DeviceIndex,
    #[serde(default)]
    pub device_message_timing_gap: u32,
    #[serde(default)]
    pub device_display_name: String,
    #[serde(default, deserialize_with = "list_or_map_messages")]
    pub device_messages: Vec<DeviceMessage>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RangeRepr {
    Flat(Vec<i32>),
    Paired(Vec<Vec<i32>>),
}

fn flat_or_paired_range<'de, D>(deserializer: D) -> Result<Vec<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RangeRepr::deserialize(deserializer)? {
        RangeRepr::Flat(v) => v,
        RangeRepr::Paired(pairs) => pairs.into_iter().flatten().collect(),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AttributesRepr {
    List(Vec<CmdAttribute>),
    Other(IgnoredAny),
}

/// Map-form `DeviceMessages`, kept in the order the server wrote the keys.
struct MessageMap(Vec<DeviceMessage>);

impl<'de> Deserialize<'de> for MessageMap {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct MessageMapVisitor;

        impl<'de> Visitor<'de> for MessageMapVisitor {
            type Value = MessageMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of command types to attribute lists")
            }

            fn visit_map<A>(self, mut access: A) -> Result<MessageMap, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut messages = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((cmd_type, attrs)) = access.next_entry::<String, AttributesRepr>()? {
                    messages.push(DeviceMessage {
                        cmd_type,
                        stop_device_cmd: String::new(),
                        device_cmd_attributes: match attrs {
                            AttributesRepr::List(list) => list,
                            AttributesRepr::Other(_) => Vec::new(),
                        },
                    });
                }
                Ok(MessageMap(messages))
            }
        }

        deserializer.deserialize_map(MessageMapVisitor)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MessagesRepr {
    List(Vec<DeviceMessage>),
    Map(MessageMap),
}

fn list_or_map_messages<'de, D>(deserializer: D) -> Result<Vec<DeviceMessage>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match MessagesRepr::deserialize(deserializer)? {
        MessagesRepr::List(list) => list,
        MessagesRepr::Map(MessageMap(list)) => list,
    })
}

impl From<&CmdAttribute> for CommandDescriptor {
    fn from(attr: &CmdAttribute) -> Self {
        Self {
            feature_descriptor: attr.feature_descriptor.clone(),
            step_count: attr.step_count,
            actuator_type: attr.actuator_type.clone(),
            sensor_type: attr.sensor_type.clone(),
            sensor_range: attr.sensor_range.clone(),
        }
    }
}

impl From<&DeviceInfo> for Device {
    /// Flatten the wire description into the registry's view: every command
    /// type is listed, and those with attributes get a descriptor list.
    fn from(info: &DeviceInfo) -> Self {
        let mut command_types = Vec::with_capacity(info.device_messages.len());
        let mut command_attributes = BTreeMap::new();
        for msg in &info.device_messages {
            command_types.push(msg.cmd_type.clone());
            if !msg.device_cmd_attributes.is_empty() {
                command_attributes.insert(
                    msg.cmd_type.clone(),
                    msg.device_cmd_attributes.iter().map(CommandDescriptor::from).collect(),
                );
            }
        }
        Device {
            id: info.device_index,
            name: info.device_name.clone(),
            display_name: info.device_display_name.clone(),
            command_types,
            command_attributes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_list_form() {
        let json = r#"{
            "DeviceName": "Kiiroo Onyx",
            "DeviceIndex": 2,
            "DeviceMessageTimingGap": 100,
            "DeviceDisplayName": "",
            "DeviceMessages": [
                {"CmdType": "LinearCmd", "StopDeviceCmd": "",
                 "DeviceCmdAttributes": [{"FeatureDescriptor": "Stroker", "StepCount": 100,
                                          "ActuatorType": "Position"}]},
                {"CmdType": "StopDeviceCmd"}
            ]
        }"#;
        let info: DeviceInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.device_index, 2);
        assert_eq!(info.device_message_timing_gap, 100);
        assert_eq!(info.device_messages.len(), 2);
        assert_eq!(info.device_messages[0].device_cmd_attributes[0].step_count, 100);
        assert!(info.device_messages[1].device_cmd_attributes.is_empty());
    }

    #[test]
    fn decodes_map_form_and_paired_sensor_range() {
        let json = r#"{
            "DeviceName": "Battery Toy",
            "DeviceIndex": 5,
            "DeviceMessages": {
                "ScalarCmd": [{"FeatureDescriptor": "", "StepCount": 20, "ActuatorType": "Vibrate"}],
                "SensorReadCmd": [{"FeatureDescriptor": "Battery", "SensorType": "Battery",
                                   "SensorRange": [[0, 100]]}],
                "StopDeviceCmd": {}
            }
        }"#;
        let info: DeviceInfo = serde_json::from_str(json).unwrap();
        let device = Device::from(&info);
        assert!(device.supports("StopDeviceCmd"));
        assert_eq!(device.descriptors("ScalarCmd").unwrap()[0].actuator_type, "Vibrate");
        assert_eq!(device.descriptors("SensorReadCmd").unwrap()[0].sensor_range, vec![0, 100]);
        assert!(device.descriptors("StopDeviceCmd").is_none());
    }

    #[test]
    fn map_form_keeps_server_order() {
        let json = r#"{
            "DeviceName": "Stroker",
            "DeviceIndex": 1,
            "DeviceMessages": {
                "StopDeviceCmd": {},
                "ScalarCmd": [{"StepCount": 10, "ActuatorType": "Vibrate"}],
                "LinearCmd": [{"StepCount": 100, "ActuatorType": "Position"}]
            }
        }"#;
        let info: DeviceInfo = serde_json::from_str(json).unwrap();
        let device = Device::from(&info);
        assert_eq!(device.command_types, vec!["StopDeviceCmd", "ScalarCmd", "LinearCmd"]);
        assert_eq!(device.descriptors("LinearCmd").unwrap()[0].step_count, 100);
    }

    #[test]
    fn conversion_keeps_command_order_and_skips_empty_attributes() {
        let info = DeviceInfo {
            device_name: "Dual Vibe".to_string(),
            device_index: 9,
            device_display_name: "Blue".to_string(),
            device_messages: vec![
                DeviceMessage {
                    cmd_type: "ScalarCmd".to_string(),
                    device_cmd_attributes: vec![CmdAttribute::default(), CmdAttribute::default()],
                    ..Default::default()
                },
                DeviceMessage {
                    cmd_type: "StopDeviceCmd".to_string(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let device = Device::from(&info);
        assert_eq!(device.id, 9);
        assert_eq!(device.label(), "Blue");
        assert_eq!(device.command_types, vec!["ScalarCmd", "StopDeviceCmd"]);
        assert_eq!(device.command_attributes.len(), 1);
        assert_eq!(device.descriptors("ScalarCmd").unwrap().len(), 2);
    }
}
