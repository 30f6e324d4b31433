//! Frame encode/decode.
//!
//! A frame is one transport-level text message holding a JSON array of one
//! or more protocol messages. Server frames decode message-by-message so
//! that one unrecognised entry does not discard its neighbours.

use serde_json::Value;
use tactus_types::TactusError;
use thiserror::Error;

use crate::kind::MessageKind;
use crate::messages::{ClientMessage, ServerMessage};

/// Errors produced while decoding an inbound frame.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame is not a JSON array of messages")]
    NotAnArray,

    #[error("message is not a single-key object")]
    NotAnObject,

    #[error("unknown message kind '{0}'")]
    UnknownKind(String),

    #[error("unexpected message kind '{0}' in this direction")]
    UnexpectedKind(MessageKind),

    #[error("malformed {kind} message: {reason}")]
    Malformed { kind: MessageKind, reason: String },
}

impl From<DecodeError> for TactusError {
    fn from(e: DecodeError) -> Self {
        TactusError::Protocol(e.to_string())
    }
}

/// Encode one message as a single-element frame.
pub fn encode(message: &ClientMessage) -> Result<String, serde_json::Error> {
    encode_batch(std::slice::from_ref(message))
}

/// Encode several messages into one frame, preserving order.
pub fn encode_batch(messages: &[ClientMessage]) -> Result<String, serde_json::Error> {
    serde_json::to_string(messages)
}

/// Decode a server frame into its messages, in array order.
///
/// The outer `Err` means the frame as a whole was unusable; each inner
/// `Result` is one message's own outcome.
pub fn decode_server_frame(
    text: &str,
) -> Result<Vec<Result<ServerMessage, DecodeError>>, DecodeError> {
    Ok(split_frame(text)?.into_iter().map(decode_server_message).collect())
}

/// Decode a client frame. Used by test servers and the round-trip checks;
/// any bad entry fails the whole frame.
pub fn decode_client_frame(text: &str) -> Result<Vec<ClientMessage>, DecodeError> {
    split_frame(text)?
        .into_iter()
        .map(|value| {
            let kind = tag_of(&value)?;
            if kind.is_server_kind() {
                return Err(DecodeError::UnexpectedKind(kind));
            }
            serde_json::from_value(value).map_err(|e| DecodeError::Malformed {
                kind,
                reason: e.to_string(),
            })
        })
        .collect()
}

fn split_frame(text: &str) -> Result<Vec<Value>, DecodeError> {
    match serde_json::from_str::<Value>(text)? {
        Value::Array(items) => Ok(items),
        _ => Err(DecodeError::NotAnArray),
    }
}

fn tag_of(value: &Value) -> Result<MessageKind, DecodeError> {
    let obj = value.as_object().ok_or(DecodeError::NotAnObject)?;
    if obj.len() != 1 {
        return Err(DecodeError::NotAnObject);
    }
    let (tag, _) = obj.iter().next().ok_or(DecodeError::NotAnObject)?;
    tag.parse::<MessageKind>()
        .map_err(|_| DecodeError::UnknownKind(tag.clone()))
}

fn decode_server_message(value: Value) -> Result<ServerMessage, DecodeError> {
    let kind = tag_of(&value)?;
    if !kind.is_server_kind() {
        return Err(DecodeError::UnexpectedKind(kind));
    }
    serde_json::from_value(value).map_err(|e| DecodeError::Malformed {
        kind,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::*;

    fn every_client_message() -> Vec<ClientMessage> {
        let sensor = SensorCmd {
            id: 11,
            device_index: 2,
            sensor_index: 1,
            sensor_type: "Battery".to_string(),
        };
        vec![
            ClientMessage::RequestServerInfo(RequestServerInfo {
                id: 1,
                client_name: "tactus".to_string(),
                message_version: 3,
            }),
            ClientMessage::Ping(Bare { id: 2 }),
            ClientMessage::RequestDeviceList(Bare { id: 3 }),
            ClientMessage::StartScanning(Bare { id: 4 }),
            ClientMessage::StopScanning(Bare { id: 5 }),
            ClientMessage::StopDeviceCmd(StopDeviceCmd {
                id: 6,
                device_index: 2,
            }),
            ClientMessage::StopAllDevices(Bare { id: 7 }),
            ClientMessage::ScalarCmd(ScalarCmd {
                id: 8,
                device_index: 2,
                scalars: vec![Scalar {
                    index: 0,
                    scalar: 0.25,
                    actuator_type: "Vibrate".to_string(),
                }],
            }),
            ClientMessage::LinearCmd(LinearCmd {
                id: 9,
                device_index: 2,
                vectors: vec![LinearVector {
                    index: 0,
                    duration: 500,
                    position: 0.9,
                }],
            }),
            ClientMessage::RotateCmd(RotateCmd {
                id: 10,
                device_index: 2,
                rotations: vec![Rotation {
                    index: 0,
                    speed: 0.5,
                    clockwise: false,
                }],
            }),
            ClientMessage::SensorReadCmd(sensor.clone()),
            ClientMessage::SensorSubscribeCmd(SensorCmd { id: 12, ..sensor.clone() }),
            ClientMessage::SensorUnsubscribeCmd(SensorCmd { id: 13, ..sensor }),
        ]
    }

    #[test]
    fn client_frames_survive_the_wire() {
        let all = every_client_message();
        let text = encode_batch(&all).unwrap();
        assert_eq!(decode_client_frame(&text).unwrap(), all);
    }

    #[test]
    fn encode_wraps_single_message_in_array() {
        let text = encode(&ClientMessage::StartScanning(Bare { id: 4 })).unwrap();
        assert_eq!(text, r#"[{"StartScanning":{"Id":4}}]"#);
    }

    #[test]
    fn scalar_cmd_wire_shape() {
        let msg = ClientMessage::ScalarCmd(ScalarCmd {
            id: 8,
            device_index: 1,
            scalars: vec![Scalar {
                index: 0,
                scalar: 0.5,
                actuator_type: "Vibrate".to_string(),
            }],
        });
        let value: serde_json::Value = serde_json::from_str(&encode(&msg).unwrap()).unwrap();
        let scalar = &value[0]["ScalarCmd"]["Scalars"][0];
        assert_eq!(value[0]["ScalarCmd"]["DeviceIndex"], 1);
        assert_eq!(scalar["Index"], 0);
        assert_eq!(scalar["ScalarVal"], 0.5);
        assert_eq!(scalar["ActuatorType"], "Vibrate");
    }

    #[test]
    fn decodes_server_info_frame() {
        let frame = r#"[{"ServerInfo":{"Id":1,"ServerName":"X","MessageVersion":3,"MaxPingTime":0}}]"#;
        let msgs = decode_server_frame(frame).unwrap();
        assert_eq!(msgs.len(), 1);
        match &msgs[0] {
            Ok(ServerMessage::ServerInfo(info)) => {
                assert_eq!(info.server_name, "X");
                assert_eq!(info.message_version, 3);
            }
            other => panic!("expected ServerInfo, got {other:?}"),
        }
    }

    #[test]
    fn batched_frame_keeps_order_and_isolates_bad_entries() {
        let frame = r#"[
            {"DeviceRemoved":{"Id":0,"DeviceIndex":3}},
            {"Bogus":{"Id":1}},
            {"ScanningFinished":{"Id":0}},
            {"SensorReading":{"Id":0,"DeviceIndex":1}}
        ]"#;
        let msgs = decode_server_frame(frame).unwrap();
        assert_eq!(msgs.len(), 4);
        assert!(matches!(msgs[0], Ok(ServerMessage::DeviceRemoved(DeviceRemoved { device_index: 3, .. }))));
        assert!(matches!(&msgs[1], Err(DecodeError::UnknownKind(tag)) if tag == "Bogus"));
        assert!(matches!(msgs[2], Ok(ServerMessage::ScanningFinished(_))));
        assert!(matches!(
            msgs[3],
            Err(DecodeError::Malformed { kind: MessageKind::SensorReading, .. })
        ));
    }

    #[test]
    fn client_kind_from_server_is_unexpected() {
        let msgs = decode_server_frame(r#"[{"StartScanning":{"Id":1}}]"#).unwrap();
        assert!(matches!(
            msgs[0],
            Err(DecodeError::UnexpectedKind(MessageKind::StartScanning))
        ));
    }

    #[test]
    fn non_array_frame_is_rejected() {
        assert!(matches!(
            decode_server_frame(r#"{"Ok":{"Id":1}}"#),
            Err(DecodeError::NotAnArray)
        ));
        assert!(matches!(decode_server_frame("not json"), Err(DecodeError::Json(_))));
    }

    #[test]
    fn error_message_fields() {
        let frame = r#"[{"Error":{"Id":5,"ErrorMessage":"Device not found","ErrorCode":3}}]"#;
        let msgs = decode_server_frame(frame).unwrap();
        match &msgs[0] {
            Ok(ServerMessage::Error(e)) => {
                assert_eq!(e.id, 5);
                assert_eq!(e.error_code, 3);
                assert_eq!(e.error_message, "Device not found");
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn decode_errors_become_protocol_errors() {
        let err = decode_server_frame("{}").unwrap_err();
        match TactusError::from(err) {
            TactusError::Protocol(reason) => assert!(!reason.is_empty()),
            other => panic!("expected Protocol, got {other:?}"),
        }
    }
}
