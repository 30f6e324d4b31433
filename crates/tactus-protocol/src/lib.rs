//! `tactus-protocol` – the wire message codec.
//!
//! Maps the typed request/response vocabulary of the device-control
//! protocol to and from its JSON wire form. Every frame on the wire is a
//! JSON array of single-key objects, the key naming the message kind:
//!
//! ```text
//! [{"RequestServerInfo":{"Id":1,"ClientName":"tactus","MessageVersion":3}}]
//! ```
//!
//! # Modules
//!
//! - [`kind`] – [`MessageKind`], the closed set of message-type tags.
//! - [`messages`] – payload structs plus the [`ClientMessage`] and
//!   [`ServerMessage`] envelopes.
//! - [`device`] – the wire shape of a device description and its
//!   conversion into [`tactus_types::Device`].
//! - [`codec`] – frame encode/decode and [`DecodeError`].

pub mod codec;
pub mod device;
pub mod kind;
pub mod messages;

pub use codec::{DecodeError, decode_client_frame, decode_server_frame, encode, encode_batch};
pub use device::{CmdAttribute, DeviceInfo, DeviceMessage};
pub use kind::MessageKind;
pub use messages::{
    Bare, ClientMessage, DeviceAdded, DeviceList, DeviceRemoved, ErrorMessage, LinearCmd,
    LinearVector, RequestServerInfo, RotateCmd, Rotation, Scalar, ScalarCmd, SensorCmd,
    SensorReading, ServerInfo, ServerMessage, StopDeviceCmd,
};

/// Protocol message version this client speaks.
pub const MESSAGE_VERSION: u32 = 3;
