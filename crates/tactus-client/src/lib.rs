//! Async client for the device-control protocol.
//!
//! A [`Client`] owns one connection to a device server. It drives the
//! handshake, keeps a registry of the devices the server announces, and
//! turns high-level commands ([`Actuation`] values addressed to a [`Device`])
//! into protocol messages.
//!
//! Inbound traffic is handled by a single dispatcher task per connection.
//! Applications observe it through [`MessageListener`]s or a broadcast
//! [`ClientEvent`] receiver; see [`bus`].

pub mod audit;
pub mod bus;
pub mod client;
pub mod config;
pub mod connection;
mod dispatcher;
pub mod registry;
pub mod router;
mod sender;
pub mod transport;
pub mod ws_transport;

pub use audit::{AuditConfig, AuditSink, Direction, FileAudit, TracingAudit};
pub use bus::{next_event, ClientEvent, ListenerId, MessageListener, NotificationBus};
pub use client::Client;
pub use config::ClientConfig;
pub use connection::ConnectionMachine;
pub use registry::{DeviceRegistry, SensorSlot};
pub use router::{
    Actuation, CommandOutcome, LinearCommand, LinearTarget, RotateCommand, RotateTarget,
    ScalarCommand,
};
pub use transport::{Transport, TransportEvent, TransportEvents};
pub use ws_transport::WsTransport;

pub use tactus_types::{
    CommandDescriptor, ConnectionPhase, ConnectionState, Device, DeviceIndex, SensorSnapshot,
    TactusError,
};
