//! Connection settings for a [`Client`](crate::Client).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tactus_protocol::MESSAGE_VERSION;

fn default_url() -> String {
    "ws://127.0.0.1:12345".to_string()
}

fn default_client_name() -> String {
    "tactus".to_string()
}

fn default_message_version() -> u32 {
    MESSAGE_VERSION
}

fn default_event_capacity() -> usize {
    256
}

fn default_ping() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// WebSocket endpoint of the device server.
    #[serde(default = "default_url")]
    pub url: String,
    /// Name announced in `RequestServerInfo`.
    #[serde(default = "default_client_name")]
    pub client_name: String,
    #[serde(default = "default_message_version")]
    pub message_version: u32,
    /// Upper bound on how long the handshake task waits for `ServerInfo`.
    /// `None` waits until the socket closes.
    #[serde(default)]
    pub handshake_timeout_ms: Option<u64>,
    /// Upper bound on how long a single send waits for the connection gate.
    #[serde(default)]
    pub send_timeout_ms: Option<u64>,
    /// Buffer size of the broadcast notification channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Keep the session alive with `Ping` when the server asks for it.
    #[serde(default = "default_ping")]
    pub ping: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            client_name: default_client_name(),
            message_version: default_message_version(),
            handshake_timeout_ms: None,
            send_timeout_ms: None,
            event_capacity: default_event_capacity(),
            ping: default_ping(),
        }
    }
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn handshake_timeout(&self) -> Option<Duration> {
        self.handshake_timeout_ms.map(Duration::from_millis)
    }

    pub fn send_timeout(&self) -> Option<Duration> {
        self.send_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.client_name, "tactus");
        assert_eq!(cfg.message_version, 3);
        assert_eq!(cfg.event_capacity, 256);
        assert!(cfg.ping);
        assert!(cfg.handshake_timeout().is_none());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: ClientConfig =
            serde_json::from_str(r#"{"url":"ws://10.0.0.2:12345","send_timeout_ms":250}"#).unwrap();
        assert_eq!(cfg.url, "ws://10.0.0.2:12345");
        assert_eq!(cfg.send_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(cfg.client_name, "tactus");
    }
}
