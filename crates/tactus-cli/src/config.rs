//! CLI settings, persisted in `~/.tactus/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use tactus_client::{AuditConfig, ClientConfig};

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// WebSocket endpoint of the device server.
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Name announced to the server during the handshake.
    #[serde(default = "default_client_name")]
    pub client_name: String,

    /// How long to wait for the server to identify itself on startup.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    /// Per-command wait for the connection; unset waits indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_timeout_ms: Option<u64>,

    /// Keep the session alive with pings when the server requires them.
    #[serde(default = "default_ping")]
    pub ping: bool,

    /// Write a message audit log to this directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_dir: Option<PathBuf>,

    #[serde(default = "default_audit_max_file_size")]
    pub audit_max_file_size: u64,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("server_url", &redact_credentials(&self.server_url))
            .field("client_name", &self.client_name)
            .field("handshake_timeout_ms", &self.handshake_timeout_ms)
            .field("send_timeout_ms", &self.send_timeout_ms)
            .field("ping", &self.ping)
            .field("audit_dir", &self.audit_dir)
            .field("audit_max_file_size", &self.audit_max_file_size)
            .finish()
    }
}

/// Hide `user:password@` in a URL.
pub fn redact_credentials(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let authority_end = rest.find('/').unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{scheme}://<redacted>@{}", &rest[at + 1..]),
        None => url.to_string(),
    }
}

fn default_server_url() -> String {
    "ws://127.0.0.1:12345".to_string()
}
fn default_client_name() -> String {
    "tactus".to_string()
}
fn default_handshake_timeout_ms() -> u64 {
    5_000
}
fn default_ping() -> bool {
    true
}
fn default_audit_max_file_size() -> u64 {
    102_400
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            client_name: default_client_name(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            send_timeout_ms: None,
            ping: default_ping(),
            audit_dir: None,
            audit_max_file_size: default_audit_max_file_size(),
        }
    }
}

impl Config {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            url: self.server_url.clone(),
            client_name: self.client_name.clone(),
            handshake_timeout_ms: Some(self.handshake_timeout_ms),
            send_timeout_ms: self.send_timeout_ms,
            ping: self.ping,
            ..ClientConfig::default()
        }
    }

    pub fn audit_config(&self) -> Option<AuditConfig> {
        self.audit_dir.as_ref().map(|dir| AuditConfig {
            max_file_size: self.audit_max_file_size,
            ..AuditConfig::new(dir)
        })
    }
}

pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".tactus").join("config.toml")
}

/// Load the config from disk. `Ok(None)` when the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `TACTUS_*` environment overrides.
///
/// | Variable | Config field |
/// |---|---|
/// | `TACTUS_SERVER_URL` | `server_url` |
/// | `TACTUS_CLIENT_NAME` | `client_name` |
/// | `TACTUS_AUDIT_DIR` | `audit_dir` |
/// | `TACTUS_HANDSHAKE_TIMEOUT_MS` | `handshake_timeout_ms` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("TACTUS_SERVER_URL") {
        cfg.server_url = v;
    }
    if let Ok(v) = std::env::var("TACTUS_CLIENT_NAME") {
        cfg.client_name = v;
    }
    if let Ok(v) = std::env::var("TACTUS_AUDIT_DIR") {
        cfg.audit_dir = Some(PathBuf::from(v));
    }
    if let Ok(v) = std::env::var("TACTUS_HANDSHAKE_TIMEOUT_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.handshake_timeout_ms = ms;
    }
}

pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Write `cfg` to `path`, owner-only on Unix.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
