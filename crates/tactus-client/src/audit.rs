//! Message audit trail.
//!
//! The send path and the dispatcher report every message that crosses the
//! socket to an [`AuditSink`]. [`TracingAudit`] turns each record into a
//! `tracing` event; [`FileAudit`] appends a line to a rotating log file from a
//! dedicated writer thread, so recording never blocks the caller.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::thread::JoinHandle;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tactus_protocol::MessageKind;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

impl Direction {
    fn label(self) -> &'static str {
        match self {
            Direction::Sent => "SENT",
            Direction::Received => "RECEIVED",
        }
    }
}

pub trait AuditSink: Send + Sync {
    fn record(&self, direction: Direction, kind: MessageKind, id: u32);

    fn record_sent(&self, kind: MessageKind, id: u32) {
        self.record(Direction::Sent, kind, id);
    }

    fn record_received(&self, kind: MessageKind, id: u32) {
        self.record(Direction::Received, kind, id);
    }
}

/// Emits a `debug` event on the `tactus::audit` target per message.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAudit;

impl AuditSink for TracingAudit {
    fn record(&self, direction: Direction, kind: MessageKind, id: u32) {
        debug!(target: "tactus::audit", direction = direction.label(), kind = %kind, id, "message");
    }
}

fn default_base_name() -> String {
    "log".to_string()
}

fn default_max_file_size() -> u64 {
    102_400
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditConfig {
    pub directory: PathBuf,
    #[serde(default = "default_base_name")]
    pub base_name: String,
    /// Bytes written to one file before rotating to the next.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

impl AuditConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            base_name: default_base_name(),
            max_file_size: default_max_file_size(),
        }
    }
}

struct Entry {
    at: DateTime<Local>,
    direction: Direction,
    kind: MessageKind,
    id: u32,
}

/// Fire-and-forget file logger.
///
/// Files are named `<base>_<YYYYMMDD_HHMMSS>_<n>.log`, where the timestamp is
/// the time the sink started and `n` counts rotations. Dropping the sink, or
/// calling [`FileAudit::stop`], drains queued entries and closes the file.
pub struct FileAudit {
    queue: Mutex<Option<mpsc::UnboundedSender<Entry>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl FileAudit {
    pub fn start(config: AuditConfig) -> io::Result<Self> {
        std::fs::create_dir_all(&config.directory)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = RotatingWriter::new(config);
        let handle = std::thread::Builder::new()
            .name("tactus-audit".to_string())
            .spawn(move || writer.run(rx))?;
        Ok(Self {
            queue: Mutex::new(Some(tx)),
            writer: Mutex::new(Some(handle)),
        })
    }

    /// Flush everything queued so far and stop the writer thread.
    pub fn stop(&self) {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).take();
        let handle = self.writer.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("audit writer thread panicked");
            }
        }
    }
}

impl AuditSink for FileAudit {
    fn record(&self, direction: Direction, kind: MessageKind, id: u32) {
        let queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = queue.as_ref() {
            let _ = tx.send(Entry { at: Local::now(), direction, kind, id });
        }
    }
}

impl Drop for FileAudit {
    fn drop(&mut self) {
        self.stop();
    }
}

struct RotatingWriter {
    config: AuditConfig,
    started: String,
    counter: u32,
    written: u64,
    file: Option<BufWriter<File>>,
}

impl RotatingWriter {
    fn new(config: AuditConfig) -> Self {
        Self {
            config,
            started: Local::now().format("%Y%m%d_%H%M%S").to_string(),
            counter: 0,
            written: 0,
            file: None,
        }
    }

    fn run(mut self, mut rx: mpsc::UnboundedReceiver<Entry>) {
        while let Some(entry) = rx.blocking_recv() {
            if let Err(e) = self.write(&entry) {
                warn!(error = %e, "audit write failed");
            }
        }
        if let Some(mut file) = self.file.take() {
            if let Err(e) = file.flush() {
                warn!(error = %e, "audit flush failed");
            }
        }
    }

    fn path(&self) -> PathBuf {
        self.config
            .directory
            .join(format!("{}_{}_{}.log", self.config.base_name, self.started, self.counter))
    }

    fn write(&mut self, entry: &Entry) -> io::Result<()> {
        let line = format!(
            "{} [{}] {} (ID: {})\n",
            entry.at.format("%Y-%m-%d %H:%M:%S%.3f"),
            entry.direction.label(),
            entry.kind,
            entry.id
        );
        if self.file.is_none() {
            self.file = Some(BufWriter::new(File::create(self.path())?));
        }
        if let Some(file) = self.file.as_mut() {
            file.write_all(line.as_bytes())?;
            self.written += line.len() as u64;
        }

        if self.written >= self.config.max_file_size {
            if let Some(mut full) = self.file.take() {
                full.flush()?;
            }
            self.counter += 1;
            self.written = 0;
        }
        Ok(())
    }
}
