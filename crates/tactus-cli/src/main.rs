//! `tactus` – interactive shell for a device server.
//!
//! 1. Loads `~/.tactus/config.toml`, running a short first-run wizard when it
//!    is missing.
//! 2. Connects and waits for the server to identify itself.
//! 3. Drops into a slash-command REPL.
//! 4. On Ctrl-C (or `/quit`) sends `StopAllDevices` before exiting.

mod config;
mod repl;
mod telemetry;

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use tactus_client::{AuditSink, Client, ClientEvent, FileAudit, WsTransport};
use tactus_protocol::ServerMessage;
use tracing::{error, warn};

fn main() {
    let _telemetry = telemetry::init("tactus");
    print_banner();

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", config::config_path().display().to_string().bold());
            cfg
        }
        Ok(None) => run_first_run_wizard(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start the async runtime");
            std::process::exit(1);
        }
    };

    let mut client = Client::new(cfg.client_config(), Arc::new(WsTransport::new()));
    let mut audit = None;
    if let Some(audit_cfg) = cfg.audit_config() {
        match FileAudit::start(audit_cfg.clone()) {
            Ok(file_audit) => {
                println!("  Audit log in {}", audit_cfg.directory.display().to_string().bold());
                let file_audit = Arc::new(file_audit);
                client = client.with_audit(Arc::clone(&file_audit) as Arc<dyn AuditSink>);
                audit = Some(file_audit);
            }
            Err(e) => warn!(error = %e, dir = %audit_cfg.directory.display(), "audit log disabled"),
        }
    }
    let client = Arc::new(client);
    client.add_listener(print_event);

    // ── Ctrl-C ────────────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        let client = Arc::clone(&client);
        let handle = runtime.handle().clone();
        if let Err(e) = ctrlc::set_handler(move || {
            println!();
            println!("{}", "⚠  Ctrl-C received – stopping all devices …".yellow().bold());
            repl::emergency_stop(&handle, &client);
            shutdown.store(true, Ordering::SeqCst);
        }) {
            warn!(error = %e, "Failed to install Ctrl-C handler");
        }
    }

    // ── Connect ───────────────────────────────────────────────────────────
    print!("\n  Connecting to {} … ", config::redact_credentials(&cfg.server_url).dimmed());
    std::io::stdout().flush().ok();
    let connected = runtime.block_on(async {
        client.connect().await?;
        client.wait_until_identified(cfg.client_config().handshake_timeout()).await
    });
    match (connected, client.server_info()) {
        (Ok(()), Some(info)) => println!(
            "{} ({} v{})",
            "identified".green(),
            info.server_name.bold(),
            info.message_version
        ),
        (Ok(()), None) => println!("{}", "identified".green()),
        (Err(e), _) => {
            println!("{}", "failed".red());
            println!("  {}", e.to_string().dimmed());
            println!("  Is the device server running? Commands will fail until it is.");
        }
    }

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    repl::run(&runtime, &client, &shutdown);

    if !shutdown.load(Ordering::SeqCst) {
        repl::emergency_stop(runtime.handle(), &client);
    }
    if let Err(e) = runtime.block_on(client.disconnect()) {
        warn!(error = %e, "disconnect failed");
    }
    // The Ctrl-C handler keeps the client alive, so flush the audit log here.
    if let Some(audit) = audit {
        audit.stop();
    }
    println!("{}", "  ✓ Exiting tactus.".green());
}

/// Print server-initiated traffic above the prompt.
fn print_event(event: &ClientEvent) {
    match event {
        ClientEvent::Message(ServerMessage::DeviceAdded(added)) => println!(
            "\n  {} device {} {}",
            "+".green().bold(),
            added.device.device_index.to_string().bold(),
            added.device.device_name
        ),
        ClientEvent::Message(ServerMessage::DeviceRemoved(removed)) => println!(
            "\n  {} device {}",
            "-".red().bold(),
            removed.device_index.to_string().bold()
        ),
        ClientEvent::Message(ServerMessage::DeviceList(list)) => {
            println!("\n  {} {} device(s) known", "•".cyan(), list.devices.len());
        }
        ClientEvent::Message(ServerMessage::ScanningFinished(_)) => {
            println!("\n  {} scanning finished", "•".cyan());
        }
        ClientEvent::Message(ServerMessage::SensorReading(reading)) => println!(
            "\n  {} device {} sensor {} {}: {:?}",
            "◉".cyan(),
            reading.device_index,
            reading.sensor_index,
            reading.sensor_type,
            reading.data
        ),
        ClientEvent::Message(ServerMessage::Error(err)) => println!(
            "\n  {} server error {} (ID: {}): {}",
            "✗".red(),
            err.error_code,
            err.id,
            err.error_message
        ),
        ClientEvent::Message(_) => {}
        ClientEvent::ProtocolError(e) => println!("\n  {} bad frame: {}", "⚠".yellow(), e),
        ClientEvent::TransportError(e) => println!("\n  {} transport: {}", "⚠".yellow(), e),
        ClientEvent::Disconnected => println!("\n  {}", "Disconnected from server.".yellow().bold()),
    }
}

fn run_first_run_wizard() -> config::Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║        tactus First-Run Setup        ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();

    let mut cfg = config::Config::default();
    cfg.server_url = prompt_line(&format!("  Server URL [{}]: ", cfg.server_url), &cfg.server_url);
    cfg.client_name = prompt_line(&format!("  Client name [{}]: ", cfg.client_name), &cfg.client_name);
    let audit = prompt_line("  Audit log directory (empty to disable): ", "");
    if !audit.is_empty() {
        cfg.audit_dir = Some(audit.into());
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

fn print_banner() {
    println!();
    println!("{}", r#"  __              __            "#.bold().cyan());
    println!("{}", r#" / /_____ ______/ /___ _______ "#.bold().cyan());
    println!("{}", r#"/ __/ __ `/ ___/ __/ / / / ___/"#.bold().cyan());
    println!("{}", r#"\__/\__,_/\___/\__/\__,_/____/ "#.bold().cyan());
    println!();
    println!("  {} {}", "tactus".bold(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    println!("  Device control client");
    println!();
}

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::BufRead;
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}
