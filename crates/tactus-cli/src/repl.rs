//! Interactive shell.
//!
//! Slash-commands:
//!   /scan, /stopscan            – start / stop device discovery
//!   /list                       – ask the server for its device list
//!   /devices                    – show the local registry
//!   /vibrate <dev> <v>          – scalar on every actuator
//!   /vibrate <dev> <i>=<v> ...  – scalar on selected actuators
//!   /linear <dev> <ms> <pos>    – move linear actuators
//!   /rotate <dev> <speed> [ccw] – spin rotators
//!   /sensor <dev> <i> [sub|unsub]
//!   /stop [dev]                 – stop one device, or all of them
//!   /status, /help, /quit

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tactus_client::{
    Actuation, Client, CommandOutcome, Device, DeviceIndex, LinearTarget, RotateTarget, TactusError,
};
use tactus_types::command_type;
use tokio::runtime::{Handle, Runtime};

#[derive(Debug, Clone, PartialEq)]
pub enum SensorMode {
    Read,
    Subscribe,
    Unsubscribe,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Quit,
    Status,
    Scan,
    StopScan,
    List,
    Devices,
    Vibrate { device: DeviceIndex, values: Actuation<f64> },
    Linear { device: DeviceIndex, target: LinearTarget },
    Rotate { device: DeviceIndex, target: RotateTarget },
    Sensor { device: DeviceIndex, index: u32, mode: SensorMode },
    Stop { device: Option<DeviceIndex> },
}

/// Parse one input line.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Err("empty command".to_string());
    };
    let args: Vec<&str> = words.collect();
    let arity = |n: usize| {
        if args.len() < n {
            Err(format!("{head} needs {n} argument(s); see /help"))
        } else {
            Ok(())
        }
    };

    let cmd = match head {
        "/help" => Command::Help,
        "/quit" | "/exit" => Command::Quit,
        "/status" => Command::Status,
        "/scan" => Command::Scan,
        "/stopscan" => Command::StopScan,
        "/list" => Command::List,
        "/devices" => Command::Devices,
        "/vibrate" => {
            arity(2)?;
            let device = parse_num(args[0], "device")?;
            let values = if args[1].contains('=') {
                let mut pairs = Vec::with_capacity(args.len() - 1);
                for pair in &args[1..] {
                    let (index, value) = pair
                        .split_once('=')
                        .ok_or_else(|| format!("expected <index>=<value>, got '{pair}'"))?;
                    pairs.push((parse_num(index, "actuator index")?, parse_level(value)?));
                }
                Actuation::per_actuator(pairs)
            } else {
                Actuation::uniform(parse_level(args[1])?)
            };
            Command::Vibrate { device, values }
        }
        "/linear" => {
            arity(3)?;
            Command::Linear {
                device: parse_num(args[0], "device")?,
                target: LinearTarget {
                    duration_ms: parse_num(args[1], "duration")?,
                    position: parse_level(args[2])?,
                },
            }
        }
        "/rotate" => {
            arity(2)?;
            let clockwise = match args.get(2).copied() {
                None | Some("cw") => true,
                Some("ccw") => false,
                Some(other) => return Err(format!("direction must be cw or ccw, got '{other}'")),
            };
            Command::Rotate {
                device: parse_num(args[0], "device")?,
                target: RotateTarget { speed: parse_level(args[1])?, clockwise },
            }
        }
        "/sensor" => {
            arity(2)?;
            let mode = match args.get(2).copied() {
                None | Some("read") => SensorMode::Read,
                Some("sub") => SensorMode::Subscribe,
                Some("unsub") => SensorMode::Unsubscribe,
                Some(other) => return Err(format!("mode must be read, sub or unsub, got '{other}'")),
            };
            Command::Sensor {
                device: parse_num(args[0], "device")?,
                index: parse_num(args[1], "sensor index")?,
                mode,
            }
        }
        "/stop" => Command::Stop {
            device: args.first().map(|d| parse_num(d, "device")).transpose()?,
        },
        other => return Err(format!("unknown command '{other}'")),
    };
    Ok(cmd)
}

fn parse_num<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T, String> {
    raw.parse().map_err(|_| format!("invalid {what} '{raw}'"))
}

/// A level in `[0.0, 1.0]`.
fn parse_level(raw: &str) -> Result<f64, String> {
    let v: f64 = parse_num(raw, "level")?;
    if (0.0..=1.0).contains(&v) {
        Ok(v)
    } else {
        Err(format!("level must be between 0 and 1, got {v}"))
    }
}

/// Run the prompt until `/quit`, end of input, or `shutdown` is set.
pub fn run(runtime: &Runtime, client: &Arc<Client>, shutdown: &AtomicBool) {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("{}: {}", "Terminal error".red(), e);
            return;
        }
    };

    while !shutdown.load(Ordering::SeqCst) {
        let line = match editor.readline("tactus> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                emergency_stop(runtime.handle(), client);
                break;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(line);

        match parse_command(line) {
            Ok(Command::Quit) => {
                println!("{}", "Goodbye.".green());
                break;
            }
            Ok(cmd) => execute(runtime, client, cmd),
            Err(msg) => println!("{} {}. Type {} for help.", "✗".red(), msg, "/help".bold()),
        }
    }
}

/// Upper bound on the exit-time `StopAllDevices`.
pub const STOP_DEADLINE: Duration = Duration::from_secs(2);

/// Stop every device before leaving, giving up after [`STOP_DEADLINE`].
pub fn emergency_stop(handle: &Handle, client: &Client) {
    match handle.block_on(async { tokio::time::timeout(STOP_DEADLINE, client.stop_all_devices()).await }) {
        Ok(Ok(_)) => println!("{}", "  ✓ StopAllDevices sent.".green()),
        Ok(Err(e)) => println!("  {} could not stop devices: {}", "✗".red(), e),
        Err(_) => println!(
            "  {} no answer from the connection after {}s; exiting anyway",
            "✗".red(),
            STOP_DEADLINE.as_secs()
        ),
    }
}

fn execute(runtime: &Runtime, client: &Client, cmd: Command) {
    match cmd {
        Command::Help => cmd_help(),
        Command::Status => cmd_status(client),
        Command::Devices => cmd_devices(client),
        Command::Quit => {}
        Command::Scan => report_id(runtime.block_on(client.start_scan()), "scanning"),
        Command::StopScan => report_id(runtime.block_on(client.stop_scan()), "scan stopped"),
        Command::List => report_id(runtime.block_on(client.request_device_list()), "device list requested"),
        Command::Stop { device: None } => report_id(runtime.block_on(client.stop_all_devices()), "all devices stopped"),
        Command::Stop { device: Some(id) } => {
            if let Some(device) = lookup(client, id) {
                report_id(runtime.block_on(client.stop_device(&device)), "device stopped");
            }
        }
        Command::Vibrate { device, values } => {
            if let Some(device) = lookup(client, device) {
                report_outcome(runtime.block_on(client.send_scalar(&device, values)));
            }
        }
        Command::Linear { device, target } => {
            if let Some(device) = lookup(client, device) {
                report_outcome(runtime.block_on(client.send_linear(&device, Actuation::uniform(target))));
            }
        }
        Command::Rotate { device, target } => {
            if let Some(device) = lookup(client, device) {
                report_outcome(runtime.block_on(client.send_rotate(&device, Actuation::uniform(target))));
            }
        }
        Command::Sensor { device, index, mode } => {
            if let Some(device) = lookup(client, device) {
                let result = runtime.block_on(async {
                    match mode {
                        SensorMode::Read => client.sensor_read(&device, index).await,
                        SensorMode::Subscribe => client.sensor_subscribe(&device, index).await,
                        SensorMode::Unsubscribe => client.sensor_unsubscribe(&device, index).await,
                    }
                });
                report_id(result, "sensor request sent");
            }
        }
    }
}

fn lookup(client: &Client, id: DeviceIndex) -> Option<Device> {
    let device = client.registry().get(id);
    if device.is_none() {
        println!("  {} no device {}; try {}", "✗".red(), id.to_string().yellow(), "/devices".bold());
    }
    device
}

fn report_id(result: Result<u32, TactusError>, what: &str) {
    match result {
        Ok(id) => println!("  {} {} {}", "✓".green(), what, format!("(ID: {id})").dimmed()),
        Err(e) => println!("  {} {}", "✗".red(), e),
    }
}

fn report_outcome(result: Result<CommandOutcome, TactusError>) {
    match result {
        Ok(outcome) if outcome.skipped.is_empty() => {
            println!("  {} sent {}", "✓".green(), format!("(ID: {})", outcome.id).dimmed());
        }
        Ok(outcome) => println!(
            "  {} sent {}, skipped actuators {:?}",
            "✓".yellow(),
            format!("(ID: {})", outcome.id).dimmed(),
            outcome.skipped
        ),
        Err(e) => println!("  {} {}", "✗".red(), e),
    }
}

fn cmd_help() {
    println!();
    println!("{}", "Commands".bold().underline());
    let rows = [
        ("/scan  /stopscan", "start or stop device discovery"),
        ("/list", "ask the server for its device list"),
        ("/devices", "show known devices and their actuators"),
        ("/vibrate <dev> <v>", "scalar level 0..1 on every actuator"),
        ("/vibrate <dev> <i>=<v> ..", "scalar level on selected actuators"),
        ("/linear <dev> <ms> <pos>", "move to position 0..1 over <ms>"),
        ("/rotate <dev> <speed> [cw|ccw]", "spin at speed 0..1"),
        ("/sensor <dev> <i> [read|sub|unsub]", "read or (un)subscribe a sensor"),
        ("/stop [dev]", "stop one device, or all devices"),
        ("/status", "connection and server details"),
        ("/quit  /exit", "stop all devices and exit"),
    ];
    for (cmd, what) in rows {
        println!("  {:<36} – {}", cmd.bold().cyan(), what);
    }
    println!();
}

fn cmd_status(client: &Client) {
    let phase = client.phase().to_string();
    println!("  Connection : {}", phase.yellow());
    match client.server_info() {
        Some(info) => println!(
            "  Server     : {} (message version {}, max ping {} ms)",
            info.server_name.bold(),
            info.message_version,
            info.max_ping_time
        ),
        None => println!("  Server     : {}", "not identified".dimmed()),
    }
    if let Some(reading) = client.sensor_snapshot() {
        println!(
            "  Last sensor: device {} sensor {} {} {:?}",
            reading.device_id, reading.sensor_index, reading.sensor_type, reading.data
        );
    }
}

fn cmd_devices(client: &Client) {
    let devices = client.devices();
    if devices.is_empty() {
        println!("  {}", "No devices. Try /scan.".dimmed());
        return;
    }
    for device in devices {
        println!("  [{}] {}", device.id.to_string().bold(), device.label().bold());
        for kind in [command_type::SCALAR, command_type::LINEAR, command_type::ROTATE, command_type::SENSOR_READ] {
            if let Some(descriptors) = device.descriptors(kind) {
                let summary: Vec<String> = descriptors
                    .iter()
                    .enumerate()
                    .map(|(i, d)| {
                        let what = if d.actuator_type.is_empty() { &d.sensor_type } else { &d.actuator_type };
                        format!("{i}:{what}")
                    })
                    .collect();
                println!("      {:<14} {}", kind.cyan(), summary.join("  "));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_commands() {
        assert_eq!(parse_command("/scan"), Ok(Command::Scan));
        assert_eq!(parse_command("  /devices  "), Ok(Command::Devices));
        assert_eq!(parse_command("/exit"), Ok(Command::Quit));
        assert_eq!(parse_command("/stop"), Ok(Command::Stop { device: None }));
        assert_eq!(parse_command("/stop 4"), Ok(Command::Stop { device: Some(4) }));
    }

    #[test]
    fn parses_uniform_and_per_actuator_vibrate() {
        assert_eq!(
            parse_command("/vibrate 2 0.5"),
            Ok(Command::Vibrate { device: 2, values: Actuation::uniform(0.5) })
        );
        assert_eq!(
            parse_command("/vibrate 2 0=0.25 3=1"),
            Ok(Command::Vibrate { device: 2, values: Actuation::per_actuator([(0, 0.25), (3, 1.0)]) })
        );
    }

    #[test]
    fn parses_linear_rotate_and_sensor() {
        assert_eq!(
            parse_command("/linear 1 500 0.8"),
            Ok(Command::Linear { device: 1, target: LinearTarget { duration_ms: 500, position: 0.8 } })
        );
        assert_eq!(
            parse_command("/rotate 1 0.3 ccw"),
            Ok(Command::Rotate { device: 1, target: RotateTarget { speed: 0.3, clockwise: false } })
        );
        assert_eq!(
            parse_command("/sensor 6 0 sub"),
            Ok(Command::Sensor { device: 6, index: 0, mode: SensorMode::Subscribe })
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_command("/vibrate 2").is_err());
        assert!(parse_command("/vibrate two 0.5").is_err());
        assert!(parse_command("/vibrate 2 1.5").is_err());
        assert!(parse_command("/vibrate 2 0:0.5").is_err());
        assert!(parse_command("/rotate 1 0.3 sideways").is_err());
        assert!(parse_command("/dance").is_err());
        assert!(parse_command("").is_err());
    }

    #[test]
    fn emergency_stop_gives_up_on_a_silent_server() {
        use tactus_client::{ClientConfig, WsTransport};

        let runtime = Runtime::new().unwrap();
        // Accepts TCP connections but never answers the WebSocket upgrade.
        let listener = runtime.block_on(tokio::net::TcpListener::bind("127.0.0.1:0")).unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let client = Client::new(ClientConfig::new(url), Arc::new(WsTransport::new()));
        runtime.block_on(client.connect()).unwrap();

        let started = std::time::Instant::now();
        emergency_stop(runtime.handle(), &client);
        let waited = started.elapsed();
        assert!(waited >= STOP_DEADLINE);
        assert!(waited < STOP_DEADLINE * 3);
    }
}
