//! UART Console - Main Entry Point
//!
//! Headless front end: loads the settings, opens the selected serial port and
//! prints every received line, forwarding stdin lines to the board.

use anyhow::{bail, Context};
use clap::Parser;
use crossbeam_channel::{never, select, unbounded, Receiver};
use serde_json::json;
use std::fmt::Write as _;
use std::io::BufRead;
use std::path::PathBuf;
use uart_console::{
    config::{self, defaults::keys, SettingsStore},
    logging::{self, LogOptions},
    transport::{
        available_port_labels, port_from_label, refresh_port_choice, PayloadKind, PayloadPrefixes,
    },
    SerialTransport, TransportEvent,
};

/// Label of the simulated port used by `--mock`
const MOCK_PORT_LABEL: &str = "mock0 - Simulated board";

/// Typed at the prompt to leave the console
const QUIT_COMMAND: &str = "/quit";

#[derive(Parser, Debug)]
#[command(name = "uart-console", version, about = "Serial console for LELEC210x boards")]
struct Args {
    /// Serial device to open (e.g. /dev/ttyACM0 or COM3)
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Settings file to import instead of the default one
    #[arg(long, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Forward stdin lines to the board
    #[arg(long)]
    allow_write: bool,

    /// List available serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Use a simulated board that echoes written lines
    #[arg(long)]
    mock: bool,

    /// Write the effective settings to FILE before connecting
    #[arg(long, value_name = "FILE")]
    export_settings: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.list_ports {
        for label in available_port_labels() {
            println!("{}", label);
        }
        return Ok(());
    }

    let app_dir = config::ensure_app_data_dir()?;
    let settings = config::defaults::default_store(&app_dir)?;
    let settings_path = args.settings.clone().or_else(config::default_settings_path);

    // Import before logging starts so the logging_* settings apply
    let imported = settings_path
        .as_ref()
        .filter(|path| path.exists())
        .map(|path| (path.clone(), settings.import_file(path)));

    let _log_guard = logging::init(&LogOptions::from_settings(&settings))?;
    tracing::info!(
        "Starting {} v{}",
        settings.get_text(keys::APP_NAME).unwrap_or_default(),
        env!("CARGO_PKG_VERSION")
    );
    match imported {
        Some((path, true)) => tracing::info!("Loaded settings from {:?}", path),
        Some((path, false)) => tracing::warn!("Could not load settings from {:?}, using defaults", path),
        None => tracing::debug!("No settings file, using defaults"),
    }

    let labels = if args.mock {
        vec![MOCK_PORT_LABEL.to_string()]
    } else {
        available_port_labels()
    };
    refresh_port_choice(&settings, &labels);
    apply_overrides(&settings, &args)?;

    if let Some(path) = &args.export_settings {
        if !settings.export_file(path) {
            bail!("Failed to export settings to {}", path.display());
        }
    }

    settings.register_observer("cli", |snapshot| {
        tracing::debug!(
            "Settings changed (write: {:?}, freeze: {:?})",
            snapshot.get_bool(keys::SERIAL_ALLOW_WRITE),
            snapshot.get_bool(keys::SERIAL_FREEZE)
        );
    });

    let transport = create_transport(&settings, args.mock)?;
    let events = transport.events();
    transport.connect().context("Failed to connect")?;

    run_console(&settings, &transport, &events);

    tracing::info!("Shutting down...");
    transport.stop();
    tracing::info!(
        "Session statistics: {}",
        serde_json::to_string(&transport.stats()).context("Failed to serialize statistics")?
    );
    Ok(())
}

/// Apply the command line overrides as one settings batch
fn apply_overrides(settings: &SettingsStore, args: &Args) -> anyhow::Result<()> {
    let mut batch = Vec::new();

    if let Some(port) = &args.port {
        let (_, mut options) = settings
            .get(keys::SERIAL_PORT)
            .and_then(|setting| setting.as_choice().map(|(i, o)| (i, o.to_vec())))
            .context("serial_port setting is missing")?;
        let index = match options.iter().position(|o| port_from_label(o).as_deref() == Some(port.as_str())) {
            Some(index) => index,
            None => {
                options.push(format!("{} - manual", port));
                options.len() - 1
            }
        };
        batch.push((keys::SERIAL_PORT, json!({ "index": index, "options": options })));
    }
    if let Some(baud) = args.baud {
        batch.push((keys::SERIAL_BAUD_RATE, json!(baud)));
    }
    if args.allow_write {
        batch.push((keys::SERIAL_ALLOW_WRITE, json!(true)));
    }

    if batch.is_empty() {
        return Ok(());
    }
    if let Some(report) = settings.update(batch).report() {
        if let Some((key, reason)) = report.rejected.first() {
            bail!("Invalid value for {}: {}", key, reason);
        }
    }
    Ok(())
}

#[cfg(feature = "mock-link")]
fn create_transport(settings: &SettingsStore, mock: bool) -> anyhow::Result<SerialTransport> {
    use uart_console::transport::mock_link::MockOpener;

    if !mock {
        return Ok(SerialTransport::new(settings.clone()));
    }

    let opener = MockOpener::new();
    let handle = opener.handle();
    handle.set_echo(true);
    handle.push_line("CFG:HEX:00010203");
    handle.push_line("Simulated board ready");
    Ok(SerialTransport::with_opener(settings.clone(), opener))
}

#[cfg(not(feature = "mock-link"))]
fn create_transport(settings: &SettingsStore, mock: bool) -> anyhow::Result<SerialTransport> {
    if mock {
        bail!("--mock requires the mock-link feature");
    }
    Ok(SerialTransport::new(settings.clone()))
}

/// Read stdin on a helper thread so the main loop can wait on both sources
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = unbounded();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Why the console loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsoleExit {
    /// The connection closed without a fault
    Closed,
    /// The termination sentinel arrived after a fault
    Terminated,
}

/// Prints transport events and decides when the console is done
///
/// A fault is reported as `Error`, then a disconnection, then the sentinel
/// line; after an error the console keeps reading until the sentinel.
#[derive(Debug)]
struct EventPrinter {
    prefixes: PayloadPrefixes,
    date_format: String,
    faulted: bool,
}

impl EventPrinter {
    fn new(prefixes: PayloadPrefixes, date_format: String) -> Self {
        Self {
            prefixes,
            date_format,
            faulted: false,
        }
    }

    fn handle(&mut self, event: TransportEvent) -> Option<ConsoleExit> {
        match event {
            TransportEvent::LineReceived(line) => {
                let kind = PayloadKind::classify(&line, &self.prefixes);
                if kind == PayloadKind::Terminated {
                    eprintln!("Connection terminated");
                    return Some(ConsoleExit::Terminated);
                }
                println!("[{}] {:>6} | {}", timestamp(&self.date_format), kind.label(), line);
                None
            }
            TransportEvent::StateChanged { connected } => {
                tracing::info!("Serial port {}", if connected { "connected" } else { "disconnected" });
                (!connected && !self.faulted).then_some(ConsoleExit::Closed)
            }
            TransportEvent::Error(message) => {
                self.faulted = true;
                eprintln!("Error: {}", message);
                None
            }
        }
    }
}

fn run_console(settings: &SettingsStore, transport: &SerialTransport, events: &Receiver<TransportEvent>) {
    let date_format = settings
        .get_text(keys::LOGGING_DATE_FORMAT)
        .unwrap_or_else(|| "%Y-%m-%d %H:%M:%S".to_string());
    let mut printer = EventPrinter::new(PayloadPrefixes::from_settings(settings), date_format);
    let input = spawn_stdin_reader();
    let closed = never();
    let mut stdin_open = true;

    loop {
        select! {
            recv(events) -> event => match event {
                Ok(event) => {
                    if let Some(exit) = printer.handle(event) {
                        tracing::debug!("Leaving console: {:?}", exit);
                        break;
                    }
                }
                Err(_) => break,
            },
            recv(if stdin_open { &input } else { &closed }) -> line => match line {
                Ok(line) if line.trim() == QUIT_COMMAND => break,
                Ok(line) => transport.send_line(line),
                Err(_) => stdin_open = false,
            },
        }
    }
}

fn timestamp(format: &str) -> String {
    let now = chrono::Local::now();
    let mut out = String::new();
    if write!(out, "{}", now.format(format)).is_err() {
        out = now.to_rfc3339();
    }
    out
}
