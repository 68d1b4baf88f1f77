use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serialport::SerialPort;
use stage_sim::config::{SerialConfig, BAUD_RATES};
use stage_sim::{SimulatedPort, Simulator, SimulatorConfig};
use std::io::{self, BufRead, Read, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

mod monitor;

#[derive(Parser)]
#[command(name = "simulator_cli")]
#[command(about = "Stage controller firmware simulator", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand)]
enum Mode {
    /// Type commands on stdin and print the replies
    Manual,
    /// Answer commands arriving on a serial port
    Serial {
        /// Port name, e.g. /dev/ttyUSB0 or COM3
        #[arg(long)]
        port: Option<String>,
        #[arg(long)]
        baud: Option<u32>,
    },
    /// List available serial ports
    Ports,
    /// Full-screen view of the simulated state
    Monitor,
}

// The main entry point for the command-line simulator application.
fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => SimulatorConfig::load_from(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => SimulatorConfig::default(),
    };
    if let Some(level) = cli.log_level {
        config.logging.level = level;
        config.validate()?;
    }

    let logging = Logging::init(&config.logging.level);

    let mut simulator = Simulator::from_config(&config);
    info!(presets = ?simulator.presets(), "simulator started");

    match cli.mode {
        Some(Mode::Manual) => run_manual_mode(&mut simulator),
        Some(Mode::Serial { port, baud }) => {
            if let Some(port) = port {
                config.serial.port = Some(port);
            }
            if let Some(baud) = baud {
                config.serial.baud_rate = Some(baud);
                config.validate()?;
            }
            run_serial_mode(&mut simulator, &config)
        }
        Some(Mode::Ports) => list_ports().map(|_| ()),
        Some(Mode::Monitor) => monitor::run(&mut simulator, &logging),
        None => run_menu(&mut simulator, &config, &logging),
    }
}

fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// The installed log filter. Kept reloadable so the monitor can switch logging off while it
/// owns the terminal, whichever way it was started.
pub(crate) struct Logging {
    handle: reload::Handle<EnvFilter, Registry>,
    level: String,
}

impl Logging {
    fn init(level: &str) -> Self {
        let (filter, handle) = reload::Layer::new(build_filter(level));
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(io::stderr))
            .init();
        Self {
            handle,
            level: level.to_string(),
        }
    }

    /// Switches logging off until the returned guard is dropped.
    pub(crate) fn silence(&self) -> Result<SilencedLogs<'_>> {
        self.handle
            .reload(EnvFilter::new("off"))
            .context("Failed to silence logging")?;
        Ok(SilencedLogs { logging: self })
    }
}

pub(crate) struct SilencedLogs<'a> {
    logging: &'a Logging,
}

impl Drop for SilencedLogs<'_> {
    fn drop(&mut self) {
        // A failed restore leaves logging off; there is nowhere to report it.
        let _ = self
            .logging
            .handle
            .reload(build_filter(&self.logging.level));
    }
}

fn run_menu(
    simulator: &mut Simulator,
    config: &SimulatorConfig,
    logging: &Logging,
) -> Result<()> {
    println!("==============================");
    println!("  Stage Controller Simulator  ");
    println!("==============================");

    loop {
        println!("\nSelect mode:");
        println!("  1. Manual Command Input");
        println!("  2. Listen on Serial Port");
        println!("  3. Monitor");
        println!("  4. Exit");

        let Some(choice) = prompt("> ")? else {
            return Ok(());
        };

        let outcome = match choice.as_str() {
            "1" => run_manual_mode(simulator),
            "2" => run_serial_mode(simulator, config),
            "3" => monitor::run(simulator, logging),
            "4" => return Ok(()),
            _ => {
                eprintln!("[ERROR] Invalid choice. Please enter 1, 2, 3, or 4.");
                continue;
            }
        };
        // A failed mode returns to the menu instead of ending the session.
        if let Err(e) = outcome {
            error!("{:#}", e);
        }
    }
}

/// Prints `message` and reads one trimmed line. `None` means stdin is closed.
fn prompt(message: &str) -> Result<Option<String>> {
    print!("{}", message);
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// Handles `:`-prefixed console directives that act on the simulator directly.
///
/// These stand in for the test-fixture access a harness has, e.g. injecting a photodiode
/// reading. Returns `None` for anything that should go to the protocol instead.
pub(crate) fn harness_directive(simulator: &mut Simulator, line: &str) -> Option<String> {
    let directive = line.trim().strip_prefix(':')?;
    let mut parts = directive.split_whitespace();
    let reply = match (parts.next(), parts.next(), parts.next()) {
        (Some("pd"), Some(value), None) => match value.parse::<i64>() {
            Ok(value) => {
                simulator.set_photodiode(value);
                format!("Photodiode reading set to {}", value)
            }
            Err(_) => format!("Invalid photodiode reading '{}'", value),
        },
        (Some("reset"), None, None) => {
            simulator.reset();
            String::from("State reset")
        }
        _ => format!(
            "Unknown directive ':{}' (available: :pd <value>, :reset)",
            directive
        ),
    };
    Some(reply + "\n")
}

// Handles the manual command input mode.
fn run_manual_mode(simulator: &mut Simulator) -> Result<()> {
    println!("\n--- Manual Mode ---");
    println!("Enter commands, or type 'back' to return to the main menu.");
    println!("Directives: ':pd <value>' sets the photodiode reading, ':reset' clears all state.");
    print!("> ");
    io::stdout().flush()?;

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let input = line?;
        let command = input.trim();

        if command == "back" {
            break;
        }

        if !command.is_empty() {
            let response = harness_directive(simulator, command)
                .unwrap_or_else(|| simulator.send_command(command));
            // Motion commands have no reply.
            if !response.is_empty() {
                print!("< {}", response);
            }
        }

        print!("> ");
        io::stdout().flush()?;
    }
    Ok(())
}

fn list_ports() -> Result<Vec<serialport::SerialPortInfo>> {
    let ports = serialport::available_ports().context("Could not enumerate serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found.");
    }
    for (i, port) in ports.iter().enumerate() {
        println!("  {}: {}", i, port.port_name);
    }
    Ok(ports)
}

fn select_index(message: &str, len: usize) -> Result<usize> {
    match prompt(message)?.map(|s| s.parse::<usize>()) {
        Some(Ok(i)) if i < len => Ok(i),
        _ => bail!("Invalid selection"),
    }
}

// Fills in whatever the CLI and configuration left open. The baud rate is only asked for when
// the port was picked interactively and no rate was given.
fn choose_port(
    serial: &SerialConfig,
    pick_port: impl FnOnce() -> Result<String>,
    pick_baud: impl FnOnce() -> Result<u32>,
) -> Result<(String, u32)> {
    match (&serial.port, serial.baud_rate) {
        (Some(port), _) => Ok((port.clone(), serial.baud_rate_or_default())),
        (None, Some(baud_rate)) => Ok((pick_port()?, baud_rate)),
        (None, None) => {
            let port = pick_port()?;
            Ok((port, pick_baud()?))
        }
    }
}

fn prompt_port() -> Result<String> {
    println!("Available serial ports:");
    let ports = list_ports()?;
    if ports.is_empty() {
        bail!("No serial ports found");
    }
    let port_index = select_index("Select a port (number): ", ports.len())?;
    Ok(ports[port_index].port_name.clone())
}

fn prompt_baud() -> Result<u32> {
    println!("Available baud rates:");
    for (i, rate) in BAUD_RATES.iter().enumerate() {
        println!("  {}: {}", i, rate);
    }
    let baud_index = select_index("Select a baud rate (number): ", BAUD_RATES.len())?;
    Ok(BAUD_RATES[baud_index])
}

// Handles the serial port listening mode.
fn run_serial_mode(simulator: &mut Simulator, config: &SimulatorConfig) -> Result<()> {
    println!("\n--- Serial Mode ---");

    let (port_name, baud_rate) = choose_port(&config.serial, prompt_port, prompt_baud)?;
    let mut port = serialport::new(&port_name, baud_rate)
        .timeout(Duration::from_millis(config.serial.timeout_ms))
        .open()
        .with_context(|| format!("Failed to open port '{}'", port_name))?;

    println!(
        "\nListening on {} at {} baud. Press Ctrl+C to exit.",
        port_name, baud_rate
    );
    info!(port = %port_name, baud_rate, "serial listener started");

    let mut bridge = SimulatedPort::new(std::mem::take(simulator));
    let result = serve(port.as_mut(), &mut bridge);
    *simulator = bridge.into_inner();
    result
}

// Feeds received bytes to the simulator and writes its replies back until the port fails.
fn serve(port: &mut dyn SerialPort, bridge: &mut SimulatedPort) -> Result<()> {
    let mut serial_buf: Vec<u8> = vec![0; 128];
    loop {
        match port.read(serial_buf.as_mut_slice()) {
            Ok(0) => {}
            Ok(bytes_read) => {
                let received = &serial_buf[..bytes_read];
                let shown = String::from_utf8_lossy(received);
                if !shown.trim().is_empty() {
                    println!("> Received: {}", shown.trim());
                }
                bridge.write_all(received)?;

                let reply = bridge.take_output();
                if !reply.is_empty() {
                    print!("< {}", String::from_utf8_lossy(&reply));
                    io::stdout().flush()?;
                    if let Err(e) = port.write_all(&reply) {
                        warn!("Failed to write to serial port: {}", e);
                    }
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut => (),
            Err(e) => return Err(e).context("Serial port error"),
        }
    }
}
