//! Uartcap - serial test-session capture
//!
//! Waits for the device under test to start a session, then writes the
//! word stream to a binary artifact and throughput measurements to
//! `<output>_throughput`.

use clap::{Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uartcap_core::cli::{exit_code_description, init_logging, CliResult, ExitCodes, Verbosity};
use uartcap_core::core::capture::{capture_to_files, ensure_absent};
use uartcap_core::core::transport::{list_ports, SerialTransport, StreamLineSource};
use uartcap_core::{CaptureConfig, SessionReport};

/// Report output format
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON format for scripting
    Json,
}

/// Uartcap CLI
#[derive(Parser, Debug)]
#[command(
    name = "uartcap",
    version,
    about = "Capture word streams and throughput from a device test session over serial",
    long_about = None
)]
struct Cli {
    /// Report format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (warnings and errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Also write logs to this file
    #[arg(long, global = true, env = "UARTCAP_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "UARTCAP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Capture a test session from a serial port
    Capture {
        /// Binary word artifact to create (must not exist)
        output: PathBuf,

        /// Serial port name (e.g., COM3, /dev/ttyUSB1)
        #[arg(short, long)]
        port: Option<String>,

        /// Baud rate
        #[arg(short, long)]
        baud: Option<u32>,
    },

    /// Run the capture pipeline over a recorded line log
    Replay {
        /// Recorded log, or `-` for stdin
        input: PathBuf,

        /// Binary word artifact to create (must not exist)
        output: PathBuf,
    },

    /// List available serial ports
    ListPorts,

    /// Print the effective configuration as TOML
    ShowConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match init_logging(
        Verbosity::from_flags(cli.quiet, cli.verbose),
        cli.log_file.as_deref(),
    ) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialise logging: {e:#}");
            return ExitCode::from(ExitCodes::ERROR);
        }
    };

    tracing::debug!("Starting uartcap v{}", uartcap_core::VERSION);

    let result = run(&cli);
    if let (false, Some(message)) = (result.is_success(), result.message()) {
        let code = result.code();
        tracing::error!(code, reason = exit_code_description(code), "{message}");
    }
    result.to_exit_code()
}

fn run(cli: &Cli) -> CliResult {
    let mut config = match CaptureConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => return CliResult::from(&e),
    };

    match &cli.command {
        Commands::Capture { output, port, baud } => {
            if let Some(port) = port {
                config.serial.port.clone_from(port);
            }
            if let Some(baud) = baud {
                config.serial.baud_rate = *baud;
            }
            capture_serial(cli, &config, output)
        }
        Commands::Replay { input, output } => replay(cli, &config, input, output),
        Commands::ListPorts => show_ports(cli),
        Commands::ShowConfig => match config.to_toml() {
            Ok(text) => {
                print!("{text}");
                CliResult::success()
            }
            Err(e) => CliResult::error(ExitCodes::ERROR, e.to_string()),
        },
    }
}

fn capture_serial(cli: &Cli, config: &CaptureConfig, output: &Path) -> CliResult {
    if let Err(e) = ensure_absent(output) {
        return CliResult::from(&e);
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        tracing::warn!(error = %e, "Ctrl+C handler not installed");
    }

    let source = match SerialTransport::new(config.serial.clone()).connect() {
        Ok(source) => source,
        Err(e) => return CliResult::from(&e),
    };
    let mut source = source.with_shutdown(shutdown);

    match capture_to_files(&mut source, output, config) {
        Ok(report) => finish(cli, &report),
        Err(e) => CliResult::from(&e),
    }
}

fn replay(cli: &Cli, config: &CaptureConfig, input: &Path, output: &Path) -> CliResult {
    if let Err(e) = ensure_absent(output) {
        return CliResult::from(&e);
    }

    let reader: Box<dyn Read> = if input.as_os_str() == "-" {
        Box::new(io::stdin().lock())
    } else {
        match File::open(input) {
            Ok(file) => Box::new(file),
            Err(e) => {
                return CliResult::error(
                    ExitCodes::ERROR,
                    format!("Cannot open {}: {e}", input.display()),
                )
            }
        }
    };

    let mut source = StreamLineSource::new(reader);
    match capture_to_files(&mut source, output, config) {
        Ok(report) => finish(cli, &report),
        Err(e) => CliResult::from(&e),
    }
}

fn finish(cli: &Cli, report: &SessionReport) -> CliResult {
    match cli.format {
        OutputFormat::Json => match serde_json::to_string_pretty(report) {
            Ok(json) => println!("{json}"),
            Err(e) => return CliResult::error(ExitCodes::ERROR, e.to_string()),
        },
        OutputFormat::Text => {
            if !cli.quiet {
                print_report(report);
            }
        }
    }
    CliResult::from_termination(report.termination)
}

fn print_report(report: &SessionReport) {
    let termination = report
        .termination
        .map_or_else(|| "none".to_string(), |t| format!("{t:?}"));
    println!("Session:            {termination}");
    println!("Lines read:         {}", report.lines_read);
    println!("Words written:      {}", report.words_written);
    println!("Throughput records: {}", report.throughput_records);
    if let Some(count) = report.last_block_count {
        println!("Last block count:   {count}");
    }
    println!(
        "Dropped lines:      {} malformed, {} undecodable, {} sink errors",
        report.malformed_lines, report.decode_errors, report.sink_errors
    );
    println!(
        "Anomalies:          {} unexpected, {} failed markers",
        report.anomalies, report.failed_markers
    );
}

fn show_ports(cli: &Cli) -> CliResult {
    let ports = match list_ports() {
        Ok(ports) => ports,
        Err(e) => return CliResult::from(&e),
    };

    match cli.format {
        OutputFormat::Json => {
            let json: Vec<serde_json::Value> = ports
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "name": p.port_name,
                        "type": format!("{:?}", p.port_type)
                    })
                })
                .collect();
            match serde_json::to_string_pretty(&json) {
                Ok(text) => println!("{text}"),
                Err(e) => return CliResult::error(ExitCodes::ERROR, e.to_string()),
            }
        }
        OutputFormat::Text => {
            if ports.is_empty() && !cli.quiet {
                println!("No serial ports found.");
            }
            for port in &ports {
                println!("{}", port.port_name);
            }
        }
    }
    CliResult::success()
}
