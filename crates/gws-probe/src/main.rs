//! gws-probe - Command-line tool for gear selector diagnostics
//!
//! Reads DTCs, resets the ECU and recovers the checksum and counter layout of
//! the status message by watching how the supervision DTCs react.

mod commands;
mod config;
mod output;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gws_diag::{parse_can_id, parse_hex_bytes, Connection};
use std::fs::File;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "gws-probe")]
#[command(author, version, about = "Gear selector diagnostics and protocol discovery")]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "GWS_PROBE_CONFIG")]
    config: Option<PathBuf>,

    /// SocketCAN interface (overrides the config file)
    #[arg(short, long, env = "GWS_PROBE_INTERFACE")]
    interface: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Also write a debug-level log to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hard reset the ECU
    Reset {
        /// Send a raw single frame on the broadcast ID instead of ISO-TP
        #[arg(long)]
        broadcast: bool,
    },

    /// Read active DTCs
    Dtcs {
        /// Status mask (default from config)
        #[arg(long, value_parser = parse_byte)]
        mask: Option<u8>,
    },

    /// Read every supported DTC
    SupportedDtcs,

    /// Find the checksum byte the ECU accepts for a message body
    FindChecksum {
        /// Body bytes after the checksum, e.g. 01020304
        body: HexBytes,
    },

    /// Burst a complete payload and check whether its checksum is accepted
    VerifyChecksum {
        /// Checksum byte followed by the body
        payload: HexBytes,
    },

    /// Check the configured CRC against the ECU
    ConfirmCrc {
        /// Body bytes after the checksum
        body: HexBytes,
    },

    /// Find the rolling counter field of the status message
    FindCounters,

    /// Sweep single-byte payload variations against the checksum DTC
    SearchChecksums {
        /// Stop after this many observations
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Send correctly checksummed status messages, then read DTCs
    SendStatus {
        /// Three status bytes following the counter
        status: HexBytes,

        /// How long to send
        #[arg(long, default_value = "5")]
        seconds: f64,
    },

    /// Send one raw frame and print the first answer
    Query {
        /// Frame payload
        data: HexBytes,
    },

    /// Compute a message checksum locally
    Crc {
        /// Body bytes after the checksum
        body: HexBytes,

        /// Message class whose CRC to use
        #[arg(long, value_enum, default_value = "status")]
        message: MessageKind,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum MessageKind {
    /// Status message (0x3FD)
    Status,
    /// Lever position message (0x197)
    Lever,
}

/// Hex byte string argument
#[derive(Debug, Clone)]
struct HexBytes(Vec<u8>);

impl FromStr for HexBytes {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex_bytes(s).map(Self).map_err(|e| e.to_string())
    }
}

fn parse_byte(s: &str) -> Result<u8, String> {
    let value = parse_can_id(s).map_err(|e| e.to_string())?;
    u8::try_from(value).map_err(|_| format!("{} does not fit in a byte", s))
}

fn init_logging(verbose: bool, log_file: Option<&PathBuf>) -> Result<()> {
    let console_filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let file_layer = match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file: {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_filter(LevelFilter::DEBUG),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .with(file_layer)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_file.as_ref())?;

    let config = config::load(cli.config.as_deref())?;
    let config = config::merge_with_args(config, cli.interface.as_deref());
    let ctx = OutputContext::new(cli.output, cli.no_color, cli.quiet);

    // Local computation, no bus needed
    if let Commands::Crc { body, message } = &cli.command {
        return commands::crc(&config, *message == MessageKind::Lever, &body.0, &ctx);
    }

    let connection = Connection::open(&config).context("Failed to open CAN connection")?;
    let result = run(&cli.command, &connection, &config, &ctx);

    if let Err(e) = connection.shutdown() {
        tracing::warn!(error = %e, "Failed to close connection");
    }
    result
}

fn run(
    command: &Commands,
    connection: &Connection,
    config: &gws_diag::ProbeConfig,
    ctx: &OutputContext,
) -> Result<()> {
    match command {
        Commands::Reset { broadcast } => commands::reset(connection, config, *broadcast, ctx),
        Commands::Dtcs { mask } => commands::dtcs(connection, *mask, ctx),
        Commands::SupportedDtcs => commands::supported_dtcs(connection, ctx),
        Commands::FindChecksum { body } => commands::find_checksum(connection, config, &body.0, ctx),
        Commands::VerifyChecksum { payload } => {
            commands::verify_checksum(connection, config, &payload.0, ctx)
        }
        Commands::ConfirmCrc { body } => commands::confirm_crc(connection, config, &body.0, ctx),
        Commands::FindCounters => commands::find_counters(connection, config, ctx),
        Commands::SearchChecksums { limit } => {
            commands::search_checksums(connection, config, *limit, ctx)
        }
        Commands::SendStatus { status, seconds } => {
            let Ok(status) = <[u8; 3]>::try_from(status.0.as_slice()) else {
                bail!("Status must be exactly 3 bytes, got {}", status.0.len());
            };
            commands::send_status(connection, config, status, *seconds, ctx)
        }
        Commands::Query { data } => commands::query(connection, config, &data.0, ctx),
        Commands::Crc { body, message } => {
            commands::crc(config, *message == MessageKind::Lever, &body.0, ctx)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_commands() {
        let cli = Cli::try_parse_from(["gws-probe", "-i", "vcan0", "find-checksum", "01020304"])
            .unwrap();
        assert_eq!(cli.interface.as_deref(), Some("vcan0"));
        match cli.command {
            Commands::FindChecksum { body } => assert_eq!(body.0, vec![1, 2, 3, 4]),
            _ => panic!("wrong command"),
        }

        let cli = Cli::try_parse_from(["gws-probe", "dtcs", "--mask", "0x0c"]).unwrap();
        assert!(matches!(cli.command, Commands::Dtcs { mask: Some(0x0C) }));

        let cli = Cli::try_parse_from(["gws-probe", "crc", "01 02", "--message", "lever"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Crc {
                message: MessageKind::Lever,
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_arguments_rejected() {
        assert!(Cli::try_parse_from(["gws-probe", "find-checksum", "zz"]).is_err());
        assert!(Cli::try_parse_from(["gws-probe", "dtcs", "--mask", "0x100"]).is_err());
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
