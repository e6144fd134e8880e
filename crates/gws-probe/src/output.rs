//! Output formatting for gws-probe (table, json)

use clap::ValueEnum;
use colored::Colorize;
use gws_diag::uds::dtc::status_flags;
use gws_diag::uds::{NegativeResponseCode, UdsResponse};
use gws_diag::{DtcReading, DtcTable};
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Context for output rendering
pub struct OutputContext {
    pub format: OutputFormat,
    pub quiet: bool,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format, quiet }
    }

    /// Print a success message (unless in quiet mode)
    pub fn success(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg.green());
        }
    }

    /// Print an info message (unless in quiet mode)
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg);
        }
    }

    pub fn warn(&self, msg: &str) {
        eprintln!("{}", msg.yellow());
    }

    pub fn error(&self, msg: &str) {
        eprintln!("{}", msg.red());
    }

    /// Print rows in the configured format
    pub fn print<T: Tabled + Serialize>(&self, data: &[T]) {
        match self.format {
            OutputFormat::Table => {
                if data.is_empty() {
                    if !self.quiet {
                        println!("No data");
                    }
                } else {
                    println!("{}", Table::new(data));
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(data).unwrap_or_else(|_| "[]".to_string())
                );
            }
        }
    }

    /// Print key-value pairs
    pub fn print_kv(&self, pairs: &[(&str, String)]) {
        match self.format {
            OutputFormat::Table => {
                for (key, value) in pairs {
                    println!("{}: {}", key.bold(), value);
                }
            }
            OutputFormat::Json => {
                let map: std::collections::BTreeMap<&str, &str> =
                    pairs.iter().map(|(k, v)| (*k, v.as_str())).collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&map).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
    }
}

/// Space-separated hex, e.g. `59 02 ff`
pub fn hex_bytes(data: &[u8]) -> String {
    data.chunks(1).map(hex::encode).collect::<Vec<_>>().join(" ")
}

/// One-line description of a raw diagnostic answer
pub fn describe_response(request_sid: u8, response: &[u8]) -> String {
    match UdsResponse::classify(request_sid, response) {
        UdsResponse::Positive { data, .. } => format!("positive ({})", hex_bytes(data)),
        UdsResponse::Negative { nrc, .. } => describe_nrc(nrc),
        UdsResponse::Unrecognized(raw) => format!("unrecognized ({})", hex_bytes(raw)),
    }
}

fn describe_nrc(nrc: NegativeResponseCode) -> String {
    format!("negative: {} (0x{:02x})", nrc, u8::from(nrc))
}

// =============================================================================
// Display types for various commands
// =============================================================================

/// DTC display for dtcs / supported-dtcs
#[derive(Debug, Tabled, Serialize)]
pub struct DtcRow {
    #[tabled(rename = "DTC")]
    pub dtc: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Flags")]
    pub flags: String,
}

impl DtcRow {
    pub fn from_table(table: &DtcTable) -> Vec<Self> {
        table
            .records()
            .iter()
            .map(|record| Self {
                dtc: record.id.to_string(),
                status: format!("0x{:02x}", record.status),
                flags: status_flags(record.status).join(", "),
            })
            .collect()
    }
}

/// Frame display for reset --broadcast
#[derive(Debug, Tabled, Serialize)]
pub struct FrameRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Data")]
    pub data: String,
}

/// Counter hypothesis display for find-counters
#[derive(Debug, Tabled, Serialize)]
pub struct CounterRow {
    #[tabled(rename = "Byte")]
    pub byte: usize,
    #[tabled(rename = "Mask")]
    pub mask: String,
    #[tabled(rename = "DTC status")]
    pub reading: String,
}

/// Observation display for search-checksums
#[derive(Debug, Tabled, Serialize)]
pub struct ObservationRow {
    #[tabled(rename = "Payload")]
    pub payload: String,
    #[tabled(rename = "DTC status")]
    pub reading: String,
}

/// Colored rendering of an oracle reading
pub fn reading_label(reading: &DtcReading, healthy: u8) -> String {
    match reading {
        DtcReading::Status(status) if *status == healthy => reading.to_string(),
        DtcReading::Status(_) => reading.to_string().green().to_string(),
        DtcReading::Missing | DtcReading::NoResponse => reading.to_string().yellow().to_string(),
    }
}
