//! Probe configuration
//!
//! Every arbitration ID, address, timing window and DTC the tool relies on
//! lives here so other vehicles or ECU variants only need a different TOML
//! file. All fields have defaults matching the gear selector (GWS).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crc::CrcParams;
use crate::error::DiagError;
use crate::uds::dtc::DtcId;

/// Complete probe configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Bus selection
    #[serde(default)]
    pub bus: BusConfig,

    /// Diagnostic (UDS) addressing and timing
    #[serde(default)]
    pub diagnostic: DiagnosticConfig,

    /// ISO-TP protocol parameters
    #[serde(default)]
    pub isotp: IsoTpConfig,

    /// Broadcast burst timing
    #[serde(default)]
    pub probe: ProbeTiming,

    /// DTCs and status codes used as acceptance signal
    #[serde(default)]
    pub oracle: OracleConfig,

    /// Proprietary broadcast message classes
    #[serde(default)]
    pub messages: MessageConfig,

    /// Status streaming
    #[serde(default)]
    pub stream: StreamConfig,

    /// Raw (non ISO-TP) helpers
    #[serde(default)]
    pub raw: RawConfig,
}

impl ProbeConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DiagError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| DiagError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, DiagError> {
        toml::from_str(content).map_err(|e| DiagError::Config(e.to_string()))
    }

    /// Serialize configuration to TOML text
    pub fn to_toml(&self) -> Result<String, DiagError> {
        toml::to_string_pretty(self).map_err(|e| DiagError::Config(e.to_string()))
    }
}

// =============================================================================
// Bus Configuration
// =============================================================================

/// Bus configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BusConfig {
    /// SocketCAN raw socket + kernel ISO-TP (Linux only)
    SocketCan {
        #[serde(default = "default_interface")]
        interface: String,
    },
    /// In-memory bus with a simulated ECU
    Mock,
}

fn default_interface() -> String {
    "can0".to_string()
}

impl Default for BusConfig {
    fn default() -> Self {
        Self::SocketCan {
            interface: default_interface(),
        }
    }
}

// =============================================================================
// Diagnostic Configuration
// =============================================================================

/// UDS addressing and request timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticConfig {
    /// ECU address (GWS = 0x5E)
    #[serde(default = "default_target_address")]
    pub target_address: u8,
    /// Tester address
    #[serde(default = "default_source_address")]
    pub source_address: u8,
    /// Base CAN ID; request/response IDs are `base | address`
    #[serde(default = "default_base_id")]
    pub base_id: u32,
    /// How long a request waits for its response
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
    /// Interval between "response available" checks
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Attempts for reading active DTCs
    #[serde(default = "default_dtc_read_attempts")]
    pub dtc_read_attempts: u32,
    /// Status mask for reading active DTCs
    #[serde(default = "default_active_status_mask")]
    pub active_status_mask: u8,
}

fn default_target_address() -> u8 {
    0x5E
}

fn default_source_address() -> u8 {
    0xF1
}

fn default_base_id() -> u32 {
    0x600
}

fn default_response_timeout_ms() -> u64 {
    500
}

fn default_poll_interval_ms() -> u64 {
    50
}

fn default_dtc_read_attempts() -> u32 {
    3
}

fn default_active_status_mask() -> u8 {
    // 0x0C reports the DTCs the GWS considers active
    0x0C
}

impl Default for DiagnosticConfig {
    fn default() -> Self {
        Self {
            target_address: default_target_address(),
            source_address: default_source_address(),
            base_id: default_base_id(),
            response_timeout_ms: default_response_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            dtc_read_attempts: default_dtc_read_attempts(),
            active_status_mask: default_active_status_mask(),
        }
    }
}

impl DiagnosticConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// =============================================================================
// ISO-TP Configuration
// =============================================================================

/// ISO-TP protocol parameters handed to the transport stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsoTpConfig {
    /// Separation time requested from the ECU (ms, or 0xF1-0xF9 for 100-900us)
    #[serde(default = "default_stmin")]
    pub stmin: u8,
    /// Consecutive frames before the next flow control (0 = unlimited)
    #[serde(default)]
    pub block_size: u8,
    /// Wait frames tolerated before failing
    #[serde(default)]
    pub wftmax: u8,
    /// CAN payload length
    #[serde(default = "default_ll_data_length")]
    pub ll_data_length: u8,
    /// Padding byte for transmitted frames (`None` disables padding)
    #[serde(default = "default_tx_padding")]
    pub tx_padding: Option<u8>,
    /// Flow control wait limit
    #[serde(default = "default_rx_flowcontrol_timeout_ms")]
    pub rx_flowcontrol_timeout_ms: u64,
    /// Consecutive frame wait limit
    #[serde(default = "default_rx_consecutive_frame_timeout_ms")]
    pub rx_consecutive_frame_timeout_ms: u64,
    /// Ignore the separation time the ECU asks for and send as fast as possible
    #[serde(default)]
    pub squash_stmin_requirement: bool,
}

fn default_stmin() -> u8 {
    1
}

fn default_ll_data_length() -> u8 {
    8
}

fn default_tx_padding() -> Option<u8> {
    Some(0x00)
}

fn default_rx_flowcontrol_timeout_ms() -> u64 {
    500
}

fn default_rx_consecutive_frame_timeout_ms() -> u64 {
    1000
}

impl Default for IsoTpConfig {
    fn default() -> Self {
        Self {
            stmin: default_stmin(),
            block_size: 0,
            wftmax: 0,
            ll_data_length: default_ll_data_length(),
            tx_padding: default_tx_padding(),
            rx_flowcontrol_timeout_ms: default_rx_flowcontrol_timeout_ms(),
            rx_consecutive_frame_timeout_ms: default_rx_consecutive_frame_timeout_ms(),
            squash_stmin_requirement: false,
        }
    }
}

// =============================================================================
// Probe Timing
// =============================================================================

/// Broadcast burst pacing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeTiming {
    /// Gap after each transmitted frame
    #[serde(default = "default_burst_spacing_ms")]
    pub burst_spacing_ms: u64,
    /// Wait after a burst before the ECU's DTC status is trusted
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

fn default_burst_spacing_ms() -> u64 {
    10
}

fn default_settle_ms() -> u64 {
    100
}

impl Default for ProbeTiming {
    fn default() -> Self {
        Self {
            burst_spacing_ms: default_burst_spacing_ms(),
            settle_ms: default_settle_ms(),
        }
    }
}

impl ProbeTiming {
    /// No delays at all (simulations and tests)
    pub fn immediate() -> Self {
        Self {
            burst_spacing_ms: 0,
            settle_ms: 0,
        }
    }

    pub fn burst_spacing(&self) -> Duration {
        Duration::from_millis(self.burst_spacing_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

// =============================================================================
// Oracle Configuration
// =============================================================================

/// DTCs watched by the discovery algorithms and their meaningful status codes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleConfig {
    /// DTC raised when the status message checksum is wrong
    #[serde(default = "default_checksum_dtc")]
    pub checksum_dtc: DtcId,
    /// DTC raised when the status message counter is out of sequence
    #[serde(default = "default_counter_dtc")]
    pub counter_dtc: DtcId,
    /// Status of a supervision DTC that is active and current
    #[serde(default = "default_healthy_status")]
    pub healthy_status: u8,
    /// Status of the checksum DTC right after a correctly checksummed burst
    #[serde(default = "default_checksum_valid_status")]
    pub checksum_valid_status: u8,
}

fn default_checksum_dtc() -> DtcId {
    DtcId::new([0xE0, 0x94, 0x04])
}

fn default_counter_dtc() -> DtcId {
    DtcId::new([0xE0, 0x94, 0x02])
}

fn default_healthy_status() -> u8 {
    0x2F
}

fn default_checksum_valid_status() -> u8 {
    0x2E
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            checksum_dtc: default_checksum_dtc(),
            counter_dtc: default_counter_dtc(),
            healthy_status: default_healthy_status(),
            checksum_valid_status: default_checksum_valid_status(),
        }
    }
}

// =============================================================================
// Message Classes
// =============================================================================

/// One proprietary broadcast message: where it is sent and how it is checksummed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageClass {
    /// 11-bit arbitration ID
    pub id: u16,
    /// CRC8 parameters of the first payload byte
    pub crc: CrcParams,
}

/// Known message classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageConfig {
    /// Status message sent to the gear selector
    #[serde(default = "default_status_message")]
    pub status: MessageClass,
    /// Lever position message sent by the gear selector
    #[serde(default = "default_lever_message")]
    pub lever: MessageClass,
}

fn default_status_message() -> MessageClass {
    MessageClass {
        id: 0x3FD,
        crc: CrcParams::MSG_3FD,
    }
}

fn default_lever_message() -> MessageClass {
    MessageClass {
        id: 0x197,
        crc: CrcParams::MSG_197,
    }
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            status: default_status_message(),
            lever: default_lever_message(),
        }
    }
}

// =============================================================================
// Status Stream
// =============================================================================

/// Periodic status transmission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Gap between status messages
    #[serde(default = "default_stream_interval_ms")]
    pub interval_ms: u64,
    /// Dimming message ID sent alongside each status message
    #[serde(default = "default_dimming_id")]
    pub dimming_id: u16,
    /// Backlight brightness carried by the dimming message
    #[serde(default = "default_brightness")]
    pub brightness: u8,
}

fn default_stream_interval_ms() -> u64 {
    100
}

fn default_dimming_id() -> u16 {
    0x202
}

fn default_brightness() -> u8 {
    0x40
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_stream_interval_ms(),
            dimming_id: default_dimming_id(),
            brightness: default_brightness(),
        }
    }
}

impl StreamConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

// =============================================================================
// Raw Helpers
// =============================================================================

/// IDs used by the raw single-frame helpers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawConfig {
    /// Tester broadcast ID; destination is the first data byte
    #[serde(default = "default_broadcast_id")]
    pub broadcast_id: u16,
    /// How long to collect answers to a broadcast reset
    #[serde(default = "default_broadcast_listen_ms")]
    pub broadcast_listen_ms: u64,
    /// Raw query request ID
    #[serde(default = "default_query_tx_id")]
    pub query_tx_id: u16,
    /// Raw query response ID
    #[serde(default = "default_query_rx_id")]
    pub query_rx_id: u16,
    /// How long a raw query waits for its answer
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

fn default_broadcast_id() -> u16 {
    0x6F1
}

fn default_broadcast_listen_ms() -> u64 {
    1000
}

fn default_query_tx_id() -> u16 {
    0x7CA
}

fn default_query_rx_id() -> u16 {
    0x7C9
}

fn default_query_timeout_ms() -> u64 {
    200
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            broadcast_id: default_broadcast_id(),
            broadcast_listen_ms: default_broadcast_listen_ms(),
            query_tx_id: default_query_tx_id(),
            query_rx_id: default_query_rx_id(),
            query_timeout_ms: default_query_timeout_ms(),
        }
    }
}

// =============================================================================
// Parsing helpers
// =============================================================================

/// Parse a CAN ID from string (hex with 0x prefix, or decimal)
pub fn parse_can_id(s: &str) -> Result<u32, DiagError> {
    let s = s.trim();
    let (digits, radix) = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => (hex, 16),
        None => (s, 10),
    };

    u32::from_str_radix(digits, radix)
        .map_err(|e| DiagError::Config(format!("Invalid CAN ID '{}': {}", s, e)))
}

/// Parse a byte string such as `01020304`, `0x01020304` or `01 02 03 04`
pub fn parse_hex_bytes(s: &str) -> Result<Vec<u8>, DiagError> {
    let s = s.trim();
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    let compact: String = s
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != ',')
        .collect();

    hex::decode(&compact).map_err(|e| DiagError::Config(format!("Invalid hex '{}': {}", s, e)))
}
