//! gws-diag - CAN/UDS diagnostics and protocol discovery for a gear selector
//!
//! This crate drives a gear selector ECU over raw CAN and ISO-TP. The ECU
//! never acknowledges the broadcast messages it supervises; it only reports
//! their validity through DTC status bytes. The discovery algorithms use
//! that as an oracle to recover message checksums and counters.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Discovery                             │
//! │  find_checksum / find_counter_fields / search sweep         │
//! │                                                             │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐ │
//! │  │BroadcastProbe│ │ DtcOracle   │  │ ChecksumFunction    │ │
//! │  │ (16x burst) │  │ (0x19 read) │  │ (CRC8 variants)     │ │
//! │  └──────┬──────┘  └──────┬──────┘  └─────────────────────┘ │
//! │         │                │                                  │
//! │         │         ┌──────┴────────────┐                     │
//! │         │         │DiagnosticSession  │                     │
//! │         │         │ + TransportPump   │                     │
//! │         │         └──────┬────────────┘                     │
//! │         │                │                                  │
//! │  ┌──────┴────────────────┴──────────┐                       │
//! │  │ Connection (bus lease, filters)  │                       │
//! │  │ Bus (SocketCAN/mock) + ISO-TP    │                       │
//! │  └──────────────────────────────────┘                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod bus;
pub mod config;
pub mod connection;
pub mod crc;
pub mod discovery;
pub mod error;
pub mod frame;
pub mod oracle;
pub mod probe;
pub mod raw;
pub mod session;
pub mod stream;
pub mod transport;
pub mod uds;

pub use bus::{create_bus, Bus, BusError};
pub use config::{parse_can_id, parse_hex_bytes, ProbeConfig};
pub use connection::Connection;
pub use crc::{ChecksumFunction, Crc8, CrcParams};
pub use discovery::{ChecksumObservation, CounterField, Discovery};
pub use error::{DiagError, DiagResult};
pub use frame::{BusFilter, CanFrame, CanId};
pub use oracle::{DtcOracle, DtcReading, StatusOracle};
pub use probe::{BroadcastProbe, Probe};
pub use session::DiagnosticSession;
pub use stream::{StatusStreamer, StreamReport};
pub use transport::{create_stack_factory, StackFactory, TransportError, TransportStack};
pub use uds::{decode_dtc_table, DtcId, DtcRecord, DtcTable, NegativeResponseCode, UdsResponse};
