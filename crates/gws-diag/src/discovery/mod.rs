//! Oracle-driven discovery of the status message format
//!
//! Every algorithm follows the same loop: build a hypothesis, inject it with
//! the [`Probe`], let the ECU settle, then ask the [`StatusOracle`] whether
//! the supervision DTC changed. The oracle read after the settle period is
//! taken as authoritative; bursts are never repeated.

mod checksum;
mod counter;

pub use checksum::ChecksumObservation;
pub use counter::{CounterField, COUNTER_HYPOTHESES};

use crate::config::{MessageClass, OracleConfig, ProbeConfig};
use crate::crc::{ChecksumFunction, Crc8};
use crate::oracle::StatusOracle;
use crate::probe::Probe;

/// Discovery algorithms bound to one oracle and one probe
pub struct Discovery<O, P> {
    oracle: O,
    probe: P,
    message: MessageClass,
    dtcs: OracleConfig,
    checksum: Box<dyn ChecksumFunction>,
}

impl<O: StatusOracle, P: Probe> Discovery<O, P> {
    /// Probe the status message class with its configured CRC
    pub fn new(oracle: O, probe: P, config: &ProbeConfig) -> Self {
        let message = config.messages.status;
        Self {
            oracle,
            probe,
            message,
            dtcs: config.oracle.clone(),
            checksum: Box::new(Crc8::new(message.crc)),
        }
    }

    /// Replace the checksum used to build payloads
    pub fn with_checksum(mut self, checksum: Box<dyn ChecksumFunction>) -> Self {
        self.checksum = checksum;
        self
    }
}
