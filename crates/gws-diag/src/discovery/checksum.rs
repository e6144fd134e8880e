//! Checksum discovery
//!
//! The checksum supervision DTC drops from "active" (0x2f) to 0x2e right
//! after a burst whose first byte is the correct checksum of the rest.

use std::ops::ControlFlow;

use tracing::{debug, info, warn};

use super::Discovery;
use crate::error::{DiagError, DiagResult};
use crate::oracle::{DtcReading, StatusOracle};
use crate::probe::Probe;

/// Body length of the status message
const STATUS_BODY_LEN: usize = 4;

/// A junk payload the checksum DTC reacted to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumObservation {
    pub payload: Vec<u8>,
    pub reading: DtcReading,
}

impl<O: StatusOracle, P: Probe> Discovery<O, P> {
    /// Burst `payload` and report whether the ECU accepted its checksum
    pub fn verify_checksum(&self, payload: &[u8]) -> DiagResult<bool> {
        self.probe.burst(self.message.id, payload)?;
        let reading = self.oracle.dtc_status(&self.dtcs.checksum_dtc)?;
        let accepted = reading == DtcReading::Status(self.dtcs.checksum_valid_status);
        debug!(
            payload = %hex::encode(payload),
            %reading,
            accepted,
            "Checksum verified"
        );
        Ok(accepted)
    }

    /// Try every checksum byte for `body`, lowest first
    ///
    /// Returns the first value the ECU accepts, or
    /// [`DiagError::NoValidChecksumFound`] after all 256 were rejected.
    pub fn find_checksum(&self, body: &[u8]) -> DiagResult<u8> {
        if body.len() != STATUS_BODY_LEN {
            warn!(
                len = body.len(),
                expected = STATUS_BODY_LEN,
                "Unexpected status message body length"
            );
        }

        let mut payload = Vec::with_capacity(body.len() + 1);
        for candidate in 0..=u8::MAX {
            payload.clear();
            payload.push(candidate);
            payload.extend_from_slice(body);

            if self.verify_checksum(&payload)? {
                info!(
                    body = %hex::encode(body),
                    checksum = format!("0x{:02X}", candidate),
                    "Checksum found"
                );
                return Ok(candidate);
            }
        }

        Err(DiagError::NoValidChecksumFound {
            body: hex::encode(body),
        })
    }

    /// Check the configured checksum function against the ECU
    pub fn confirm_working_checksum(&self, body: &[u8]) -> DiagResult<bool> {
        let payload = self.checksum.prefixed(body);
        self.verify_checksum(&payload)
    }

    /// Sweep single-byte variations of constant payloads
    ///
    /// For every base byte and every position, each byte value is burst in
    /// turn; whenever the checksum DTC reads anything but healthy the
    /// observer is told. Returns the number of payloads probed.
    pub fn search_valid_checksums<F>(&self, mut observer: F) -> DiagResult<usize>
    where
        F: FnMut(&ChecksumObservation) -> ControlFlow<()>,
    {
        let healthy = DtcReading::Status(self.dtcs.healthy_status);
        let mut probed = 0;

        for base in 0..u8::MAX {
            info!(base = format!("0x{:02X}", base), "Checksum sweep base");
            for offset in 0..8 {
                debug!(offset, "Checksum sweep offset");
                for byte in 0..u8::MAX {
                    let mut payload = [base; 8];
                    payload[offset] = byte;

                    self.probe.burst(self.message.id, &payload)?;
                    probed += 1;

                    let reading = self.oracle.dtc_status(&self.dtcs.checksum_dtc)?;
                    if reading != healthy {
                        let observation = ChecksumObservation {
                            payload: payload.to_vec(),
                            reading,
                        };
                        info!(payload = %hex::encode(payload), %reading, "Checksum DTC changed");
                        if observer(&observation).is_break() {
                            return Ok(probed);
                        }
                    }
                }
            }
        }

        Ok(probed)
    }
}
