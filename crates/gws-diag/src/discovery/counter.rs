//! Counter field discovery
//!
//! A rolling counter somewhere in the status message body is supervised by
//! its own DTC. Each hypothesis cycles a masked field through every value
//! four times with otherwise constant, correctly checksummed messages.

use tracing::{debug, info};

use super::Discovery;
use crate::error::DiagResult;
use crate::oracle::{DtcReading, StatusOracle};
use crate::probe::Probe;

/// `(mask, shift)` of each field shape tried at every byte position
pub const COUNTER_HYPOTHESES: [(u8, u8); 3] = [(0xFF, 0), (0x0F, 4), (0x0F, 0)];

/// Body bytes that may hold the counter
const COUNTER_BYTES: usize = 4;

/// Times each counter sequence is repeated
const COUNTER_CYCLES: usize = 4;

/// A hypothesis after which the counter DTC did not read healthy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterField {
    /// Position in the body (0 = first byte after the checksum)
    pub byte: usize,
    /// Bits of that byte the counter was written to
    pub mask: u8,
    pub reading: DtcReading,
}

impl<O: StatusOracle, P: Probe> Discovery<O, P> {
    /// Run every counter hypothesis and report the ones that disturbed the
    /// counter DTC
    ///
    /// A hypothesis is reported when the DTC reads anything other than the
    /// healthy status afterwards.
    pub fn find_counter_fields(&self) -> DiagResult<Vec<CounterField>> {
        let healthy = DtcReading::Status(self.dtcs.healthy_status);
        let mut fields = Vec::new();

        for byte in 0..COUNTER_BYTES {
            for (mask, shift) in COUNTER_HYPOTHESES {
                for _ in 0..COUNTER_CYCLES {
                    for counter in 0..=mask {
                        let mut body = [0xFF; COUNTER_BYTES];
                        body[byte] = counter << shift;
                        let payload = self.checksum.prefixed(&body);
                        self.probe.send_once(self.message.id, &payload)?;
                    }
                }
                self.probe.settle();

                let reading = self.oracle.dtc_status(&self.dtcs.counter_dtc)?;
                debug!(byte, mask = format!("0x{:02X}", mask << shift), %reading, "Counter hypothesis");

                if reading != healthy {
                    info!(
                        byte,
                        mask = format!("0x{:02X}", mask << shift),
                        %reading,
                        "Counter DTC changed"
                    );
                    fields.push(CounterField {
                        byte,
                        mask: mask << shift,
                        reading,
                    });
                }
            }
        }

        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProbeConfig;
    use crate::crc::{ChecksumFunction, Crc8, CrcParams};
    use crate::discovery::testing::SimulatedEcu;
    use pretty_assertions::assert_eq;

    /// ECU whose counter lives in the low nibble of body byte 0
    fn low_nibble_counter_ecu() -> SimulatedEcu {
        SimulatedEcu::new(|_, pending| {
            let crc = Crc8::new(CrcParams::MSG_3FD);
            assert!(pending.iter().all(|p| crc.calc(&p[1..]) == p[0]));

            let nibbles: Vec<u8> = pending.iter().map(|p| p[1] & 0x0F).collect();
            let counting = nibbles.windows(2).any(|w| w[0] != w[1]);
            if counting {
                DtcReading::Status(0x2C)
            } else {
                DtcReading::Status(0x2F)
            }
        })
    }

    #[test]
    fn test_reports_hypotheses_that_move_the_counter() {
        let ecu = low_nibble_counter_ecu();
        let discovery = Discovery::new(&ecu, &ecu, &ProbeConfig::default());

        let fields = discovery.find_counter_fields().unwrap();
        assert_eq!(
            fields,
            vec![
                CounterField {
                    byte: 0,
                    mask: 0xFF,
                    reading: DtcReading::Status(0x2C)
                },
                CounterField {
                    byte: 0,
                    mask: 0x0F,
                    reading: DtcReading::Status(0x2C)
                },
            ]
        );
    }

    #[test]
    fn test_hypothesis_frame_sequence() {
        let ecu = SimulatedEcu::new(|_, _| DtcReading::Status(0x2F));
        let discovery = Discovery::new(&ecu, &ecu, &ProbeConfig::default());

        assert!(discovery.find_counter_fields().unwrap().is_empty());

        let per_byte = 4 * (256 + 16 + 16);
        let sent = ecu.sent.borrow();
        assert_eq!(sent.len(), COUNTER_BYTES * per_byte);
        assert_eq!(*ecu.reads.borrow(), COUNTER_BYTES * COUNTER_HYPOTHESES.len());
        assert_eq!(*ecu.settles.borrow(), COUNTER_BYTES * COUNTER_HYPOTHESES.len());

        // Byte 1, high nibble hypothesis, second cycle, counter 3
        let (id, payload) = &sent[per_byte + 4 * 256 + 16 + 3];
        assert_eq!(*id, 0x3FD);
        assert_eq!(&payload[1..], &[0xFF, 0x30, 0xFF, 0xFF]);
        assert_eq!(payload[0], Crc8::new(CrcParams::MSG_3FD).calc(&payload[1..]));
    }

    #[test]
    fn test_missing_dtc_is_reported() {
        let ecu = SimulatedEcu::new(|_, _| DtcReading::Missing);
        let discovery = Discovery::new(&ecu, &ecu, &ProbeConfig::default());

        let fields = discovery.find_counter_fields().unwrap();
        assert_eq!(fields.len(), COUNTER_BYTES * COUNTER_HYPOTHESES.len());
        assert!(fields.iter().all(|f| f.reading == DtcReading::Missing));
        assert_eq!(fields[1].mask, 0xF0);
    }
}
