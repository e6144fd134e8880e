//! Periodic status message transmission
//!
//! Plays the part of the vehicle: sends a correctly checksummed and counted
//! status message plus the dimming message at a fixed rate, then reads which
//! DTCs the gear selector is left with.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::{MessageClass, StreamConfig};
use crate::connection::Connection;
use crate::crc::{ChecksumFunction, Crc8};
use crate::error::DiagResult;
use crate::frame::CanFrame;
use crate::oracle::DtcOracle;
use crate::uds::DtcTable;

/// Counter value after `counter`; values with a low nibble of 0xF are invalid
pub fn next_counter(counter: u8) -> u8 {
    let next = counter.wrapping_add(1);
    if next & 0x0F == 0x0F {
        next.wrapping_add(1)
    } else {
        next
    }
}

/// Result of a streaming run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamReport {
    /// Status messages transmitted
    pub messages_sent: usize,
    pub elapsed: Duration,
    /// Active DTCs afterwards (`None` if the ECU did not answer)
    pub dtcs: Option<DtcTable>,
}

impl StreamReport {
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.messages_sent as f64 / secs
        } else {
            0.0
        }
    }
}

/// Sends the status message class on a connection's bus
pub struct StatusStreamer<'a> {
    connection: &'a Connection,
    message: MessageClass,
    config: StreamConfig,
    crc: Crc8,
}

impl<'a> StatusStreamer<'a> {
    pub fn new(connection: &'a Connection, message: MessageClass, config: StreamConfig) -> Self {
        Self {
            connection,
            message,
            config,
            crc: Crc8::new(message.crc),
        }
    }

    /// `[crc, counter, status...]`
    pub fn status_payload(&self, counter: u8, status: [u8; 3]) -> Vec<u8> {
        self.crc.prefixed(&[counter, status[0], status[1], status[2]])
    }

    /// Stream `status` for `duration`, then read the active DTCs
    pub fn send_status(&self, status: [u8; 3], duration: Duration) -> DiagResult<StreamReport> {
        let bus = self.connection.bus();
        let dimming = CanFrame::standard(self.config.dimming_id, &[self.config.brightness, 0x00])?;

        let start = Instant::now();
        let mut counter = 0u8;
        let mut messages_sent = 0;

        while start.elapsed() < duration {
            let frame = CanFrame::standard(self.message.id, &self.status_payload(counter, status))?;
            debug!(%frame, "Status message");
            bus.send(&frame)?;
            bus.send(&dimming)?;
            messages_sent += 1;

            thread::sleep(self.config.interval());
            counter = next_counter(counter);
        }

        let elapsed = start.elapsed();
        info!(
            messages_sent,
            elapsed_ms = elapsed.as_millis() as u64,
            "Status stream finished"
        );

        let dtcs = DtcOracle::new(self.connection).read_default_active_dtcs()?;
        Ok(StreamReport {
            messages_sent,
            elapsed,
            dtcs,
        })
    }
}
