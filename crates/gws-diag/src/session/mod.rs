//! Synchronous request/response diagnostic sessions
//!
//! A [`DiagnosticSession`] is obtained from a
//! [`Connection`](crate::connection::Connection). While it lives, a pump
//! thread drives a fresh transport stack and the bus only delivers the ECU's
//! response ID. Dropping it stops the pump, restores the previous bus filters
//! and frees the connection for the next session.

mod pump;

pub use pump::{SharedStack, TransportPump};

use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::connection::BusLease;
use crate::error::DiagResult;
use crate::transport::TransportStack;

/// Scoped diagnostic session
pub struct DiagnosticSession {
    pump: TransportPump,
    poll_interval: Duration,
    // Dropped after the pump has been stopped
    _lease: BusLease,
}

impl DiagnosticSession {
    pub(crate) fn start(
        stack: Box<dyn TransportStack>,
        lease: BusLease,
        poll_interval: Duration,
    ) -> DiagResult<Self> {
        let mut pump = TransportPump::new(stack);
        pump.start()?;
        Ok(Self {
            pump,
            poll_interval,
            _lease: lease,
        })
    }

    /// Send `payload` and wait up to `timeout` for the answer
    ///
    /// Returns `Ok(None)` when nothing arrives in time. Transport faults seen
    /// by the pump only show up as a missing answer; a failed submit is an
    /// error.
    pub fn request(&mut self, payload: &[u8], timeout: Duration) -> DiagResult<Option<Vec<u8>>> {
        {
            let mut stack = self.pump.stack().lock();
            while let Some(stale) = stack.recv() {
                debug!(stale = %hex::encode(&stale), "Discarding unsolicited PDU");
            }
            stack.send(payload)?;
        }
        debug!(request = %hex::encode(payload), timeout_ms = timeout.as_millis() as u64, "Request sent");

        let start = Instant::now();
        loop {
            {
                let mut stack = self.pump.stack().lock();
                if stack.available() {
                    let response = stack.recv();
                    if let Some(ref data) = response {
                        debug!(
                            response = %hex::encode(data),
                            elapsed_ms = start.elapsed().as_millis() as u64,
                            "Response received"
                        );
                    }
                    return Ok(response);
                }
            }

            if start.elapsed() >= timeout {
                debug!(request = %hex::encode(payload), "Request timed out");
                return Ok(None);
            }

            trace!("Waiting for response");
            std::thread::sleep(self.poll_interval);
        }
    }
}

impl Drop for DiagnosticSession {
    fn drop(&mut self) {
        self.pump.stop();
    }
}
