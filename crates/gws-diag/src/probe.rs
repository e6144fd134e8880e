//! Broadcast probe
//!
//! Injects candidate frames onto the bus. A single frame is not enough for
//! the ECU's supervision to settle, so candidates are sent as a burst
//! followed by a quiet period before the oracle is asked.

use std::sync::Arc;
use std::thread;

use tracing::{debug, warn};

use crate::bus::Bus;
use crate::config::ProbeTiming;
use crate::error::DiagResult;
use crate::frame::CanFrame;

/// Frames per burst
pub const BURST_LENGTH: usize = 16;

/// Frame injection seam used by the discovery algorithms
pub trait Probe {
    /// Send `payload` on `id` [`BURST_LENGTH`] times, then settle.
    /// Returns how many sends succeeded.
    fn burst(&self, id: u16, payload: &[u8]) -> DiagResult<usize>;

    /// Send one frame followed by the burst spacing
    fn send_once(&self, id: u16, payload: &[u8]) -> DiagResult<bool>;

    /// Wait for the ECU to evaluate what was sent
    fn settle(&self);
}

impl<T: Probe + ?Sized> Probe for &T {
    fn burst(&self, id: u16, payload: &[u8]) -> DiagResult<usize> {
        (**self).burst(id, payload)
    }

    fn send_once(&self, id: u16, payload: &[u8]) -> DiagResult<bool> {
        (**self).send_once(id, payload)
    }

    fn settle(&self) {
        (**self).settle()
    }
}

/// [`Probe`] that writes raw frames to a [`Bus`]
pub struct BroadcastProbe {
    bus: Arc<dyn Bus>,
    timing: ProbeTiming,
}

impl BroadcastProbe {
    pub fn new(bus: Arc<dyn Bus>, timing: ProbeTiming) -> Self {
        Self { bus, timing }
    }

    fn transmit(&self, frame: &CanFrame) -> bool {
        match self.bus.send(frame) {
            Ok(()) => true,
            Err(e) => {
                warn!(%frame, error = %e, "Probe frame not sent");
                false
            }
        }
    }

    fn pause(&self) {
        let spacing = self.timing.burst_spacing();
        if !spacing.is_zero() {
            thread::sleep(spacing);
        }
    }
}

impl Probe for BroadcastProbe {
    fn burst(&self, id: u16, payload: &[u8]) -> DiagResult<usize> {
        let frame = CanFrame::standard(id, payload)?;

        let mut sent = 0;
        for _ in 0..BURST_LENGTH {
            if self.transmit(&frame) {
                sent += 1;
            }
            self.pause();
        }
        debug!(%frame, sent, "Burst sent");

        self.settle();
        Ok(sent)
    }

    fn send_once(&self, id: u16, payload: &[u8]) -> DiagResult<bool> {
        let frame = CanFrame::standard(id, payload)?;
        let sent = self.transmit(&frame);
        self.pause();
        Ok(sent)
    }

    fn settle(&self) {
        let settle = self.timing.settle();
        if !settle.is_zero() {
            thread::sleep(settle);
        }
    }
}
