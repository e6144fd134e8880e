//! Mock bus adapter for testing

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};

use super::{Bus, BusError};
use crate::frame::{filters_accept, BusFilter, CanFrame};

type Responder = Box<dyn Fn(&CanFrame) -> Vec<CanFrame> + Send + Sync>;

#[derive(Default)]
struct Inbox {
    frames: VecDeque<CanFrame>,
}

/// In-memory bus that records transmitted frames
///
/// Incoming traffic is either injected directly or produced by a responder
/// that sees every transmitted frame (simulates an ECU answering raw
/// queries).
pub struct MockBus {
    sent: Mutex<Vec<CanFrame>>,
    inbox: Mutex<Inbox>,
    arrived: Condvar,
    filters: RwLock<Vec<BusFilter>>,
    responder: RwLock<Option<Responder>>,
    fail_sends: AtomicBool,
    send_attempts: AtomicUsize,
    closed: AtomicBool,
}

impl Default for MockBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBus {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            inbox: Mutex::new(Inbox::default()),
            arrived: Condvar::new(),
            filters: RwLock::new(Vec::new()),
            responder: RwLock::new(None),
            fail_sends: AtomicBool::new(false),
            send_attempts: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Queue a frame as if it had been received from the bus
    pub fn inject(&self, frame: CanFrame) {
        self.inbox.lock().frames.push_back(frame);
        self.arrived.notify_all();
    }

    /// Install a responder that is called for every successfully sent frame
    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&CanFrame) -> Vec<CanFrame> + Send + Sync + 'static,
    {
        *self.responder.write() = Some(Box::new(responder));
    }

    /// Make every subsequent send fail (the attempt is still counted)
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Frames that were sent successfully, oldest first
    pub fn sent_frames(&self) -> Vec<CanFrame> {
        self.sent.lock().clone()
    }

    /// Most recently sent frame with the given raw ID
    pub fn last_sent_to(&self, raw_id: u32) -> Option<CanFrame> {
        self.sent
            .lock()
            .iter()
            .rev()
            .find(|f| f.id().raw() == raw_id)
            .cloned()
    }

    /// Number of send attempts, including failed ones
    pub fn send_attempts(&self) -> usize {
        self.send_attempts.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn take_matching(&self, inbox: &mut Inbox) -> Option<CanFrame> {
        let filters = self.filters.read();
        while let Some(frame) = inbox.frames.pop_front() {
            if filters_accept(&filters, frame.id().raw()) {
                return Some(frame);
            }
            tracing::trace!(%frame, "Mock bus: frame dropped by filter");
        }
        None
    }
}

impl Bus for MockBus {
    fn send(&self, frame: &CanFrame) -> Result<(), BusError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }
        self.send_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(BusError::SendFailed("mock send failure".to_string()));
        }

        tracing::debug!(%frame, "Mock bus: sent frame");
        self.sent.lock().push(frame.clone());

        let replies = match self.responder.read().as_ref() {
            Some(responder) => responder(frame),
            None => Vec::new(),
        };
        for reply in replies {
            self.inject(reply);
        }
        Ok(())
    }

    fn recv(&self, timeout: Duration) -> Result<Option<CanFrame>, BusError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }

        let deadline = Instant::now() + timeout;
        let mut inbox = self.inbox.lock();
        loop {
            if let Some(frame) = self.take_matching(&mut inbox) {
                return Ok(Some(frame));
            }
            if self.arrived.wait_until(&mut inbox, deadline).timed_out() {
                return Ok(self.take_matching(&mut inbox));
            }
        }
    }

    fn filters(&self) -> Vec<BusFilter> {
        self.filters.read().clone()
    }

    fn set_filters(&self, filters: &[BusFilter]) -> Result<(), BusError> {
        *self.filters.write() = filters.to_vec();
        Ok(())
    }

    fn shutdown(&self) -> Result<(), BusError> {
        self.closed.store(true, Ordering::SeqCst);
        self.arrived.notify_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::CanId;

    #[test]
    fn test_recv_respects_filters() {
        let bus = MockBus::new();
        bus.set_filters(&[BusFilter::new(0x65E, 0x0FFF_FFFF)]).unwrap();
        bus.inject(CanFrame::received(CanId::Standard(0x3FD), &[1]).unwrap());
        bus.inject(CanFrame::received(CanId::Standard(0x65E), &[2]).unwrap());

        let frame = bus.recv(Duration::from_millis(10)).unwrap().unwrap();
        assert_eq!(frame.data(), &[2]);
        assert!(bus.recv(Duration::from_millis(10)).unwrap().is_none());
    }

    #[test]
    fn test_responder_feeds_inbox() {
        let bus = MockBus::new();
        bus.set_responder(|frame| {
            vec![CanFrame::received(CanId::Standard(0x7C9), frame.data()).unwrap()]
        });
        bus.send(&CanFrame::standard(0x7CA, &[0xAA]).unwrap()).unwrap();

        let reply = bus.recv(Duration::from_millis(10)).unwrap().unwrap();
        assert_eq!(reply.id(), CanId::Standard(0x7C9));
        assert_eq!(reply.data(), &[0xAA]);
    }

    #[test]
    fn test_failed_sends_are_counted() {
        let bus = MockBus::new();
        bus.set_fail_sends(true);
        assert!(bus.send(&CanFrame::standard(0x3FD, &[0]).unwrap()).is_err());
        assert_eq!(bus.send_attempts(), 1);
        assert!(bus.sent_frames().is_empty());
    }
}
