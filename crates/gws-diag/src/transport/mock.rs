//! Mock ISO-TP stack for testing

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{ErrorHandler, IsoTpAddress, StackFactory, TransportError, TransportStack};
use crate::config::IsoTpConfig;

/// Produces the ECU's answer to a request (`None` = the ECU stays silent)
pub type Responder = Arc<dyn Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync>;

/// Hands out [`MockStack`]s that share counters and a responder
///
/// All stacks opened by one factory report into the same counters, so tests
/// can observe pump activity across sessions.
#[derive(Clone)]
pub struct MockStackFactory {
    responder: Responder,
    response_delay_cycles: usize,
    process_calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Vec<u8>>>>,
    pending_errors: Arc<Mutex<VecDeque<TransportError>>>,
    opened: Arc<AtomicUsize>,
}

impl MockStackFactory {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            response_delay_cycles: 1,
            process_calls: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
            pending_errors: Arc::new(Mutex::new(VecDeque::new())),
            opened: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Stack that never answers
    pub fn silent() -> Self {
        Self::new(|_| None)
    }

    /// Stack backed by a minimal well-behaved ECU
    pub fn simulated_ecu() -> Self {
        Self::new(|request| default_response(request))
    }

    /// Number of `process()` steps the response needs before it becomes available
    pub fn with_response_delay(mut self, cycles: usize) -> Self {
        self.response_delay_cycles = cycles.max(1);
        self
    }

    /// Report `error` through the error handler on the next `process()` call
    pub fn inject_error(&self, error: TransportError) {
        self.pending_errors.lock().push_back(error);
    }

    /// Total `process()` calls across every stack from this factory
    pub fn process_calls(&self) -> usize {
        self.process_calls.load(Ordering::SeqCst)
    }

    /// Every request submitted so far, oldest first
    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.requests.lock().clone()
    }

    /// Number of stacks opened (one per diagnostic session)
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl StackFactory for MockStackFactory {
    fn open(
        &self,
        address: &IsoTpAddress,
        _params: &IsoTpConfig,
        on_error: ErrorHandler,
    ) -> Result<Box<dyn TransportStack>, TransportError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            rx_id = format!("0x{:03X}", address.rx_id),
            tx_id = format!("0x{:03X}", address.tx_id),
            "Mock stack opened"
        );
        Ok(Box::new(MockStack {
            factory: self.clone(),
            on_error,
            in_flight: None,
            received: VecDeque::new(),
        }))
    }
}

/// Stack whose "wire" is a responder closure
pub struct MockStack {
    factory: MockStackFactory,
    on_error: ErrorHandler,
    in_flight: Option<(Vec<u8>, usize)>,
    received: VecDeque<Vec<u8>>,
}

impl TransportStack for MockStack {
    fn process(&mut self) {
        self.factory.process_calls.fetch_add(1, Ordering::SeqCst);

        let error = self.factory.pending_errors.lock().pop_front();
        if let Some(error) = error {
            (self.on_error)(&error);
        }

        if let Some((response, remaining)) = self.in_flight.take() {
            if remaining <= 1 {
                self.received.push_back(response);
            } else {
                self.in_flight = Some((response, remaining - 1));
            }
        }
    }

    fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        self.factory.requests.lock().push(payload.to_vec());
        if let Some(response) = (self.factory.responder)(payload) {
            self.in_flight = Some((response, self.factory.response_delay_cycles));
        }
        Ok(())
    }

    fn available(&self) -> bool {
        !self.received.is_empty()
    }

    fn recv(&mut self) -> Option<Vec<u8>> {
        self.received.pop_front()
    }
}

/// Answers of the minimal simulated ECU
fn default_response(request: &[u8]) -> Option<Vec<u8>> {
    match request {
        // ECUReset - hard reset (0x11 01 -> 0x51 01)
        [0x11, 0x01] => Some(vec![0x51, 0x01]),
        // ReadDTCInformation - by status mask, nothing active
        [0x19, 0x02, ..] => Some(vec![0x59, 0x02, 0xFF]),
        // ReadDTCInformation - supported DTCs
        [0x19, 0x0A] => Some(vec![
            0x59, 0x0A, 0xFF, // Service response + sub-function + status availability
            0xE0, 0x94, 0x02, 0x00, // Counter supervision DTC
            0xE0, 0x94, 0x04, 0x00, // Checksum supervision DTC
        ]),
        // Anything else: serviceNotSupported
        [sid, ..] => Some(vec![0x7F, *sid, 0x11]),
        [] => None,
    }
}
