//! Background driver for a [`TransportStack`]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{DiagError, DiagResult};
use crate::transport::{TransportError, TransportStack};

/// Stack shared between the pump thread and the requesting thread
pub type SharedStack = Arc<Mutex<Box<dyn TransportStack>>>;

/// Calls [`TransportStack::process`] in a tight loop on its own thread
///
/// ISO-TP flow control has to be answered within the ECU's timers, so the
/// loop never sleeps. The stack lock is released between iterations, which
/// gives the requesting thread its turn.
pub struct TransportPump {
    stack: SharedStack,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TransportPump {
    pub fn new(stack: Box<dyn TransportStack>) -> Self {
        Self {
            stack: Arc::new(Mutex::new(stack)),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn stack(&self) -> &SharedStack {
        &self.stack
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Spawn the pump thread. Starting a running pump does nothing.
    pub fn start(&mut self) -> DiagResult<()> {
        if self.handle.is_some() {
            return Ok(());
        }

        self.running.store(true, Ordering::SeqCst);
        let stack = self.stack.clone();
        let running = self.running.clone();

        let handle = std::thread::Builder::new()
            .name("isotp-pump".to_string())
            .spawn(move || {
                while running.load(Ordering::Acquire) {
                    stack.lock().process();
                }
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                DiagError::Transport(TransportError::OpenFailed(format!(
                    "Failed to spawn pump thread: {}",
                    e
                )))
            })?;

        self.handle = Some(handle);
        debug!("Transport pump started");
        Ok(())
    }

    /// Clear the run flag and wait for the thread to exit
    ///
    /// Once this returns the stack is never processed again by this pump.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        self.running.store(false, Ordering::Release);
        if handle.join().is_err() {
            warn!("Transport pump thread panicked");
        }
        debug!("Transport pump stopped");
    }
}

impl Drop for TransportPump {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IsoTpConfig;
    use crate::transport::mock::MockStackFactory;
    use crate::transport::{IsoTpAddress, StackFactory};
    use std::time::{Duration, Instant};

    fn pump_for(factory: &MockStackFactory) -> TransportPump {
        let address = IsoTpAddress::extended_11bit(0x600, 0x5E, 0xF1).unwrap();
        let stack = factory
            .open(&address, &IsoTpConfig::default(), Arc::new(|_: &TransportError| {}))
            .unwrap();
        TransportPump::new(stack)
    }

    fn wait_until(condition: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            std::thread::yield_now();
        }
    }

    #[test]
    fn test_pump_processes_until_stopped() {
        let factory = MockStackFactory::silent();
        let mut pump = pump_for(&factory);

        pump.start().unwrap();
        assert!(pump.is_running());
        wait_until(|| factory.process_calls() > 100);

        pump.stop();
        assert!(!pump.is_running());

        let after_stop = factory.process_calls();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(factory.process_calls(), after_stop);
    }

    #[test]
    fn test_start_twice_is_noop() {
        let factory = MockStackFactory::silent();
        let mut pump = pump_for(&factory);
        pump.start().unwrap();
        pump.start().unwrap();
        pump.stop();
        pump.stop();
    }

    #[test]
    fn test_drop_stops_pump() {
        let factory = MockStackFactory::silent();
        {
            let mut pump = pump_for(&factory);
            pump.start().unwrap();
            wait_until(|| factory.process_calls() > 0);
        }
        let after_drop = factory.process_calls();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(factory.process_calls(), after_drop);
    }

    #[test]
    fn test_pump_delivers_response() {
        let factory = MockStackFactory::simulated_ecu().with_response_delay(10);
        let mut pump = pump_for(&factory);
        pump.stack().lock().send(&[0x11, 0x01]).unwrap();
        pump.start().unwrap();

        wait_until(|| pump.stack().lock().available());
        assert_eq!(pump.stack().lock().recv(), Some(vec![0x51, 0x01]));
    }
}
