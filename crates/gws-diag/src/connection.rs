//! Single owner of the CAN bus
//!
//! Raw frame access (broadcast probes, raw helpers) and ISO-TP diagnostic
//! sessions both derive from one [`Connection`]. At most one session or raw
//! exchange holds the bus at a time; the broadcast probe only transmits and
//! never needs the lease.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::bus::{create_bus, Bus};
use crate::config::{DiagnosticConfig, IsoTpConfig, ProbeConfig};
use crate::error::{DiagError, DiagResult};
use crate::frame::BusFilter;
use crate::session::DiagnosticSession;
use crate::transport::{
    create_stack_factory, ErrorHandler, IsoTpAddress, StackFactory, TransportError,
};

/// Mask used for the session's receive filter
const SESSION_FILTER_MASK: u32 = 0x0FFF_FFFF;

/// Exclusive use of the bus receive path
///
/// Optionally narrows the receive filters on acquire. On drop the previous
/// filters are put back and the connection is released.
pub(crate) struct BusLease {
    bus: Arc<dyn Bus>,
    active: Arc<AtomicBool>,
    previous: Option<Vec<BusFilter>>,
}

impl BusLease {
    fn acquire(
        bus: &Arc<dyn Bus>,
        active: &Arc<AtomicBool>,
        filters: Option<&[BusFilter]>,
    ) -> DiagResult<Self> {
        if active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(DiagError::SessionBusy);
        }

        let mut lease = Self {
            bus: bus.clone(),
            active: active.clone(),
            previous: None,
        };

        if let Some(filters) = filters {
            lease.previous = Some(bus.filters());
            bus.set_filters(filters)?;
        }
        Ok(lease)
    }
}

impl Drop for BusLease {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            if let Err(e) = self.bus.set_filters(&previous) {
                warn!(error = %e, "Failed to restore bus filters");
            }
        }
        self.active.store(false, Ordering::Release);
    }
}

/// CAN bus plus everything needed to open diagnostic sessions on it
pub struct Connection {
    bus: Arc<dyn Bus>,
    stacks: Arc<dyn StackFactory>,
    diagnostic: DiagnosticConfig,
    isotp: IsoTpConfig,
    address: IsoTpAddress,
    active: Arc<AtomicBool>,
}

impl Connection {
    pub fn new(
        bus: Arc<dyn Bus>,
        stacks: Arc<dyn StackFactory>,
        diagnostic: DiagnosticConfig,
        isotp: IsoTpConfig,
    ) -> DiagResult<Self> {
        let address = IsoTpAddress::extended_11bit(
            diagnostic.base_id,
            diagnostic.target_address,
            diagnostic.source_address,
        )?;

        Ok(Self {
            bus,
            stacks,
            diagnostic,
            isotp,
            address,
            active: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Open the bus and transport described by `config`
    pub fn open(config: &ProbeConfig) -> DiagResult<Self> {
        let bus = create_bus(&config.bus)?;
        let stacks = create_stack_factory(&config.bus)?;
        let connection = Self::new(bus, stacks, config.diagnostic.clone(), config.isotp.clone())?;

        info!(
            target_address = format!("0x{:02X}", connection.address.target_address),
            rx_id = format!("0x{:03X}", connection.address.rx_id),
            tx_id = format!("0x{:03X}", connection.address.tx_id),
            "Connection opened"
        );
        Ok(connection)
    }

    pub fn bus(&self) -> &Arc<dyn Bus> {
        &self.bus
    }

    pub fn address(&self) -> &IsoTpAddress {
        &self.address
    }

    pub fn diagnostic_config(&self) -> &DiagnosticConfig {
        &self.diagnostic
    }

    /// Whether a session or raw exchange currently holds the bus
    pub fn is_busy(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Start a diagnostic session
    ///
    /// Fails with [`DiagError::SessionBusy`] while another session is alive.
    pub fn session(&self) -> DiagResult<DiagnosticSession> {
        let filter = [BusFilter::new(self.address.rx_id, SESSION_FILTER_MASK)];
        let lease = BusLease::acquire(&self.bus, &self.active, Some(&filter))?;

        let on_error: ErrorHandler = Arc::new(|error: &TransportError| {
            warn!(error = %error, "ISO-TP error");
        });
        let stack = self.stacks.open(&self.address, &self.isotp, on_error)?;

        debug!(rx_id = format!("0x{:03X}", self.address.rx_id), "Diagnostic session started");
        DiagnosticSession::start(stack, lease, self.diagnostic.poll_interval())
    }

    /// One-shot request in its own session
    pub fn request(&self, payload: &[u8], timeout: Duration) -> DiagResult<Option<Vec<u8>>> {
        let mut session = self.session()?;
        session.request(payload, timeout)
    }

    /// Hold the bus for a raw exchange without touching the filters
    pub(crate) fn raw_lease(&self) -> DiagResult<BusLease> {
        BusLease::acquire(&self.bus, &self.active, None)
    }

    /// Release the bus
    pub fn shutdown(&self) -> DiagResult<()> {
        if self.is_busy() {
            return Err(DiagError::SessionBusy);
        }
        self.bus.shutdown()?;
        info!("Connection closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::mock::MockBus;
    use crate::transport::mock::MockStackFactory;

    fn fast_config() -> DiagnosticConfig {
        DiagnosticConfig {
            poll_interval_ms: 1,
            response_timeout_ms: 200,
            ..Default::default()
        }
    }

    fn connection(bus: Arc<MockBus>, stacks: MockStackFactory) -> Connection {
        Connection::new(bus, Arc::new(stacks), fast_config(), IsoTpConfig::default()).unwrap()
    }

    #[test]
    fn test_session_narrows_and_restores_filter() {
        let bus = Arc::new(MockBus::new());
        let original = vec![BusFilter::new(0x3FD, 0x7FF)];
        bus.set_filters(&original).unwrap();
        let conn = connection(bus.clone(), MockStackFactory::simulated_ecu());

        {
            let _session = conn.session().unwrap();
            assert_eq!(bus.filters(), vec![BusFilter::new(0x65E, 0x0FFF_FFFF)]);
            assert!(conn.is_busy());
        }

        assert_eq!(bus.filters(), original);
        assert!(!conn.is_busy());
    }

    #[test]
    fn test_second_session_is_busy() {
        let bus = Arc::new(MockBus::new());
        let conn = connection(bus, MockStackFactory::simulated_ecu());

        let _first = conn.session().unwrap();
        assert!(matches!(conn.session(), Err(DiagError::SessionBusy)));
        assert!(matches!(conn.raw_lease(), Err(DiagError::SessionBusy)));
    }

    #[test]
    fn test_filter_restored_when_stack_fails_to_open() {
        struct FailingFactory;
        impl StackFactory for FailingFactory {
            fn open(
                &self,
                _address: &IsoTpAddress,
                _params: &IsoTpConfig,
                _on_error: ErrorHandler,
            ) -> Result<Box<dyn crate::transport::TransportStack>, TransportError> {
                Err(TransportError::OpenFailed("no such device".to_string()))
            }
        }

        let bus = Arc::new(MockBus::new());
        let conn = Connection::new(
            bus.clone(),
            Arc::new(FailingFactory),
            fast_config(),
            IsoTpConfig::default(),
        )
        .unwrap();

        assert!(matches!(conn.session(), Err(DiagError::Transport(_))));
        assert!(bus.filters().is_empty());
        assert!(!conn.is_busy());
    }

    #[test]
    fn test_one_shot_request_uses_fresh_session() {
        let bus = Arc::new(MockBus::new());
        let stacks = MockStackFactory::simulated_ecu();
        let conn = connection(bus, stacks.clone());

        let timeout = Duration::from_millis(200);
        assert_eq!(conn.request(&[0x11, 0x01], timeout).unwrap(), Some(vec![0x51, 0x01]));
        assert_eq!(conn.request(&[0x11, 0x01], timeout).unwrap(), Some(vec![0x51, 0x01]));
        assert_eq!(stacks.opened(), 2);
        assert!(!conn.is_busy());
    }

    #[test]
    fn test_shutdown_refused_during_session() {
        let bus = Arc::new(MockBus::new());
        let conn = connection(bus.clone(), MockStackFactory::silent());
        {
            let _session = conn.session().unwrap();
            assert!(matches!(conn.shutdown(), Err(DiagError::SessionBusy)));
        }
        conn.shutdown().unwrap();
        assert!(bus.is_shut_down());
    }
}
