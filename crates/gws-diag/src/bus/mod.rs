//! Raw CAN bus access
//!
//! This module provides bus adapters for sending and receiving raw frames:
//! - SocketCAN adapter (Linux only)
//! - Mock adapter for testing and dry runs
//!
//! # Example
//!
//! ```ignore
//! use gws_diag::bus::create_bus;
//! use gws_diag::config::BusConfig;
//!
//! let bus = create_bus(&BusConfig::Mock)?;
//! bus.send(&CanFrame::standard(0x3FD, &[0x37, 1, 2, 3, 4])?)?;
//! ```

pub mod error;
pub mod mock;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub mod socketcan;

pub use error::BusError;

use std::sync::Arc;
use std::time::Duration;

use crate::config::BusConfig;
use crate::frame::{BusFilter, CanFrame};

/// Raw frame access to one CAN channel
///
/// The handle is shared between the diagnostic transport and the broadcast
/// probes, so every method takes `&self`.
pub trait Bus: Send + Sync {
    /// Transmit a single frame
    fn send(&self, frame: &CanFrame) -> Result<(), BusError>;

    /// Wait up to `timeout` for the next frame passing the receive filters
    fn recv(&self, timeout: Duration) -> Result<Option<CanFrame>, BusError>;

    /// Current receive filters (empty means accept everything)
    fn filters(&self) -> Vec<BusFilter>;

    /// Replace the receive filters
    fn set_filters(&self, filters: &[BusFilter]) -> Result<(), BusError>;

    /// Release the underlying channel
    fn shutdown(&self) -> Result<(), BusError>;
}

/// Create a bus adapter based on configuration
pub fn create_bus(config: &BusConfig) -> Result<Arc<dyn Bus>, BusError> {
    match config {
        #[cfg(all(target_os = "linux", feature = "socketcan"))]
        BusConfig::SocketCan { interface } => {
            let bus = socketcan::SocketCanBus::open(interface)?;
            Ok(Arc::new(bus))
        }
        #[cfg(not(all(target_os = "linux", feature = "socketcan")))]
        BusConfig::SocketCan { .. } => Err(BusError::Unsupported(
            "SocketCAN requires Linux and the 'socketcan' feature".to_string(),
        )),
        BusConfig::Mock => Ok(Arc::new(mock::MockBus::new())),
    }
}
