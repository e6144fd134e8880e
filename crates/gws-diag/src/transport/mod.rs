//! ISO-TP transport stacks for UDS communication
//!
//! A [`TransportStack`] turns raw CAN frames into request/response PDUs. It
//! never blocks: all progress happens inside [`TransportStack::process`],
//! which the session pump calls in a tight loop.
//!
//! This module provides:
//! - SocketCAN adapter backed by the kernel ISO-TP implementation (Linux only)
//! - Mock stack for testing
//!
//! # Example
//!
//! ```ignore
//! use gws_diag::transport::{create_stack_factory, IsoTpAddress};
//!
//! let stacks = create_stack_factory(&config.bus)?;
//! let address = IsoTpAddress::extended_11bit(0x600, 0x5E, 0xF1)?;
//! let mut stack = stacks.open(&address, &config.isotp, handler)?;
//! stack.send(&[0x19, 0x02, 0x0C])?;
//! ```

pub mod error;
pub mod mock;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub mod socketcan;

pub use error::TransportError;

use std::sync::Arc;

use crate::config::{BusConfig, IsoTpConfig};
use crate::frame::MAX_STANDARD_ID;

/// Callback invoked by a stack for protocol violations
pub type ErrorHandler = Arc<dyn Fn(&TransportError) + Send + Sync>;

/// ISO-TP addressing for 11-bit IDs with extended (first-byte) addressing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsoTpAddress {
    /// ECU address, carried in the first byte of every request frame
    pub target_address: u8,
    /// Tester address, carried in the first byte of every response frame
    pub source_address: u8,
    /// Response CAN ID (ECU -> tester)
    pub rx_id: u32,
    /// Request CAN ID (tester -> ECU)
    pub tx_id: u32,
}

impl IsoTpAddress {
    /// Derive both CAN IDs from a base: `rx = base | target`, `tx = base | source`
    pub fn extended_11bit(
        base_id: u32,
        target_address: u8,
        source_address: u8,
    ) -> Result<Self, TransportError> {
        let rx_id = base_id | u32::from(target_address);
        let tx_id = base_id | u32::from(source_address);
        if rx_id > MAX_STANDARD_ID || tx_id > MAX_STANDARD_ID {
            return Err(TransportError::InvalidConfig(format!(
                "Base ID 0x{:X} does not yield 11-bit IDs (rx 0x{:X}, tx 0x{:X})",
                base_id, rx_id, tx_id
            )));
        }
        Ok(Self {
            target_address,
            source_address,
            rx_id,
            tx_id,
        })
    }
}

/// Non-blocking ISO-TP state machine
pub trait TransportStack: Send {
    /// Advance the state machine: read pending frames, emit flow control and
    /// consecutive frames. Must return promptly.
    fn process(&mut self);

    /// Queue a PDU for transmission
    fn send(&mut self, payload: &[u8]) -> Result<(), TransportError>;

    /// Whether a complete PDU has been received
    fn available(&self) -> bool;

    /// Take the oldest received PDU
    fn recv(&mut self) -> Option<Vec<u8>>;
}

/// Builds a fresh stack for every diagnostic session
pub trait StackFactory: Send + Sync {
    fn open(
        &self,
        address: &IsoTpAddress,
        params: &IsoTpConfig,
        on_error: ErrorHandler,
    ) -> Result<Box<dyn TransportStack>, TransportError>;
}

/// Create a stack factory matching the bus configuration
pub fn create_stack_factory(config: &BusConfig) -> Result<Arc<dyn StackFactory>, TransportError> {
    match config {
        #[cfg(all(target_os = "linux", feature = "socketcan"))]
        BusConfig::SocketCan { interface } => {
            Ok(Arc::new(socketcan::KernelIsoTpFactory::new(interface)))
        }
        #[cfg(not(all(target_os = "linux", feature = "socketcan")))]
        BusConfig::SocketCan { .. } => Err(TransportError::Unsupported(
            "SocketCAN requires Linux and the 'socketcan' feature".to_string(),
        )),
        BusConfig::Mock => Ok(Arc::new(mock::MockStackFactory::simulated_ecu())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extended_11bit_addressing() {
        let addr = IsoTpAddress::extended_11bit(0x600, 0x5E, 0xF1).unwrap();
        assert_eq!(addr.rx_id, 0x65E);
        assert_eq!(addr.tx_id, 0x6F1);
        assert_eq!(addr.target_address, 0x5E);
    }

    #[test]
    fn test_extended_11bit_rejects_wide_base() {
        let err = IsoTpAddress::extended_11bit(0x18DA_0000, 0x5E, 0xF1).unwrap_err();
        assert!(matches!(err, TransportError::InvalidConfig(_)));
    }
}
