//! Kernel ISO-TP stack (CAN_ISOTP sockets)
//!
//! Segmentation, flow control and padding run in the kernel; `process()`
//! drains completed PDUs from the non-blocking socket into a receive queue.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use socketcan::StandardId;
use socketcan_isotp::{FlowControlOptions, IsoTpBehaviour, IsoTpOptions, IsoTpSocket};

use crate::config::IsoTpConfig;
use crate::transport::{ErrorHandler, IsoTpAddress, StackFactory, TransportError, TransportStack};

/// Fixed N_Bs / N_Cr timers of the Linux ISO-TP implementation
const KERNEL_PROTOCOL_TIMEOUT_MS: u64 = 1000;

/// Opens a kernel ISO-TP socket per diagnostic session
pub struct KernelIsoTpFactory {
    interface: String,
}

impl KernelIsoTpFactory {
    pub fn new(interface: &str) -> Self {
        Self {
            interface: interface.to_string(),
        }
    }
}

impl StackFactory for KernelIsoTpFactory {
    fn open(
        &self,
        address: &IsoTpAddress,
        params: &IsoTpConfig,
        on_error: ErrorHandler,
    ) -> Result<Box<dyn TransportStack>, TransportError> {
        let stack = KernelIsoTpStack::open(&self.interface, address, params, on_error)?;
        Ok(Box::new(stack))
    }
}

/// ISO-TP stack backed by a non-blocking `CAN_ISOTP` socket
pub struct KernelIsoTpStack {
    socket: IsoTpSocket,
    received: VecDeque<Vec<u8>>,
    on_error: ErrorHandler,
}

impl KernelIsoTpStack {
    pub fn open(
        interface: &str,
        address: &IsoTpAddress,
        params: &IsoTpConfig,
        on_error: ErrorHandler,
    ) -> Result<Self, TransportError> {
        if params.ll_data_length != 8 {
            return Err(TransportError::InvalidConfig(format!(
                "Link-layer length {} not supported on classic CAN",
                params.ll_data_length
            )));
        }
        for (name, value) in [
            ("rx_flowcontrol_timeout_ms", params.rx_flowcontrol_timeout_ms),
            (
                "rx_consecutive_frame_timeout_ms",
                params.rx_consecutive_frame_timeout_ms,
            ),
        ] {
            if value != KERNEL_PROTOCOL_TIMEOUT_MS {
                tracing::warn!(
                    name,
                    value,
                    kernel = KERNEL_PROTOCOL_TIMEOUT_MS,
                    "Kernel ISO-TP uses fixed protocol timers; configured value ignored"
                );
            }
        }

        let rx_id = standard_id(address.rx_id)?;
        let tx_id = standard_id(address.tx_id)?;

        let mut flags = IsoTpBehaviour::CAN_ISOTP_EXTEND_ADDR | IsoTpBehaviour::CAN_ISOTP_RX_EXT_ADDR;
        if params.tx_padding.is_some() {
            flags |= IsoTpBehaviour::CAN_ISOTP_TX_PADDING;
        }
        if params.squash_stmin_requirement {
            flags |= IsoTpBehaviour::CAN_ISOTP_FORCE_TXSTMIN;
        }

        let options = IsoTpOptions::new(
            flags,
            Duration::ZERO,
            address.target_address,
            params.tx_padding.unwrap_or(0),
            0x00,
            address.source_address,
        )
        .map_err(|e| TransportError::InvalidConfig(format!("ISO-TP options: {}", e)))?;

        let flow_control = FlowControlOptions::new(params.block_size, params.stmin, params.wftmax);

        let socket = IsoTpSocket::open_with_opts(
            interface,
            rx_id,
            tx_id,
            Some(options),
            Some(flow_control),
            None,
        )
        .map_err(|e| {
            TransportError::OpenFailed(format!("Failed to open ISO-TP socket on {}: {}", interface, e))
        })?;

        socket.set_nonblocking(true).map_err(|e| {
            TransportError::InvalidConfig(format!("Failed to set non-blocking: {}", e))
        })?;

        tracing::debug!(
            interface,
            rx_id = format!("0x{:03X}", address.rx_id),
            tx_id = format!("0x{:03X}", address.tx_id),
            target = format!("0x{:02X}", address.target_address),
            "ISO-TP socket opened"
        );

        Ok(Self {
            socket,
            received: VecDeque::new(),
            on_error,
        })
    }
}

fn standard_id(raw: u32) -> Result<StandardId, TransportError> {
    u16::try_from(raw)
        .ok()
        .and_then(StandardId::new)
        .ok_or_else(|| TransportError::InvalidConfig(format!("Invalid 11-bit CAN ID: 0x{:X}", raw)))
}

/// Map socket errors onto the transport fault taxonomy
fn classify(error: &io::Error) -> TransportError {
    let message = error.to_string();
    match error.raw_os_error() {
        Some(libc::ETIMEDOUT) => TransportError::Timeout(message),
        Some(libc::EILSEQ) | Some(libc::EBADMSG) | Some(libc::ECOMM) => {
            TransportError::Framing(message)
        }
        Some(libc::EMSGSIZE) | Some(libc::ENOBUFS) | Some(libc::EOVERFLOW) => {
            TransportError::Overflow(message)
        }
        _ if error.kind() == io::ErrorKind::TimedOut => TransportError::Timeout(message),
        _ => TransportError::ReceiveFailed(message),
    }
}

impl TransportStack for KernelIsoTpStack {
    fn process(&mut self) {
        match self.socket.read() {
            Ok(data) if !data.is_empty() => {
                tracing::debug!(data = ?data, "ISO-TP PDU received");
                self.received.push_back(data.to_vec());
            }
            Ok(_) => {}
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => (self.on_error)(&classify(&e)),
        }
    }

    fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        self.socket
            .write(payload)
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    fn available(&self) -> bool {
        !self.received.is_empty()
    }

    fn recv(&mut self) -> Option<Vec<u8>> {
        self.received.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(libc::ETIMEDOUT)]
    fn test_classify_timeout(#[case] errno: i32) {
        let error = classify(&io::Error::from_raw_os_error(errno));
        assert!(matches!(error, TransportError::Timeout(_)), "{:?}", error);
    }

    #[rstest]
    #[case(libc::EILSEQ)]
    #[case(libc::EBADMSG)]
    #[case(libc::ECOMM)]
    fn test_classify_framing(#[case] errno: i32) {
        let error = classify(&io::Error::from_raw_os_error(errno));
        assert!(matches!(error, TransportError::Framing(_)), "{:?}", error);
    }

    #[rstest]
    #[case(libc::EMSGSIZE)]
    #[case(libc::ENOBUFS)]
    #[case(libc::EOVERFLOW)]
    fn test_classify_overflow(#[case] errno: i32) {
        let error = classify(&io::Error::from_raw_os_error(errno));
        assert!(matches!(error, TransportError::Overflow(_)), "{:?}", error);
    }

    #[test]
    fn test_classify_other_errors() {
        let timed_out = io::Error::new(io::ErrorKind::TimedOut, "no flow control");
        assert!(matches!(classify(&timed_out), TransportError::Timeout(_)));

        let refused = io::Error::from_raw_os_error(libc::ENETDOWN);
        assert!(matches!(classify(&refused), TransportError::ReceiveFailed(_)));
    }

    #[test]
    fn test_standard_id_range() {
        assert!(standard_id(0x7FF).is_ok());
        assert!(matches!(
            standard_id(0x800),
            Err(TransportError::InvalidConfig(_))
        ));
    }
}
