//! SocketCAN raw bus adapter (Linux only)

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use socketcan::{
    CanFilter, CanFrame as RawFrame, CanSocket, EmbeddedFrame, ExtendedId, Id, Socket,
    SocketOptions, StandardId,
};

use super::{Bus, BusError};
use crate::frame::{BusFilter, CanFrame, CanId};

/// Raw CAN socket on one interface
///
/// The kernel does not report installed filters back, so the adapter keeps
/// its own copy of the last filter list it applied.
pub struct SocketCanBus {
    interface: String,
    socket: CanSocket,
    filters: Mutex<Vec<BusFilter>>,
    closed: AtomicBool,
}

impl SocketCanBus {
    pub fn open(interface: &str) -> Result<Self, BusError> {
        let socket = CanSocket::open(interface).map_err(|e| {
            BusError::OpenFailed(format!("Failed to open raw CAN socket on {}: {}", interface, e))
        })?;

        tracing::info!(interface, "Opened raw CAN socket");

        Ok(Self {
            interface: interface.to_string(),
            socket,
            filters: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    fn ensure_open(&self) -> Result<(), BusError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }
        Ok(())
    }
}

fn to_raw_id(id: CanId) -> Result<Id, BusError> {
    let raw = match id {
        CanId::Standard(sid) => StandardId::new(sid).map(Id::Standard),
        CanId::Extended(eid) => ExtendedId::new(eid).map(Id::Extended),
    };
    raw.ok_or_else(|| BusError::SendFailed(format!("Invalid CAN ID: {}", id)))
}

fn from_raw_id(id: Id) -> CanId {
    match id {
        Id::Standard(sid) => CanId::Standard(sid.as_raw()),
        Id::Extended(eid) => CanId::Extended(eid.as_raw()),
    }
}

impl Bus for SocketCanBus {
    fn send(&self, frame: &CanFrame) -> Result<(), BusError> {
        self.ensure_open()?;

        let raw = RawFrame::new(to_raw_id(frame.id())?, frame.data())
            .ok_or_else(|| BusError::SendFailed(format!("Cannot build frame {}", frame)))?;

        self.socket
            .write_frame(&raw)
            .map_err(|e| BusError::SendFailed(e.to_string()))?;

        tracing::trace!(%frame, "Sent frame");
        Ok(())
    }

    fn recv(&self, timeout: Duration) -> Result<Option<CanFrame>, BusError> {
        self.ensure_open()?;

        match self.socket.read_frame_timeout(timeout) {
            Ok(RawFrame::Data(data_frame)) => {
                let frame = CanFrame::received(from_raw_id(data_frame.id()), data_frame.data())
                    .map_err(|e| BusError::ReceiveFailed(e.to_string()))?;
                Ok(Some(frame))
            }
            Ok(other) => {
                // Remote and error frames carry nothing the probes can use
                tracing::debug!(frame = ?other, "Ignoring non-data frame");
                Ok(None)
            }
            Err(ref e)
                if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut =>
            {
                Ok(None)
            }
            Err(e) => Err(BusError::ReceiveFailed(e.to_string())),
        }
    }

    fn filters(&self) -> Vec<BusFilter> {
        self.filters.lock().clone()
    }

    fn set_filters(&self, filters: &[BusFilter]) -> Result<(), BusError> {
        self.ensure_open()?;

        let result = if filters.is_empty() {
            self.socket.set_filter_accept_all()
        } else {
            let raw: Vec<CanFilter> = filters
                .iter()
                .map(|f| CanFilter::new(f.id, f.mask))
                .collect();
            self.socket.set_filters(&raw)
        };
        result.map_err(|e| BusError::FilterFailed(e.to_string()))?;

        *self.filters.lock() = filters.to_vec();
        tracing::debug!(?filters, interface = %self.interface, "Receive filters updated");
        Ok(())
    }

    fn shutdown(&self) -> Result<(), BusError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::info!(interface = %self.interface, "Bus shut down");
        }
        Ok(())
    }
}
