//! Raw frame helpers that bypass ISO-TP
//!
//! Both helpers read from the bus directly, so they hold the connection's
//! lease for their whole exchange and are refused while a diagnostic session
//! is alive.

use std::ops::Range;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::RawConfig;
use crate::connection::Connection;
use crate::error::DiagResult;
use crate::frame::CanFrame;
use crate::uds::{reset_type, service_id};

/// Diagnostic answer IDs collected after a broadcast reset
const DIAGNOSTIC_RESPONSE_IDS: Range<u32> = 0x600..0x700;

/// Longest single wait on the bus
const RECV_SLICE: Duration = Duration::from_millis(100);

fn remaining_slice(deadline: Instant) -> Option<Duration> {
    let left = deadline.saturating_duration_since(Instant::now());
    if left.is_zero() {
        None
    } else {
        Some(left.min(RECV_SLICE))
    }
}

/// Broadcast an ECUReset hard reset and collect every diagnostic answer
///
/// The request is a single frame on the tester broadcast ID whose first byte
/// addresses the target ECU. Frames in `0x600..0x700` seen during the listen
/// window are returned in arrival order.
pub fn hard_reset_broadcast(connection: &Connection, config: &RawConfig) -> DiagResult<Vec<CanFrame>> {
    let _lease = connection.raw_lease()?;
    let bus = connection.bus();
    let target = connection.address().target_address;

    let request = CanFrame::standard(
        config.broadcast_id,
        &[target, 0x02, service_id::ECU_RESET, reset_type::HARD_RESET],
    )?;
    debug!(%request, "Broadcast hard reset");
    bus.send(&request)?;

    let deadline = Instant::now() + Duration::from_millis(config.broadcast_listen_ms);
    let mut answers = Vec::new();
    while let Some(slice) = remaining_slice(deadline) {
        if let Some(frame) = bus.recv(slice)? {
            if DIAGNOSTIC_RESPONSE_IDS.contains(&frame.id().raw()) {
                debug!(%frame, "Reset answer");
                answers.push(frame);
            }
        }
    }

    info!(answers = answers.len(), "Broadcast hard reset finished");
    Ok(answers)
}

/// Send one frame and return the payload of the first answer on the query
/// response ID
pub fn simple_query(
    connection: &Connection,
    config: &RawConfig,
    data: &[u8],
) -> DiagResult<Option<Vec<u8>>> {
    let _lease = connection.raw_lease()?;
    let bus = connection.bus();

    let request = CanFrame::standard(config.query_tx_id, data)?;
    debug!(%request, "Raw query");
    bus.send(&request)?;

    let deadline = Instant::now() + Duration::from_millis(config.query_timeout_ms);
    while let Some(slice) = remaining_slice(deadline) {
        match bus.recv(slice)? {
            Some(frame) if frame.id().raw() == u32::from(config.query_rx_id) => {
                debug!(%frame, "Raw query answer");
                return Ok(Some(frame.data().to_vec()));
            }
            _ => {}
        }
    }

    debug!(rx_id = format!("0x{:03X}", config.query_rx_id), "Raw query unanswered");
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::mock::MockBus;
    use crate::config::{DiagnosticConfig, IsoTpConfig};
    use crate::error::DiagError;
    use crate::frame::CanId;
    use crate::transport::mock::MockStackFactory;
    use std::sync::Arc;

    fn connection(bus: Arc<MockBus>) -> Connection {
        Connection::new(
            bus,
            Arc::new(MockStackFactory::silent()),
            DiagnosticConfig::default(),
            IsoTpConfig::default(),
        )
        .unwrap()
    }

    fn fast_raw() -> RawConfig {
        RawConfig {
            broadcast_listen_ms: 150,
            query_timeout_ms: 150,
            ..Default::default()
        }
    }

    #[test]
    fn test_broadcast_reset_collects_diagnostic_answers() {
        let bus = Arc::new(MockBus::new());
        bus.set_responder(|frame| {
            if frame.id().raw() != 0x6F1 {
                return Vec::new();
            }
            vec![
                CanFrame::received(CanId::standard(0x65E).unwrap(), &[0xF1, 0x02, 0x51, 0x01])
                    .unwrap(),
                CanFrame::received(CanId::standard(0x3FD).unwrap(), &[0x00; 5]).unwrap(),
                CanFrame::received(CanId::standard(0x640).unwrap(), &[0xF1, 0x03, 0x7F, 0x11])
                    .unwrap(),
            ]
        });
        let conn = connection(bus.clone());

        let answers = hard_reset_broadcast(&conn, &fast_raw()).unwrap();
        let ids: Vec<u32> = answers.iter().map(|f| f.id().raw()).collect();
        assert_eq!(ids, vec![0x65E, 0x640]);

        let request = bus.last_sent_to(0x6F1).unwrap();
        assert_eq!(request.data(), &[0x5E, 0x02, 0x11, 0x01]);
        assert!(!conn.is_busy());
    }

    #[test]
    fn test_simple_query_returns_first_answer() {
        let bus = Arc::new(MockBus::new());
        bus.set_responder(|frame| {
            vec![
                CanFrame::received(CanId::standard(0x7C8).unwrap(), &[0xAA]).unwrap(),
                CanFrame::received(CanId::standard(0x7C9).unwrap(), frame.data()).unwrap(),
                CanFrame::received(CanId::standard(0x7C9).unwrap(), &[0xBB]).unwrap(),
            ]
        });
        let conn = connection(bus.clone());

        let answer = simple_query(&conn, &fast_raw(), &[0x22, 0xF1, 0x90]).unwrap();
        assert_eq!(answer, Some(vec![0x22, 0xF1, 0x90]));
        assert_eq!(bus.last_sent_to(0x7CA).unwrap().data(), &[0x22, 0xF1, 0x90]);
    }

    #[test]
    fn test_simple_query_times_out() {
        let bus = Arc::new(MockBus::new());
        let conn = connection(bus);

        let start = Instant::now();
        assert_eq!(simple_query(&conn, &fast_raw(), &[0x01]).unwrap(), None);
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[test]
    fn test_refused_during_session() {
        let bus = Arc::new(MockBus::new());
        let conn = connection(bus.clone());

        let _session = conn.session().unwrap();
        assert!(matches!(
            simple_query(&conn, &fast_raw(), &[0x01]),
            Err(DiagError::SessionBusy)
        ));
        assert!(matches!(
            hard_reset_broadcast(&conn, &fast_raw()),
            Err(DiagError::SessionBusy)
        ));
        assert!(bus.sent_frames().is_empty());
    }

    #[test]
    fn test_oversized_query_rejected() {
        let conn = connection(Arc::new(MockBus::new()));
        assert!(matches!(
            simple_query(&conn, &fast_raw(), &[0; 9]),
            Err(DiagError::InvalidFrame(_))
        ));
        assert!(!conn.is_busy());
    }
}
