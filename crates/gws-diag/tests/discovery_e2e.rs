//! End-to-end discovery tests
//!
//! A mock bus carries the probe frames and a mock ISO-TP stack plays the gear
//! selector's diagnostic side. The simulated ECU judges the last status
//! message it saw on the bus and reports the result through DTC e09404,
//! which is exactly what the real device does.

use std::sync::Arc;
use std::time::Duration;

use gws_diag::bus::mock::MockBus;
use gws_diag::config::{DiagnosticConfig, ProbeConfig, ProbeTiming};
use gws_diag::transport::mock::MockStackFactory;
use gws_diag::{
    BroadcastProbe, Bus, BusFilter, ChecksumFunction, Connection, Crc8, CrcParams, DiagError,
    Discovery, DtcOracle, DtcReading, StatusOracle,
};
use pretty_assertions::assert_eq;

// =============================================================================
// Simulated gear selector
// =============================================================================

/// DTC table for the supervision DTCs, checksum status first
fn dtc_table(checksum_status: u8, counter_status: u8) -> Vec<u8> {
    vec![
        0x59,
        0x02,
        0xFF,
        0xE0,
        0x94,
        0x04,
        checksum_status,
        0xE0,
        0x94,
        0x02,
        counter_status,
    ]
}

/// Connection whose ECU accepts a status message when `accept` says so
fn gear_selector<F>(accept: F) -> (Arc<MockBus>, MockStackFactory, Connection)
where
    F: Fn(&[u8]) -> bool + Send + Sync + 'static,
{
    let bus = Arc::new(MockBus::new());
    let observed = bus.clone();
    let stacks = MockStackFactory::new(move |request| match request {
        [0x19, 0x02, _] => {
            let accepted = observed
                .last_sent_to(0x3FD)
                .map(|frame| accept(frame.data()))
                .unwrap_or(false);
            Some(dtc_table(if accepted { 0x2E } else { 0x2F }, 0x2F))
        }
        _ => None,
    });

    let diagnostic = DiagnosticConfig {
        response_timeout_ms: 200,
        poll_interval_ms: 1,
        ..Default::default()
    };
    let conn = Connection::new(
        bus.clone(),
        Arc::new(stacks.clone()),
        diagnostic,
        Default::default(),
    )
    .unwrap();
    (bus, stacks, conn)
}

fn config() -> ProbeConfig {
    ProbeConfig {
        probe: ProbeTiming::immediate(),
        ..Default::default()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn test_find_checksum_end_to_end() {
    let (bus, stacks, conn) = gear_selector(|data| data == [0x37, 1, 2, 3, 4]);
    let oracle = DtcOracle::new(&conn);
    let probe = BroadcastProbe::new(conn.bus().clone(), ProbeTiming::immediate());
    let discovery = Discovery::new(&oracle, &probe, &config());

    assert_eq!(discovery.find_checksum(&[1, 2, 3, 4]).unwrap(), 0x37);

    // 0x00..=0x37, one burst of 16 and one DTC read each
    assert_eq!(bus.sent_frames().len(), 0x38 * 16);
    assert_eq!(stacks.opened(), 0x38);
    assert!(!conn.is_busy());
}

#[test]
fn test_confirm_crc_end_to_end() {
    let (_bus, _stacks, conn) = gear_selector(|data| {
        data.len() == 5 && Crc8::new(CrcParams::MSG_3FD).calc(&data[1..]) == data[0]
    });
    let oracle = DtcOracle::new(&conn);
    let probe = BroadcastProbe::new(conn.bus().clone(), ProbeTiming::immediate());
    let body = [0x10, 0x20, 0x30, 0x40];

    let discovery = Discovery::new(&oracle, &probe, &config());
    assert!(discovery.confirm_working_checksum(&body).unwrap());

    let mut wrong = Crc8::new(CrcParams::MSG_3FD).prefixed(&body);
    wrong[0] ^= 0xFF;
    assert!(!discovery.verify_checksum(&wrong).unwrap());

    let lever_crc = Discovery::new(&oracle, &probe, &config())
        .with_checksum(Box::new(Crc8::new(CrcParams::MSG_197)));
    assert!(!lever_crc.confirm_working_checksum(&body).unwrap());
}

#[test]
fn test_oracle_reads_through_connection() {
    let (bus, _stacks, conn) = gear_selector(|_| true);
    bus.send(&gws_diag::CanFrame::standard(0x3FD, &[0x00; 5]).unwrap())
        .unwrap();

    let oracle = DtcOracle::new(&conn);
    let checksum_dtc = config().oracle.checksum_dtc;
    let counter_dtc = config().oracle.counter_dtc;
    assert_eq!(oracle.dtc_status(&checksum_dtc).unwrap(), DtcReading::Status(0x2E));
    assert_eq!(oracle.dtc_status(&counter_dtc).unwrap(), DtcReading::Status(0x2F));
}

#[test]
fn test_filters_restored_after_discovery() {
    let (bus, _stacks, conn) = gear_selector(|data| data.first() == Some(&0x02));
    let original = vec![BusFilter::new(0x3FD, 0x7FF), BusFilter::new(0x197, 0x7FF)];
    bus.set_filters(&original).unwrap();

    let oracle = DtcOracle::new(&conn);
    let probe = BroadcastProbe::new(conn.bus().clone(), ProbeTiming::immediate());
    let discovery = Discovery::new(&oracle, &probe, &config());
    assert_eq!(discovery.find_checksum(&[9, 9, 9, 9]).unwrap(), 0x02);

    assert_eq!(bus.filters(), original);
}

#[test]
fn test_silent_ecu_reads_as_no_response() {
    let bus = Arc::new(MockBus::new());
    let stacks = MockStackFactory::silent();
    let diagnostic = DiagnosticConfig {
        response_timeout_ms: 30,
        poll_interval_ms: 1,
        ..Default::default()
    };
    let conn = Connection::new(bus, Arc::new(stacks.clone()), diagnostic, Default::default())
        .unwrap();

    let oracle = DtcOracle::new(&conn);
    let reading = oracle.dtc_status(&config().oracle.checksum_dtc).unwrap();
    assert_eq!(reading, DtcReading::NoResponse);
    assert_eq!(stacks.requests().len(), 3);
}

#[test]
fn test_session_busy_while_request_outstanding() {
    let (_bus, _stacks, conn) = gear_selector(|_| false);
    let mut session = conn.session().unwrap();
    assert!(matches!(conn.session(), Err(DiagError::SessionBusy)));

    let response = session
        .request(&[0x19, 0x02, 0x0C], Duration::from_millis(200))
        .unwrap()
        .unwrap();
    assert_eq!(response, dtc_table(0x2F, 0x2F));

    drop(session);
    assert!(conn.session().is_ok());
}
