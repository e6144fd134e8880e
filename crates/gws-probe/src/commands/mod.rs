//! Command implementations for gws-probe

pub mod checksum;
pub mod counters;
pub mod dtcs;
pub mod query;
pub mod reset;
pub mod stream;

pub use checksum::{confirm_crc, crc, find_checksum, search_checksums, verify_checksum};
pub use counters::find_counters;
pub use dtcs::{dtcs, supported_dtcs};
pub use query::query;
pub use reset::reset;
pub use stream::send_status;

use gws_diag::{BroadcastProbe, Connection, Discovery, DtcOracle, ProbeConfig};

/// Discovery wired to the real oracle and the bus
fn discovery<'a>(
    connection: &'a Connection,
    config: &ProbeConfig,
) -> Discovery<DtcOracle<'a>, BroadcastProbe> {
    let oracle = DtcOracle::new(connection);
    let probe = BroadcastProbe::new(connection.bus().clone(), config.probe.clone());
    Discovery::new(oracle, probe, config)
}
