//! Query command - single raw frame exchange

use anyhow::{Context, Result};
use gws_diag::{raw, Connection, ProbeConfig};

use crate::output::{hex_bytes, OutputContext};

pub fn query(
    connection: &Connection,
    config: &ProbeConfig,
    data: &[u8],
    ctx: &OutputContext,
) -> Result<()> {
    let answer = raw::simple_query(connection, &config.raw, data).context("Raw query failed")?;
    match answer {
        Some(payload) => ctx.print_kv(&[
            ("ID", format!("0x{:03X}", config.raw.query_rx_id)),
            ("Data", hex_bytes(&payload)),
        ]),
        None => ctx.warn(&format!(
            "No answer on 0x{:03X} within {} ms",
            config.raw.query_rx_id, config.raw.query_timeout_ms
        )),
    }
    Ok(())
}
