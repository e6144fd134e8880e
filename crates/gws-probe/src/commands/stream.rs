//! Send-status command - plays the vehicle's status message

use std::time::Duration;

use anyhow::{Context, Result};
use gws_diag::{Connection, ProbeConfig, StatusStreamer};

use crate::output::{DtcRow, OutputContext};

pub fn send_status(
    connection: &Connection,
    config: &ProbeConfig,
    status: [u8; 3],
    seconds: f64,
    ctx: &OutputContext,
) -> Result<()> {
    let duration = Duration::try_from_secs_f64(seconds).context("Invalid duration")?;
    ctx.info(&format!(
        "Sending status on 0x{:03X} for {:.1}s...",
        config.messages.status.id, seconds
    ));

    let report = StatusStreamer::new(connection, config.messages.status, config.stream.clone())
        .send_status(status, duration)
        .context("Status stream failed")?;

    ctx.print_kv(&[
        ("Messages", report.messages_sent.to_string()),
        ("Elapsed", format!("{:.2}s", report.elapsed.as_secs_f64())),
        ("Rate", format!("{:.1}/s", report.rate())),
    ]);

    match report.dtcs {
        Some(table) if table.is_empty() => ctx.success("No active DTCs"),
        Some(table) => ctx.print(&DtcRow::from_table(&table)),
        None => ctx.warn("ECU did not answer the DTC read"),
    }
    Ok(())
}
