//! Counter command - rolling counter discovery

use anyhow::{Context, Result};
use gws_diag::{Connection, ProbeConfig};

use crate::output::{reading_label, CounterRow, OutputContext};

pub fn find_counters(connection: &Connection, config: &ProbeConfig, ctx: &OutputContext) -> Result<()> {
    ctx.info("Cycling counter hypotheses...");
    let fields = super::discovery(connection, config)
        .find_counter_fields()
        .context("Counter search failed")?;

    if fields.is_empty() {
        ctx.info("Counter DTC never changed");
        return Ok(());
    }

    let rows: Vec<CounterRow> = fields
        .iter()
        .map(|field| CounterRow {
            byte: field.byte,
            mask: format!("0x{:02X}", field.mask),
            reading: reading_label(&field.reading, config.oracle.healthy_status),
        })
        .collect();
    ctx.print(&rows);
    Ok(())
}
