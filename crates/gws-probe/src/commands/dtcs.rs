//! DTC commands - active and supported DTCs

use anyhow::{Context, Result};
use gws_diag::{Connection, DiagError, DtcOracle};

use crate::output::{DtcRow, OutputContext};

/// Read active DTCs by status mask
pub fn dtcs(connection: &Connection, mask: Option<u8>, ctx: &OutputContext) -> Result<()> {
    let oracle = DtcOracle::new(connection);
    let mask = mask.unwrap_or(connection.diagnostic_config().active_status_mask);

    let table = oracle
        .read_active_dtcs(mask)?
        .ok_or(DiagError::NoResponse)
        .with_context(|| format!("Reading DTCs with status mask 0x{:02X}", mask))?;

    if table.is_empty() {
        ctx.info("No active DTCs");
        return Ok(());
    }
    ctx.print(&DtcRow::from_table(&table));
    Ok(())
}

/// Read every DTC the ECU supports
pub fn supported_dtcs(connection: &Connection, ctx: &OutputContext) -> Result<()> {
    let table = DtcOracle::new(connection)
        .read_supported_dtcs()?
        .ok_or(DiagError::NoResponse)
        .context("Reading supported DTCs")?;

    ctx.print(&DtcRow::from_table(&table));
    Ok(())
}
