//! Reset command - ECU hard reset

use anyhow::{Context, Result};
use gws_diag::uds::{service_id, UdsResponse};
use gws_diag::{raw, Connection, DtcOracle, ProbeConfig};

use crate::output::{describe_response, hex_bytes, FrameRow, OutputContext};

/// Hard reset the gear selector, through ISO-TP or as a raw broadcast
pub fn reset(
    connection: &Connection,
    config: &ProbeConfig,
    broadcast: bool,
    ctx: &OutputContext,
) -> Result<()> {
    if broadcast {
        ctx.info(&format!(
            "Broadcasting hard reset on 0x{:03X}...",
            config.raw.broadcast_id
        ));
        let answers = raw::hard_reset_broadcast(connection, &config.raw)
            .context("Broadcast reset failed")?;

        let rows: Vec<FrameRow> = answers
            .iter()
            .map(|frame| FrameRow {
                id: frame.id().to_string(),
                data: hex_bytes(frame.data()),
            })
            .collect();
        ctx.print(&rows);
        return Ok(());
    }

    ctx.info("Performing hard reset...");
    match DtcOracle::new(connection).hard_reset().context("Reset failed")? {
        Some(response) => {
            let description = describe_response(service_id::ECU_RESET, &response);
            if UdsResponse::classify(service_id::ECU_RESET, &response).is_positive() {
                ctx.success(&format!("Reset accepted: {}", description));
            } else {
                ctx.error(&format!("Reset rejected: {}", description));
            }
        }
        None => ctx.warn("No response to reset request"),
    }
    Ok(())
}
