//! Checksum commands - discovery, verification and local CRC calculation

use std::ops::ControlFlow;

use anyhow::{Context, Result};
use gws_diag::{ChecksumFunction, Connection, Crc8, DiagError, ProbeConfig};

use crate::output::{hex_bytes, reading_label, ObservationRow, OutputContext};

/// Find the checksum byte the ECU accepts for `body`
pub fn find_checksum(
    connection: &Connection,
    config: &ProbeConfig,
    body: &[u8],
    ctx: &OutputContext,
) -> Result<()> {
    ctx.info(&format!("Searching checksum for {}...", hex_bytes(body)));

    match super::discovery(connection, config).find_checksum(body) {
        Ok(checksum) => {
            ctx.success(&format!("Checksum found: 0x{:02x}", checksum));
            let local = Crc8::new(config.messages.status.crc).calc(body);
            if local != checksum {
                ctx.warn(&format!(
                    "Configured CRC computes 0x{:02x} for this body",
                    local
                ));
            }
            Ok(())
        }
        Err(e @ DiagError::NoValidChecksumFound { .. }) => {
            ctx.error(&e.to_string());
            Err(e).context("Every checksum candidate was rejected")
        }
        Err(e) => Err(e).context("Checksum search failed"),
    }
}

/// Burst a complete payload and report whether its checksum was accepted
pub fn verify_checksum(
    connection: &Connection,
    config: &ProbeConfig,
    payload: &[u8],
    ctx: &OutputContext,
) -> Result<()> {
    let accepted = super::discovery(connection, config)
        .verify_checksum(payload)
        .context("Checksum verification failed")?;
    report_acceptance(hex_bytes(payload), accepted, ctx);
    Ok(())
}

/// Check the configured CRC against the ECU
pub fn confirm_crc(
    connection: &Connection,
    config: &ProbeConfig,
    body: &[u8],
    ctx: &OutputContext,
) -> Result<()> {
    let payload = Crc8::new(config.messages.status.crc).prefixed(body);
    let accepted = super::discovery(connection, config)
        .confirm_working_checksum(body)
        .context("CRC confirmation failed")?;
    report_acceptance(hex_bytes(&payload), accepted, ctx);
    Ok(())
}

fn report_acceptance(payload: String, accepted: bool, ctx: &OutputContext) {
    if accepted {
        ctx.success(&format!("{}: checksum accepted", payload));
    } else {
        ctx.error(&format!("{}: checksum rejected", payload));
    }
}

/// Sweep single-byte payload variations and list what disturbed the DTC
pub fn search_checksums(
    connection: &Connection,
    config: &ProbeConfig,
    limit: Option<usize>,
    ctx: &OutputContext,
) -> Result<()> {
    let healthy = config.oracle.healthy_status;
    let mut rows = Vec::new();

    let probed = super::discovery(connection, config)
        .search_valid_checksums(|observation| {
            ctx.info(&format!(
                "{} -> {}",
                hex_bytes(&observation.payload),
                reading_label(&observation.reading, healthy)
            ));
            rows.push(ObservationRow {
                payload: hex_bytes(&observation.payload),
                reading: observation.reading.to_string(),
            });

            match limit {
                Some(limit) if rows.len() >= limit => ControlFlow::Break(()),
                _ => ControlFlow::Continue(()),
            }
        })
        .context("Checksum sweep failed")?;

    ctx.info(&format!("{} payloads probed", probed));
    ctx.print(&rows);
    Ok(())
}

/// Compute the checksum of `body` locally
pub fn crc(config: &ProbeConfig, lever: bool, body: &[u8], ctx: &OutputContext) -> Result<()> {
    let message = if lever {
        config.messages.lever
    } else {
        config.messages.status
    };
    let crc = Crc8::new(message.crc);

    ctx.print_kv(&[
        ("Message", format!("0x{:03X}", message.id)),
        ("Checksum", format!("0x{:02x}", crc.calc(body))),
        ("Payload", hex_bytes(&crc.prefixed(body))),
    ]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;
    use gws_diag::config::{BusConfig, DiagnosticConfig, ProbeTiming};

    /// Mock gear selector that never reports the checksum DTC
    fn mock_config() -> ProbeConfig {
        ProbeConfig {
            bus: BusConfig::Mock,
            diagnostic: DiagnosticConfig {
                response_timeout_ms: 200,
                poll_interval_ms: 1,
                ..Default::default()
            },
            probe: ProbeTiming::immediate(),
            ..Default::default()
        }
    }

    #[test]
    fn test_find_checksum_fails_when_every_candidate_rejected() {
        let config = mock_config();
        let connection = Connection::open(&config).unwrap();
        let ctx = OutputContext::new(OutputFormat::Json, true, true);

        let err = find_checksum(&connection, &config, &[1, 2, 3, 4], &ctx).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DiagError>(),
            Some(DiagError::NoValidChecksumFound { .. })
        ));
        connection.shutdown().unwrap();
    }

    #[test]
    fn test_crc_needs_no_connection() {
        let ctx = OutputContext::new(OutputFormat::Json, true, true);
        assert!(crc(&mock_config(), false, &[1, 2, 3, 4], &ctx).is_ok());
    }
}
