//! DTC oracle
//!
//! The gear selector never acknowledges broadcast messages. What it does do
//! is supervise them and report the outcome through DTC status bytes, which
//! makes ReadDTCInformation the only ground truth the discovery algorithms
//! get.

use std::fmt;
use std::time::Duration;

use tracing::{debug, warn};

use crate::connection::Connection;
use crate::error::DiagResult;
use crate::uds::dtc::{sub_function, DtcId, DtcTable};
use crate::uds::{reset_type, service_id};

/// Outcome of looking one DTC up in the active table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtcReading {
    /// Present with this status byte
    Status(u8),
    /// The table was read but does not contain the DTC
    Missing,
    /// Every read attempt went unanswered
    NoResponse,
}

impl DtcReading {
    pub fn status(&self) -> Option<u8> {
        match self {
            Self::Status(status) => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for DtcReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(status) => write!(f, "0x{:02x}", status),
            Self::Missing => write!(f, "missing"),
            Self::NoResponse => write!(f, "no response"),
        }
    }
}

/// Reports the current status of a DTC
pub trait StatusOracle {
    fn dtc_status(&self, id: &DtcId) -> DiagResult<DtcReading>;
}

impl<T: StatusOracle + ?Sized> StatusOracle for &T {
    fn dtc_status(&self, id: &DtcId) -> DiagResult<DtcReading> {
        (**self).dtc_status(id)
    }
}

/// Reads DTCs from the ECU through one-shot diagnostic sessions
pub struct DtcOracle<'a> {
    connection: &'a Connection,
    timeout: Duration,
    attempts: u32,
    status_mask: u8,
}

impl<'a> DtcOracle<'a> {
    pub fn new(connection: &'a Connection) -> Self {
        let config = connection.diagnostic_config();
        Self {
            connection,
            timeout: config.response_timeout(),
            attempts: config.dtc_read_attempts.max(1),
            status_mask: config.active_status_mask,
        }
    }

    pub fn connection(&self) -> &Connection {
        self.connection
    }

    /// ReadDTCInformation by status mask, retried while the ECU stays silent
    ///
    /// `Ok(None)` once every attempt has timed out. A malformed answer is an
    /// error and is not retried.
    pub fn read_active_dtcs(&self, status_mask: u8) -> DiagResult<Option<DtcTable>> {
        let request = [
            service_id::READ_DTC_INFO,
            sub_function::REPORT_DTC_BY_STATUS_MASK,
            status_mask,
        ];

        for attempt in 1..=self.attempts {
            match self.connection.request(&request, self.timeout)? {
                Some(response) => {
                    let table = DtcTable::decode(&response)?;
                    debug!(attempt, dtcs = table.len(), "Active DTCs read");
                    return Ok(Some(table));
                }
                None => {
                    debug!(attempt, attempts = self.attempts, "No answer to DTC read");
                }
            }
        }

        warn!(
            attempts = self.attempts,
            status_mask = format!("0x{:02X}", status_mask),
            "ECU did not answer DTC read"
        );
        Ok(None)
    }

    /// Active DTCs with the configured status mask
    pub fn read_default_active_dtcs(&self) -> DiagResult<Option<DtcTable>> {
        self.read_active_dtcs(self.status_mask)
    }

    /// ReadDTCInformation supported DTCs (single attempt)
    pub fn read_supported_dtcs(&self) -> DiagResult<Option<DtcTable>> {
        let request = [
            service_id::READ_DTC_INFO,
            sub_function::REPORT_SUPPORTED_DTC,
        ];
        self.connection
            .request(&request, self.timeout)?
            .map(|response| DtcTable::decode(&response))
            .transpose()
    }

    /// ECUReset hard reset; the raw answer is returned undecoded
    pub fn hard_reset(&self) -> DiagResult<Option<Vec<u8>>> {
        self.connection
            .request(&[service_id::ECU_RESET, reset_type::HARD_RESET], self.timeout)
    }
}

impl StatusOracle for DtcOracle<'_> {
    fn dtc_status(&self, id: &DtcId) -> DiagResult<DtcReading> {
        let reading = match self.read_default_active_dtcs()? {
            Some(table) => table
                .status(id)
                .map(DtcReading::Status)
                .unwrap_or(DtcReading::Missing),
            None => DtcReading::NoResponse,
        };
        debug!(dtc = %id, %reading, "DTC status");
        Ok(reading)
    }
}
