//! UDS (Unified Diagnostic Services) wire constants and response helpers
//!
//! The probe only speaks two services: ECUReset and ReadDTCInformation.
//! Requests are built by the oracle; this module holds the byte values and
//! the classification of raw answers.

pub mod dtc;
mod nrc;

pub use dtc::{decode_dtc_table, DtcId, DtcRecord, DtcTable};
pub use nrc::NegativeResponseCode;

/// ECUReset (0x11) sub-functions
pub mod reset_type {
    /// Hard reset - complete shutdown and restart of ECU
    pub const HARD_RESET: u8 = 0x01;
}

/// Standard UDS service ID constants
pub mod service_id {
    pub const ECU_RESET: u8 = 0x11;
    pub const READ_DTC_INFO: u8 = 0x19;
    pub const NEGATIVE_RESPONSE: u8 = 0x7F;
}

/// Offset added to a service ID in its positive response
pub const POSITIVE_RESPONSE_OFFSET: u8 = 0x40;

/// Positive response SID for `service`
pub const fn positive_response(service: u8) -> u8 {
    service + POSITIVE_RESPONSE_OFFSET
}

/// Shape of a raw diagnostic answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UdsResponse<'a> {
    /// `service + 0x40` followed by the payload
    Positive { service_id: u8, data: &'a [u8] },
    /// `0x7F service nrc`
    Negative {
        service_id: u8,
        nrc: NegativeResponseCode,
    },
    /// Anything else (empty, truncated negative response, unknown tag)
    Unrecognized(&'a [u8]),
}

impl<'a> UdsResponse<'a> {
    /// Classify `response` as an answer to `request_sid`
    pub fn classify(request_sid: u8, response: &'a [u8]) -> Self {
        match response {
            [service_id::NEGATIVE_RESPONSE, sid, nrc, ..] => Self::Negative {
                service_id: *sid,
                nrc: NegativeResponseCode::from(*nrc),
            },
            [sid, data @ ..] if *sid == positive_response(request_sid) => Self::Positive {
                service_id: request_sid,
                data,
            },
            other => Self::Unrecognized(other),
        }
    }

    pub fn is_positive(&self) -> bool {
        matches!(self, Self::Positive { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_response_sid() {
        assert_eq!(positive_response(service_id::READ_DTC_INFO), 0x59);
        assert_eq!(positive_response(service_id::ECU_RESET), 0x51);
    }

    #[test]
    fn test_classify_responses() {
        assert_eq!(
            UdsResponse::classify(0x11, &[0x51, 0x01]),
            UdsResponse::Positive {
                service_id: 0x11,
                data: &[0x01]
            }
        );
        assert_eq!(
            UdsResponse::classify(0x11, &[0x7F, 0x11, 0x22]),
            UdsResponse::Negative {
                service_id: 0x11,
                nrc: NegativeResponseCode::ConditionsNotCorrect
            }
        );
        assert_eq!(
            UdsResponse::classify(0x11, &[0x7F, 0x11]),
            UdsResponse::Unrecognized(&[0x7F, 0x11])
        );
        assert!(!UdsResponse::classify(0x19, &[0x51, 0x01]).is_positive());
    }
}
