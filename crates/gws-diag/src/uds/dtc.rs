//! DTC tables returned by ReadDTCInformation (0x19)
//!
//! Both report types used here (by status mask and supported DTCs) share one
//! layout:
//!
//! ```text
//! 0x59 | sub-function | status availability mask | (DTC high, mid, low, status)*
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DiagError;

/// Sub-function codes for ReadDTCInformation (0x19)
pub mod sub_function {
    /// Report DTCs matching a status mask
    pub const REPORT_DTC_BY_STATUS_MASK: u8 = 0x02;
    /// Report supported DTCs
    pub const REPORT_SUPPORTED_DTC: u8 = 0x0A;
}

/// DTC status byte bit definitions per ISO 14229-1
pub mod status_bit {
    pub const TEST_FAILED: u8 = 0x01;
    pub const TEST_FAILED_THIS_OPERATION_CYCLE: u8 = 0x02;
    pub const PENDING_DTC: u8 = 0x04;
    pub const CONFIRMED_DTC: u8 = 0x08;
    pub const TEST_NOT_COMPLETED_SINCE_LAST_CLEAR: u8 = 0x10;
    pub const TEST_FAILED_SINCE_LAST_CLEAR: u8 = 0x20;
    pub const TEST_NOT_COMPLETED_THIS_OPERATION_CYCLE: u8 = 0x40;
    pub const WARNING_INDICATOR_REQUESTED: u8 = 0x80;
}

const POSITIVE_RESPONSE: u8 = super::positive_response(super::service_id::READ_DTC_INFO);
const HEADER_LEN: usize = 3;
const RECORD_LEN: usize = 4;

/// Short names of the status bits set in `status`, lowest bit first
pub fn status_flags(status: u8) -> Vec<&'static str> {
    const NAMES: [(u8, &str); 8] = [
        (status_bit::TEST_FAILED, "testFailed"),
        (status_bit::TEST_FAILED_THIS_OPERATION_CYCLE, "failedThisCycle"),
        (status_bit::PENDING_DTC, "pending"),
        (status_bit::CONFIRMED_DTC, "confirmed"),
        (status_bit::TEST_NOT_COMPLETED_SINCE_LAST_CLEAR, "notCompletedSinceClear"),
        (status_bit::TEST_FAILED_SINCE_LAST_CLEAR, "failedSinceClear"),
        (status_bit::TEST_NOT_COMPLETED_THIS_OPERATION_CYCLE, "notCompletedThisCycle"),
        (status_bit::WARNING_INDICATOR_REQUESTED, "warningIndicator"),
    ];
    NAMES
        .iter()
        .filter(|(bit, _)| status & bit != 0)
        .map(|(_, name)| *name)
        .collect()
}

/// 3-byte DTC number, written as six lowercase hex digits (`e09404`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DtcId([u8; 3]);

impl DtcId {
    pub const fn new(bytes: [u8; 3]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> [u8; 3] {
        self.0
    }

    /// Get the 24-bit DTC number as u32
    pub fn as_u32(&self) -> u32 {
        (u32::from(self.0[0]) << 16) | (u32::from(self.0[1]) << 8) | u32::from(self.0[2])
    }
}

impl fmt::Display for DtcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for DtcId {
    type Err = DiagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let mut bytes = [0u8; 3];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| DiagError::Config(format!("Invalid DTC id '{}': {}", s, e)))?;
        Ok(Self(bytes))
    }
}

impl Serialize for DtcId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DtcId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One DTC with its status byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DtcRecord {
    pub id: DtcId,
    pub status: u8,
}

/// Decoded ReadDTCInformation response
///
/// Records keep the order in which the ECU reported them. A DTC reported
/// twice occupies the slot of its first occurrence with the status of its
/// last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DtcTable {
    sub_function: u8,
    availability_mask: u8,
    records: Vec<DtcRecord>,
}

impl DtcTable {
    /// Build a table from records, applying the duplicate rule
    pub fn from_records(
        sub_function: u8,
        availability_mask: u8,
        records: impl IntoIterator<Item = DtcRecord>,
    ) -> Self {
        let mut table = Self {
            sub_function,
            availability_mask,
            records: Vec::new(),
        };
        for record in records {
            table.insert(record);
        }
        table
    }

    fn insert(&mut self, record: DtcRecord) {
        match self.records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => existing.status = record.status,
            None => self.records.push(record),
        }
    }

    /// Decode a raw response
    pub fn decode(response: &[u8]) -> Result<Self, DiagError> {
        decode_dtc_table(response)
    }

    /// Encode back into the response layout
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.records.len() * RECORD_LEN);
        out.extend_from_slice(&[POSITIVE_RESPONSE, self.sub_function, self.availability_mask]);
        for record in &self.records {
            out.extend_from_slice(&record.id.bytes());
            out.push(record.status);
        }
        out
    }

    pub fn sub_function(&self) -> u8 {
        self.sub_function
    }

    pub fn availability_mask(&self) -> u8 {
        self.availability_mask
    }

    pub fn records(&self) -> &[DtcRecord] {
        &self.records
    }

    /// Status byte of `id`, if reported
    pub fn status(&self, id: &DtcId) -> Option<u8> {
        self.records.iter().find(|r| r.id == *id).map(|r| r.status)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Decode a ReadDTCInformation positive response into a [`DtcTable`]
pub fn decode_dtc_table(response: &[u8]) -> Result<DtcTable, DiagError> {
    let Some(&tag) = response.first() else {
        return Err(DiagError::MalformedResponse("empty response".to_string()));
    };

    if tag != POSITIVE_RESPONSE {
        return Err(DiagError::MalformedResponse(format!(
            "expected 0x{:02X}, got 0x{:02X}",
            POSITIVE_RESPONSE, tag
        )));
    }

    if response.len() < HEADER_LEN || (response.len() - HEADER_LEN) % RECORD_LEN != 0 {
        return Err(DiagError::MalformedResponse(format!(
            "{} bytes is not a 3-byte header followed by 4-byte records",
            response.len()
        )));
    }

    let records = response[HEADER_LEN..].chunks_exact(RECORD_LEN).map(|chunk| DtcRecord {
        id: DtcId::new([chunk[0], chunk[1], chunk[2]]),
        status: chunk[3],
    });

    Ok(DtcTable::from_records(response[1], response[2], records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn id(bytes: [u8; 3]) -> DtcId {
        DtcId::new(bytes)
    }

    #[test]
    fn test_dtc_id_display_and_parse() {
        let dtc = id([0xE0, 0x94, 0x04]);
        assert_eq!(dtc.to_string(), "e09404");
        assert_eq!("e09404".parse::<DtcId>().unwrap(), dtc);
        assert_eq!("0xE09404".parse::<DtcId>().unwrap(), dtc);
        assert_eq!(dtc.as_u32(), 0xE09404);
        assert!("e094".parse::<DtcId>().is_err());
        assert!("e0940g".parse::<DtcId>().is_err());
    }

    #[test]
    fn test_decode_by_status_mask_response() {
        let response = [
            0x59, 0x02, 0xFF, // Header + status availability mask
            0xE0, 0x94, 0x04, 0x2E, // Checksum supervision
            0xE0, 0x94, 0x02, 0x2F, // Counter supervision
        ];
        let table = decode_dtc_table(&response).unwrap();

        assert_eq!(table.sub_function(), 0x02);
        assert_eq!(table.availability_mask(), 0xFF);
        assert_eq!(
            table.records(),
            &[
                DtcRecord { id: id([0xE0, 0x94, 0x04]), status: 0x2E },
                DtcRecord { id: id([0xE0, 0x94, 0x02]), status: 0x2F },
            ]
        );
        assert_eq!(table.status(&id([0xE0, 0x94, 0x04])), Some(0x2E));
        assert_eq!(table.status(&id([0x00, 0x00, 0x01])), None);
    }

    #[test]
    fn test_decode_header_only() {
        let table = decode_dtc_table(&[0x59, 0x02, 0xFF]).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_decode_yields_one_record_per_chunk() {
        for n in 0..20u8 {
            let mut response = vec![0x59, 0x02, 0xFF];
            for i in 0..n {
                response.extend_from_slice(&[0xA0, 0x00, i, i.wrapping_mul(3)]);
            }
            let table = decode_dtc_table(&response).unwrap();
            assert_eq!(table.len(), n as usize);
            assert_eq!(table.encode(), response);
        }
    }

    #[test]
    fn test_duplicate_keeps_first_position_last_status() {
        let response = [
            0x59, 0x02, 0xFF, //
            0x11, 0x11, 0x11, 0x01, //
            0x22, 0x22, 0x22, 0x02, //
            0x11, 0x11, 0x11, 0x03, //
        ];
        let table = decode_dtc_table(&response).unwrap();
        assert_eq!(
            table.records(),
            &[
                DtcRecord { id: id([0x11, 0x11, 0x11]), status: 0x03 },
                DtcRecord { id: id([0x22, 0x22, 0x22]), status: 0x02 },
            ]
        );
    }

    #[test]
    fn test_decode_rejects_empty() {
        assert!(matches!(
            decode_dtc_table(&[]),
            Err(DiagError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_decode_rejects_negative_response() {
        assert!(matches!(
            decode_dtc_table(&[0x7F, 0x19, 0x11]),
            Err(DiagError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_decode_rejects_short_header() {
        assert!(matches!(
            decode_dtc_table(&[0x59, 0x02]),
            Err(DiagError::MalformedResponse(_))
        ));
    }

    #[rstest]
    fn test_decode_rejects_partial_records(
        #[values(
            1, 2, 3, 5, 6, 7, 9, 10, 11, 13, 14, 15, 17, 18, 19, 21, 22, 23, 25, 26, 27, 29, 30,
            31, 33, 34, 35, 37, 38, 39, 41, 42, 43, 45, 46, 47, 49, 50
        )]
        body_len: usize,
    ) {
        let mut response = vec![0x59, 0x02, 0xFF];
        response.extend(std::iter::repeat(0xAB).take(body_len));
        assert!(matches!(
            decode_dtc_table(&response),
            Err(DiagError::MalformedResponse(_))
        ));
    }

    #[rstest]
    #[case(4)]
    #[case(8)]
    #[case(48)]
    fn test_decode_accepts_whole_records(#[case] body_len: usize) {
        let mut response = vec![0x59, 0x0A, 0xFF];
        response.extend((0..body_len).map(|i| i as u8));
        assert_eq!(decode_dtc_table(&response).unwrap().len(), body_len / 4);
    }

    #[test]
    fn test_status_flags() {
        assert_eq!(
            status_flags(0x2E),
            vec!["failedThisCycle", "pending", "confirmed", "failedSinceClear"]
        );
        assert!(status_flags(0x00).is_empty());
    }

    #[test]
    fn test_dtc_id_serde_as_string() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            dtc: DtcId,
        }
        let text = toml::to_string(&Wrapper { dtc: id([0xE0, 0x94, 0x02]) }).unwrap();
        assert_eq!(text.trim(), "dtc = \"e09402\"");
        let back: Wrapper = toml::from_str(&text).unwrap();
        assert_eq!(back.dtc, id([0xE0, 0x94, 0x02]));
    }
}
