//! CAN frame and filter types shared by the bus and the probes

use std::fmt;

use crate::error::DiagError;

/// Largest 11-bit (standard) arbitration ID
pub const MAX_STANDARD_ID: u32 = 0x7FF;
/// Largest 29-bit (extended) arbitration ID
pub const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;
/// Classic CAN payload limit
pub const MAX_PAYLOAD: usize = 8;

/// Arbitration identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanId {
    /// 11-bit identifier
    Standard(u16),
    /// 29-bit identifier
    Extended(u32),
}

impl CanId {
    /// 11-bit identifier, `None` if out of range
    pub fn standard(id: u16) -> Option<Self> {
        (u32::from(id) <= MAX_STANDARD_ID).then_some(Self::Standard(id))
    }

    /// 29-bit identifier, `None` if out of range
    pub fn extended(id: u32) -> Option<Self> {
        (id <= MAX_EXTENDED_ID).then_some(Self::Extended(id))
    }

    /// Raw numeric value
    pub fn raw(&self) -> u32 {
        match *self {
            CanId::Standard(id) => u32::from(id),
            CanId::Extended(id) => id,
        }
    }
}

impl fmt::Display for CanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanId::Standard(id) => write!(f, "0x{:03X}", id),
            CanId::Extended(id) => write!(f, "0x{:08X}", id),
        }
    }
}

/// Whether a frame was transmitted by us or observed on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

/// A classic CAN data frame
///
/// Frames are immutable once built; the constructors reject payloads longer
/// than [`MAX_PAYLOAD`] bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanFrame {
    id: CanId,
    data: Vec<u8>,
    direction: Direction,
}

impl CanFrame {
    /// Frame to be transmitted
    pub fn new(id: CanId, data: &[u8]) -> Result<Self, DiagError> {
        Self::with_direction(id, data, Direction::Sent)
    }

    /// Frame observed on the bus
    pub fn received(id: CanId, data: &[u8]) -> Result<Self, DiagError> {
        Self::with_direction(id, data, Direction::Received)
    }

    /// Standard-ID frame to be transmitted
    pub fn standard(id: u16, data: &[u8]) -> Result<Self, DiagError> {
        let can_id = CanId::standard(id)
            .ok_or_else(|| DiagError::InvalidFrame(format!("0x{:X} is not an 11-bit ID", id)))?;
        Self::new(can_id, data)
    }

    fn with_direction(id: CanId, data: &[u8], direction: Direction) -> Result<Self, DiagError> {
        if data.len() > MAX_PAYLOAD {
            return Err(DiagError::InvalidFrame(format!(
                "payload of {} bytes exceeds {} bytes",
                data.len(),
                MAX_PAYLOAD
            )));
        }
        Ok(Self {
            id,
            data: data.to_vec(),
            direction,
        })
    }

    pub fn id(&self) -> CanId {
        self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.id, self.data.len(), hex::encode(&self.data))
    }
}

/// Receive filter entry: a frame passes when `frame_id & mask == id & mask`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusFilter {
    pub id: u32,
    pub mask: u32,
}

impl BusFilter {
    pub fn new(id: u32, mask: u32) -> Self {
        Self { id, mask }
    }

    /// Check whether a frame ID passes this filter
    pub fn matches(&self, frame_id: u32) -> bool {
        frame_id & self.mask == self.id & self.mask
    }
}

/// Check a frame ID against a filter list (empty list accepts everything)
pub fn filters_accept(filters: &[BusFilter], frame_id: u32) -> bool {
    filters.is_empty() || filters.iter().any(|f| f.matches(frame_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_id_range() {
        assert_eq!(CanId::standard(0x7FF), Some(CanId::Standard(0x7FF)));
        assert_eq!(CanId::standard(0x800), None);
        assert_eq!(CanId::extended(0x1FFF_FFFF).map(|id| id.raw()), Some(0x1FFF_FFFF));
        assert_eq!(CanId::extended(0x2000_0000), None);
    }

    #[test]
    fn test_frame_rejects_long_payload() {
        let err = CanFrame::standard(0x3FD, &[0; 9]).unwrap_err();
        assert!(matches!(err, DiagError::InvalidFrame(_)));

        let frame = CanFrame::standard(0x3FD, &[1, 2, 3]).unwrap();
        assert_eq!(frame.data(), &[1, 2, 3]);
        assert_eq!(frame.direction(), Direction::Sent);
        assert_eq!(frame.to_string(), "0x3FD [3] 010203");
    }

    #[test]
    fn test_filters() {
        let filters = [BusFilter::new(0x65E, 0x0FFF_FFFF)];
        assert!(filters_accept(&filters, 0x65E));
        assert!(!filters_accept(&filters, 0x3FD));
        assert!(filters_accept(&[], 0x3FD));
    }
}
