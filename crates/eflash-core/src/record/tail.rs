//! Sub-record tail metadata

use super::Record;
use crate::error::{Error, Result};
use crate::page::RECORD_PAYLOAD_LEN;

/// Length of the tail at the end of every sub-record payload
pub const TAIL_LEN: usize = 9;

/// Offset of the tail within a sub-record payload
pub(crate) const TAIL_OFFSET: usize = RECORD_PAYLOAD_LEN - TAIL_LEN;

/// Audit data stored after the record fields
///
/// Layout: record length (start byte included), timestamp (big-endian u32,
/// unlike the header copy), four reserved bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordTail {
    /// Bytes of the sub-record the firmware filled, start byte included
    pub length: u8,
    /// Copy of the capture timestamp
    pub timestamp: u32,
}

impl RecordTail {
    /// Read the tail of a sub-record payload
    pub fn parse(payload: &[u8]) -> Result<Self> {
        if payload.len() != RECORD_PAYLOAD_LEN {
            return Err(Error::InvalidLength {
                expected: RECORD_PAYLOAD_LEN,
                actual: payload.len(),
            });
        }
        let tail = &payload[TAIL_OFFSET..];
        Ok(Self {
            length: tail[0],
            timestamp: u32::from_be_bytes([tail[1], tail[2], tail[3], tail[4]]),
        })
    }

    /// Check the tail against the decoded record
    pub fn matches(&self, record: &Record) -> bool {
        self.timestamp == record.timestamp
            && usize::from(self.length) == record.event.payload_len() + 1
    }
}
