//! Page layout and framing
//!
//! A page of the sensor's external flash holds 2112 content bytes: eight
//! 256-byte sub-records followed by a 64-byte spare region. Each sub-record
//! starts with [`START_BYTE`]; erased flash reads back as `0xFF`, so a page
//! whose first byte is anything else is blank.
//!
//! ```text
//! +--------+--------+-----+--------+-------+
//! | rec 0  | rec 1  | ... | rec 7  | spare |
//! | 256 B  | 256 B  |     | 256 B  | 64 B  |
//! +--------+--------+-----+--------+-------+
//! ```

#[cfg(feature = "alloc")]
use alloc::{string::String, vec::Vec};

use crate::error::{Error, Result};

/// Number of content bytes in a page, framing excluded
pub const PAGE_PAYLOAD_LEN: usize = 2112;

/// Marker byte that opens every written page and sub-record
pub const START_BYTE: u8 = 0x07;

/// Length of one sub-record, start byte included
pub const RECORD_LENGTH_BYTES: usize = 256;

/// Length of a sub-record payload once the start byte is stripped
pub const RECORD_PAYLOAD_LEN: usize = RECORD_LENGTH_BYTES - 1;

/// Number of sub-records in a page
pub const RECORDS_PER_PAGE: usize = 8;

/// Trailing spare region excluded from sub-record slicing
pub const SPARE_LEN: usize = 64;

const _: () = assert!(RECORDS_PER_PAGE * RECORD_LENGTH_BYTES + SPARE_LEN == PAGE_PAYLOAD_LEN);

/// Whether a page holds data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageStatus {
    /// Erased flash (first byte is not the start byte)
    Blank,
    /// Page carries records
    Written,
}

impl PageStatus {
    /// Returns true for [`PageStatus::Written`]
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written)
    }
}

/// Classify page content as blank or written
pub fn page_status(page: &[u8]) -> PageStatus {
    match page.first() {
        Some(&START_BYTE) => PageStatus::Written,
        _ => PageStatus::Blank,
    }
}

/// A page split into its sub-record payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramedPage<'a> {
    /// Blank page, nothing to decode
    Blank,
    /// Written page with the eight sub-record payloads, start bytes stripped
    Written([&'a [u8]; RECORDS_PER_PAGE]),
}

/// Split a page into sub-record payloads
///
/// Every sub-record of a written page must begin with [`START_BYTE`]. A
/// written page with a malformed slot means the capture is out of sync with
/// the device or the memory is corrupt, so it is reported as
/// [`Error::Framing`] rather than skipped.
pub fn split_page(page: &[u8]) -> Result<FramedPage<'_>> {
    if page.len() != PAGE_PAYLOAD_LEN {
        return Err(Error::InvalidLength {
            expected: PAGE_PAYLOAD_LEN,
            actual: page.len(),
        });
    }

    if page_status(page) == PageStatus::Blank {
        return Ok(FramedPage::Blank);
    }

    let body = &page[..PAGE_PAYLOAD_LEN - SPARE_LEN];
    for (slot, chunk) in body.chunks_exact(RECORD_LENGTH_BYTES).enumerate() {
        if chunk[0] != START_BYTE {
            log::debug!("framing: slot {} starts with 0x{:02X}", slot, chunk[0]);
            return Err(Error::Framing { slot });
        }
    }

    let slots = core::array::from_fn(|slot| {
        let start = slot * RECORD_LENGTH_BYTES;
        &body[start + 1..start + RECORD_LENGTH_BYTES]
    });

    Ok(FramedPage::Written(slots))
}

/// Split a raw dump (concatenated pages) into pages
pub fn split_dump(dump: &[u8]) -> Result<core::slice::ChunksExact<'_, u8>> {
    if dump.len() % PAGE_PAYLOAD_LEN != 0 {
        return Err(Error::InvalidLength {
            expected: (dump.len() / PAGE_PAYLOAD_LEN + 1) * PAGE_PAYLOAD_LEN,
            actual: dump.len(),
        });
    }
    Ok(dump.chunks_exact(PAGE_PAYLOAD_LEN))
}

/// Convert the hex text form of a dump back into bytes
///
/// Surrounding whitespace is ignored.
#[cfg(feature = "alloc")]
pub fn decode_hex_dump(text: &str) -> Result<Vec<u8>> {
    hex::decode(text.trim()).map_err(|_| Error::InvalidHex)
}

/// One page of flash content as read from the device
#[cfg(feature = "alloc")]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    address: u32,
    data: Vec<u8>,
}

#[cfg(feature = "alloc")]
impl Page {
    /// Create a page from exactly [`PAGE_PAYLOAD_LEN`] content bytes
    pub fn new(address: u32, data: Vec<u8>) -> Result<Self> {
        if data.len() != PAGE_PAYLOAD_LEN {
            return Err(Error::InvalidLength {
                expected: PAGE_PAYLOAD_LEN,
                actual: data.len(),
            });
        }
        Ok(Self { address, data })
    }

    /// Page index in flash
    pub fn address(&self) -> u32 {
        self.address
    }

    /// Page content
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Blank or written
    pub fn status(&self) -> PageStatus {
        page_status(&self.data)
    }

    /// Split into sub-record payloads
    pub fn split(&self) -> Result<FramedPage<'_>> {
        split_page(&self.data)
    }

    /// Lower-case hex text of the page content
    pub fn to_hex(&self) -> String {
        hex::encode(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn written_page() -> [u8; PAGE_PAYLOAD_LEN] {
        let mut page = [0xFFu8; PAGE_PAYLOAD_LEN];
        for slot in 0..RECORDS_PER_PAGE {
            let start = slot * RECORD_LENGTH_BYTES;
            page[start] = START_BYTE;
            page[start + 1] = slot as u8;
        }
        page
    }

    #[test]
    fn test_written_page_has_eight_slots() {
        let page = written_page();
        match split_page(&page).unwrap() {
            FramedPage::Written(slots) => {
                for (slot, payload) in slots.iter().enumerate() {
                    assert_eq!(payload.len(), RECORD_LENGTH_BYTES - 1);
                    assert_eq!(payload[0], slot as u8);
                }
            }
            FramedPage::Blank => panic!("expected a written page"),
        }
    }

    #[test]
    fn test_blank_page() {
        let page = [0xFFu8; PAGE_PAYLOAD_LEN];
        assert_eq!(page_status(&page), PageStatus::Blank);
        assert_eq!(split_page(&page).unwrap(), FramedPage::Blank);

        // Anything but the start byte counts as blank, even with a valid
        // record further in
        let mut page = written_page();
        page[0] = 0x00;
        assert_eq!(split_page(&page).unwrap(), FramedPage::Blank);
    }

    #[test]
    fn test_malformed_slot_is_an_error() {
        let mut page = written_page();
        page[5 * RECORD_LENGTH_BYTES] = 0xFF;
        assert_eq!(split_page(&page), Err(Error::Framing { slot: 5 }));
    }

    #[test]
    fn test_spare_region_is_ignored() {
        let mut page = written_page();
        page[PAGE_PAYLOAD_LEN - SPARE_LEN..].fill(0xA5);
        assert!(matches!(split_page(&page), Ok(FramedPage::Written(_))));
    }

    #[test]
    fn test_wrong_length() {
        let page = [START_BYTE; 100];
        assert_eq!(
            split_page(&page),
            Err(Error::InvalidLength {
                expected: PAGE_PAYLOAD_LEN,
                actual: 100
            })
        );
    }

    #[test]
    fn test_split_dump() {
        let dump = [0u8; PAGE_PAYLOAD_LEN * 3];
        assert_eq!(split_dump(&dump).unwrap().count(), 3);
        assert!(split_dump(&dump[..PAGE_PAYLOAD_LEN + 1]).is_err());
        assert_eq!(split_dump(&[]).unwrap().count(), 0);
    }

    #[test]
    fn test_hex_dump_roundtrip() {
        let page = Page::new(0x40, written_page().to_vec()).unwrap();
        let text = page.to_hex();
        assert!(text.starts_with("0700"));
        assert_eq!(decode_hex_dump(&text).unwrap(), page.data());
        assert_eq!(decode_hex_dump("0g"), Err(Error::InvalidHex));
    }
}
