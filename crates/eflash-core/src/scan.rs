//! Flash scan driver
//!
//! Reading every page of the flash one by one is too slow, and erased regions
//! are contiguous at block granularity. The scan therefore runs in two phases:
//!
//! 1. **Block skip** - probe one page per block, jumping `block_size` pages
//!    while the probed page is not written.
//! 2. **Linear** - from the first written page, read forward one page at a
//!    time until a blank page, the per-block cap, or the end of the address
//!    space.
//!
//! Pages come from a [`PageSource`], which hides the transport and retry
//! logic. Written pages are framed and decoded as they arrive; a framing error
//! aborts the scan, a record that fails to decode is kept as a per-record
//! error.

use alloc::vec::Vec;
use core::fmt;

use crate::error::Error;
use crate::page::{FramedPage, Page, PageStatus};
use crate::record::{decode_record, Record, RecordTail};

/// Outcome of reading one page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRead {
    /// Page holds data
    Written(Page),
    /// Page is erased
    Blank,
    /// Every attempt failed; nothing is known about the page
    Skipped,
}

/// Something that reads pages by address
pub trait PageSource {
    /// Fatal error type; recoverable failures are reported as
    /// [`PageRead::Skipped`]
    type Error;

    /// Read the page at `address`
    fn read_page(&mut self, address: u32) -> Result<PageRead, Self::Error>;
}

impl<S: PageSource + ?Sized> PageSource for &mut S {
    type Error = S::Error;

    fn read_page(&mut self, address: u32) -> Result<PageRead, Self::Error> {
        (**self).read_page(address)
    }
}

/// Scan parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// First page probed
    pub start_address: u32,
    /// Number of pages in flash; addresses at or past this end the scan
    pub address_space: u32,
    /// Stride of the block-skip phase
    pub block_size: u32,
    /// Most pages read in the linear phase, first written page included
    pub max_pages_per_block: u32,
    /// Stop after this many skipped pages in a row (`None` never stops)
    pub max_consecutive_skips: Option<u32>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            start_address: 0x40,
            address_space: 0x10000,
            block_size: 64,
            max_pages_per_block: 64,
            max_consecutive_skips: None,
        }
    }
}

impl ScanConfig {
    /// Check the parameters for values that would stall the scan
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.block_size == 0 {
            return Err("block size must be at least 1");
        }
        if self.max_pages_per_block == 0 {
            return Err("max pages per block must be at least 1");
        }
        if self.max_consecutive_skips == Some(0) {
            return Err("max consecutive skips must be at least 1");
        }
        Ok(())
    }
}

/// Why a scan stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationReason {
    /// Linear phase reached a blank page
    BlankFound,
    /// Ran past the last page of the address space
    AddressSpaceExhausted,
    /// Linear phase read `max_pages_per_block` pages
    PageLimitReached,
    /// Too many pages in a row were skipped
    ReadError,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlankFound => write!(f, "blank page found"),
            Self::AddressSpaceExhausted => write!(f, "address space exhausted"),
            Self::PageLimitReached => write!(f, "page limit reached"),
            Self::ReadError => write!(f, "too many read errors"),
        }
    }
}

/// One decoded sub-record
#[derive(Debug, Clone, PartialEq)]
pub struct RecordEntry {
    /// Index of the sub-record within its page
    pub slot: usize,
    /// Decoded record, or why it could not be decoded
    pub record: Result<Record, Error>,
    /// Audit data from the end of the sub-record
    pub tail: RecordTail,
}

/// All sub-records of a written page
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPage {
    /// Page index in flash
    pub address: u32,
    /// One entry per sub-record
    pub entries: Vec<RecordEntry>,
}

/// Frame and decode one page
///
/// Returns `Ok(None)` for a blank page and `Err` only for framing failures;
/// decode failures are stored in the entries.
pub fn decode_page(address: u32, data: &[u8]) -> Result<Option<DecodedPage>, Error> {
    let slots = match crate::page::split_page(data)? {
        FramedPage::Blank => return Ok(None),
        FramedPage::Written(slots) => slots,
    };

    let mut entries = Vec::with_capacity(slots.len());
    for (slot, payload) in slots.iter().enumerate() {
        let record = decode_record(payload);
        if let Err(e) = &record {
            log::warn!("page 0x{:x} record {}: {}", address, slot, e);
        }
        entries.push(RecordEntry {
            slot,
            record,
            tail: RecordTail::parse(payload)?,
        });
    }

    Ok(Some(DecodedPage { address, entries }))
}

/// Result of a scan
#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    /// Decoded written pages, in address order
    pub pages: Vec<DecodedPage>,
    /// Written pages captured
    pub pages_read: u32,
    /// Pages requested from the source, whatever the outcome
    pub pages_probed: u32,
    /// Pages skipped after exhausting their read attempts
    pub skipped: u32,
    /// Last page requested
    pub last_address: Option<u32>,
    /// Last written page captured
    pub last_written: Option<u32>,
    /// Why the scan stopped
    pub termination: TerminationReason,
}

impl ScanReport {
    /// Successfully decoded records as `(page, slot, record)`
    pub fn records(&self) -> impl Iterator<Item = (u32, usize, &Record)> + '_ {
        self.pages.iter().flat_map(|page| {
            page.entries.iter().filter_map(move |entry| {
                entry
                    .record
                    .as_ref()
                    .ok()
                    .map(|record| (page.address, entry.slot, record))
            })
        })
    }

    /// Number of sub-records that failed to decode
    pub fn decode_errors(&self) -> usize {
        self.pages
            .iter()
            .flat_map(|page| page.entries.iter())
            .filter(|entry| entry.record.is_err())
            .count()
    }
}

/// Fatal scan errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanError<E> {
    /// Scan parameters are unusable
    InvalidConfig(&'static str),
    /// The page source failed
    Source(E),
    /// A written page could not be framed
    Framing {
        /// Page that failed
        address: u32,
        /// Framing failure
        error: Error,
    },
}

impl<E: fmt::Display> fmt::Display for ScanError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid scan configuration: {}", msg),
            Self::Source(e) => write!(f, "{}", e),
            Self::Framing { address, error } => {
                write!(f, "page 0x{:x} is corrupt: {}", address, error)
            }
        }
    }
}

#[cfg(feature = "std")]
impl<E: std::error::Error + 'static> std::error::Error for ScanError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidConfig(_) => None,
            Self::Source(e) => Some(e),
            Self::Framing { error, .. } => Some(error),
        }
    }
}

/// Running state of one scan
struct ScanState {
    pages: Vec<DecodedPage>,
    pages_read: u32,
    pages_probed: u32,
    skipped: u32,
    consecutive_skips: u32,
    last_address: Option<u32>,
    last_written: Option<u32>,
}

impl ScanState {
    fn new() -> Self {
        Self {
            pages: Vec::new(),
            pages_read: 0,
            pages_probed: 0,
            skipped: 0,
            consecutive_skips: 0,
            last_address: None,
            last_written: None,
        }
    }

    /// Read one page and fold the outcome into the state
    ///
    /// Returns `None` when the page was skipped.
    fn probe<S: PageSource + ?Sized>(
        &mut self,
        source: &mut S,
        address: u32,
    ) -> Result<Option<PageStatus>, ScanError<S::Error>> {
        self.pages_probed += 1;
        self.last_address = Some(address);

        match source.read_page(address).map_err(ScanError::Source)? {
            PageRead::Written(page) => {
                self.consecutive_skips = 0;
                let decoded = decode_page(address, page.data())
                    .map_err(|error| ScanError::Framing { address, error })?;
                if let Some(decoded) = decoded {
                    self.pages.push(decoded);
                }
                self.pages_read += 1;
                self.last_written = Some(address);
                Ok(Some(PageStatus::Written))
            }
            PageRead::Blank => {
                self.consecutive_skips = 0;
                Ok(Some(PageStatus::Blank))
            }
            PageRead::Skipped => {
                self.skipped += 1;
                self.consecutive_skips += 1;
                log::warn!("page 0x{:x} skipped ({} so far)", address, self.skipped);
                Ok(None)
            }
        }
    }

    fn skip_limit_hit(&self, config: &ScanConfig) -> bool {
        config
            .max_consecutive_skips
            .is_some_and(|limit| self.consecutive_skips >= limit)
    }

    fn finish(self, termination: TerminationReason) -> ScanReport {
        log::info!(
            "scan finished: {} ({} pages read, {} skipped)",
            termination,
            self.pages_read,
            self.skipped
        );
        ScanReport {
            pages: self.pages,
            pages_read: self.pages_read,
            pages_probed: self.pages_probed,
            skipped: self.skipped,
            last_address: self.last_address,
            last_written: self.last_written,
            termination,
        }
    }
}

/// Scan the flash for written pages
pub fn scan_flash<S: PageSource + ?Sized>(
    source: &mut S,
    config: &ScanConfig,
) -> Result<ScanReport, ScanError<S::Error>> {
    config.validate().map_err(ScanError::InvalidConfig)?;

    let mut state = ScanState::new();
    let mut address = config.start_address;

    // Block-skip phase
    let first = loop {
        if address >= config.address_space {
            return Ok(state.finish(TerminationReason::AddressSpaceExhausted));
        }
        let status = state.probe(source, address)?;
        if state.skip_limit_hit(config) {
            return Ok(state.finish(TerminationReason::ReadError));
        }
        if status == Some(PageStatus::Written) {
            break address;
        }
        log::debug!("page 0x{:x} not written, skipping a block", address);
        address = match address.checked_add(config.block_size) {
            Some(next) => next,
            None => return Ok(state.finish(TerminationReason::AddressSpaceExhausted)),
        };
    };

    log::info!("found written data at page 0x{:x}", first);

    // Linear phase
    let cap = u64::from(first) + u64::from(config.max_pages_per_block);
    let mut address = u64::from(first) + 1;
    loop {
        if address >= cap {
            return Ok(state.finish(TerminationReason::PageLimitReached));
        }
        if address >= u64::from(config.address_space) {
            return Ok(state.finish(TerminationReason::AddressSpaceExhausted));
        }
        // address < address_space, so it fits in u32
        let status = state.probe(source, address as u32)?;
        if state.skip_limit_hit(config) {
            return Ok(state.finish(TerminationReason::ReadError));
        }
        if status == Some(PageStatus::Blank) {
            return Ok(state.finish(TerminationReason::BlankFound));
        }
        address += 1;
    }
}
