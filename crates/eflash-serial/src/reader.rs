//! Page read protocol
//!
//! One page read runs through a small state machine:
//!
//! ```text
//! Sending -> Accumulating -> Complete
//!               |
//!               v
//!          AttemptTimedOut -> Sending (attempts left, after backoff)
//!                          -> Exhausted (skip the page)
//! ```
//!
//! A response is never assumed to arrive in one read; bytes are accumulated
//! until the expected length is reached or the attempt times out.

use std::thread;
use std::time::{Duration, Instant};

use eflash_core::page::{Page, PAGE_PAYLOAD_LEN};
use eflash_core::scan::{PageRead, PageSource};

use crate::dump::{Discard, DumpSink};
use crate::error::{ReaderError, Result};
use crate::protocol;
use crate::transport::Transport;

/// Page read parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadConfig {
    /// Time allowed for one attempt
    pub timeout: Duration,
    /// Attempts per page before it is skipped
    pub max_attempts: u32,
    /// Pause between attempts
    pub backoff: Duration,
    /// Pages in flash; higher addresses are rejected
    pub total_pages: u32,
    /// Pause between polls while waiting for bytes
    pub poll_interval: Duration,
    /// Transport read timeout set before each attempt
    pub port_timeout: Duration,
}

impl Default for ReadConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            max_attempts: 3,
            backoff: Duration::from_millis(100),
            total_pages: 0x10000,
            poll_interval: Duration::from_millis(1),
            port_timeout: Duration::from_millis(500),
        }
    }
}

impl ReadConfig {
    /// Check the parameters for values that would make every read fail
    pub fn validate(&self) -> core::result::Result<(), &'static str> {
        if self.timeout.is_zero() {
            return Err("read timeout must be greater than zero");
        }
        if self.max_attempts == 0 {
            return Err("at least one read attempt is required");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Sending,
    Accumulating { started: Instant },
    AttemptTimedOut,
    Complete,
    Exhausted,
}

/// Reads pages over a [`Transport`] and appends written ones to a
/// [`DumpSink`]
pub struct PageReader<T: Transport, D: DumpSink = Discard> {
    transport: T,
    config: ReadConfig,
    sink: D,
    skipped: u32,
}

impl<T: Transport> PageReader<T> {
    /// Create a reader that keeps no dump
    pub fn new(transport: T, config: ReadConfig) -> Self {
        Self {
            transport,
            config,
            sink: Discard,
            skipped: 0,
        }
    }
}

impl<T: Transport, D: DumpSink> PageReader<T, D> {
    /// Replace the dump sink
    pub fn with_sink<S: DumpSink>(self, sink: S) -> PageReader<T, S> {
        PageReader {
            transport: self.transport,
            config: self.config,
            sink,
            skipped: self.skipped,
        }
    }

    /// Read parameters
    pub fn config(&self) -> &ReadConfig {
        &self.config
    }

    /// Pages skipped so far
    pub fn skipped(&self) -> u32 {
        self.skipped
    }

    /// The dump sink
    pub fn sink(&self) -> &D {
        &self.sink
    }

    /// Mutable access to the transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Split into transport and sink
    pub fn into_parts(self) -> (T, D) {
        (self.transport, self.sink)
    }

    /// Read the page at `address`
    ///
    /// Returns [`PageRead::Skipped`] when every attempt timed out. Written
    /// pages are appended to the sink before they are returned.
    pub fn read_page(&mut self, address: u32) -> Result<PageRead> {
        self.config.validate().map_err(ReaderError::InvalidConfig)?;
        if !self.transport.is_open() {
            return Err(ReaderError::TransportNotReady);
        }
        if address >= self.config.total_pages {
            return Err(ReaderError::InvalidAddress {
                address,
                limit: self.config.total_pages,
            });
        }

        let command = protocol::read_page_command(address);
        let expected = protocol::expected_response_len(command.len());
        let mut buf = Vec::with_capacity(expected);
        let mut attempt = 1;
        let mut state = ReadState::Sending;

        loop {
            state = match state {
                ReadState::Sending => {
                    buf.clear();
                    self.transport.set_timeout(self.config.port_timeout)?;
                    self.transport.flush_input()?;
                    self.transport.write(command.as_bytes())?;
                    log::debug!(
                        "Page 0x{:x}: attempt {}, sent {}",
                        address,
                        attempt,
                        command.trim_end()
                    );
                    ReadState::Accumulating {
                        started: Instant::now(),
                    }
                }
                ReadState::Accumulating { started } => {
                    let received = self.fill(&mut buf, expected)?;
                    if buf.len() >= expected {
                        ReadState::Complete
                    } else if started.elapsed() >= self.config.timeout {
                        ReadState::AttemptTimedOut
                    } else {
                        if received == 0 {
                            thread::sleep(self.config.poll_interval);
                        }
                        ReadState::Accumulating { started }
                    }
                }
                ReadState::AttemptTimedOut => {
                    log::warn!(
                        "Page 0x{:x}: attempt {}/{} timed out with {}/{} bytes",
                        address,
                        attempt,
                        self.config.max_attempts,
                        buf.len(),
                        expected
                    );
                    if attempt < self.config.max_attempts {
                        attempt += 1;
                        thread::sleep(self.config.backoff);
                        ReadState::Sending
                    } else {
                        ReadState::Exhausted
                    }
                }
                ReadState::Complete => return self.finish(address, &command, &buf),
                ReadState::Exhausted => {
                    self.skipped += 1;
                    log::warn!("Page 0x{:x}: giving up after {} attempts", address, attempt);
                    return Ok(PageRead::Skipped);
                }
            };
        }
    }

    /// Move buffered bytes into `buf`, never past `expected`
    fn fill(&mut self, buf: &mut Vec<u8>, expected: usize) -> Result<usize> {
        let available = self.transport.bytes_available()?;
        let wanted = available.min(expected - buf.len());
        if wanted == 0 {
            return Ok(0);
        }
        let start = buf.len();
        buf.resize(start + wanted, 0);
        let n = self.transport.read_available(&mut buf[start..])?;
        buf.truncate(start + n);
        Ok(n)
    }

    fn finish(&mut self, address: u32, command: &str, buf: &[u8]) -> Result<PageRead> {
        let (echo, rest) = buf.split_at(command.len());
        let (data, trailer) = rest.split_at(PAGE_PAYLOAD_LEN);

        if echo != command.as_bytes() {
            log::warn!(
                "Page 0x{:x}: response does not start with the command echo",
                address
            );
        }
        if trailer != protocol::TRAILER {
            log::debug!("Page 0x{:x}: unexpected trailer {:02x?}", address, trailer);
        }

        let page = Page::new(address, data.to_vec())?;
        if !page.status().is_written() {
            log::debug!("Page 0x{:x}: blank", address);
            return Ok(PageRead::Blank);
        }

        self.sink.append(&page)?;
        log::debug!("Page 0x{:x}: written", address);
        Ok(PageRead::Written(page))
    }
}

impl<T: Transport, D: DumpSink> PageSource for PageReader<T, D> {
    type Error = ReaderError;

    fn read_page(&mut self, address: u32) -> Result<PageRead> {
        PageReader::read_page(self, address)
    }
}
