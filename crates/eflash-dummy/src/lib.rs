//! eflash-dummy - In-memory sensor emulator for testing
//!
//! This crate provides a [`Transport`] that answers the sensor's AT command
//! set from an in-memory flash. It's useful for testing and development
//! without real hardware, and can misbehave on purpose: responses can be
//! delivered in small chunks, dropped for chosen pages, or sent without the
//! command echo.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use eflash_core::page::{PAGE_PAYLOAD_LEN, RECORDS_PER_PAGE, RECORD_LENGTH_BYTES, START_BYTE};
use eflash_core::record::{
    encode_record, Averaging, Cadence, Event, Range, Record, Sampling, VerticalAxis,
};
use eflash_core::{Error, Result};
use eflash_serial::protocol;
use eflash_serial::{ReaderError, Transport};

/// Value of erased flash
pub const ERASED: u8 = 0xFF;

/// Configuration for the emulated sensor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DummyConfig {
    /// Pages in flash
    pub total_pages: u32,
    /// Most bytes handed out per read; models a slow link
    pub chunk_size: usize,
    /// Whether commands are echoed back
    pub echo: bool,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            total_pages: 0x10000,
            chunk_size: 512,
            echo: true,
        }
    }
}

/// Emulated sensor
///
/// Pages that were never written read as erased.
pub struct DummySensor {
    config: DummyConfig,
    pages: BTreeMap<u32, Vec<u8>>,
    dropped: BTreeMap<u32, u32>,
    incoming: Vec<u8>,
    outgoing: VecDeque<u8>,
    requests: Vec<u32>,
    test_mode: bool,
    open: bool,
    timeout: Duration,
}

impl DummySensor {
    /// Create an emulator with erased flash
    pub fn new(config: DummyConfig) -> Self {
        Self {
            config,
            pages: BTreeMap::new(),
            dropped: BTreeMap::new(),
            incoming: Vec::new(),
            outgoing: VecDeque::new(),
            requests: Vec::new(),
            test_mode: false,
            open: true,
            timeout: Duration::from_secs(2),
        }
    }

    /// Create an emulator with default configuration
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Store `data` as the content of page `address`
    pub fn write_page(&mut self, address: u32, data: Vec<u8>) -> Result<()> {
        if data.len() != PAGE_PAYLOAD_LEN {
            return Err(Error::InvalidLength {
                expected: PAGE_PAYLOAD_LEN,
                actual: data.len(),
            });
        }
        self.pages.insert(address, data);
        Ok(())
    }

    /// Fill consecutive pages with synthetic records
    ///
    /// Timestamps continue from page to page, starting at `first_timestamp`.
    pub fn fill_pages(&mut self, addresses: core::ops::Range<u32>, first_timestamp: u32) {
        let mut timestamp = first_timestamp;
        for address in addresses {
            self.pages.insert(address, synthetic_page(timestamp));
            let span = RECORDS_PER_PAGE as u32 * SYNTHETIC_CADENCE.seconds();
            timestamp = timestamp.wrapping_add(span);
        }
    }

    /// Ignore the next `count` read requests for `address`
    pub fn drop_responses(&mut self, address: u32, count: u32) {
        self.dropped.insert(address, count);
    }

    /// Content of page `address` as the device would send it
    pub fn page(&self, address: u32) -> Vec<u8> {
        self.pages
            .get(&address)
            .cloned()
            .unwrap_or_else(|| vec![ERASED; PAGE_PAYLOAD_LEN])
    }

    /// Addresses of every read request received, in order
    pub fn requests(&self) -> &[u32] {
        &self.requests
    }

    /// Returns true once `AT+TST` was received
    pub fn in_test_mode(&self) -> bool {
        self.test_mode
    }

    /// Last timeout set by the host
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Simulate the port going away
    pub fn close(&mut self) {
        self.open = false;
    }

    fn respond(&mut self, bytes: &[u8]) {
        self.outgoing.extend(bytes.iter().copied());
    }

    fn echo(&mut self, line: &str) {
        if self.config.echo {
            self.respond(line.as_bytes());
            self.respond(protocol::LINE_END.as_bytes());
        }
    }

    fn handle_line(&mut self, line: &str) {
        log::trace!("Dummy: received {}", line);

        let read_prefix = protocol::command_message(protocol::READ_PAGE, None);
        let test_mode = protocol::command_message(protocol::TEST_MODE, None);

        if let Some(args) = line
            .strip_prefix(read_prefix.as_str())
            .and_then(|rest| rest.strip_prefix('='))
        {
            self.handle_read_page(line, args);
        } else if line == test_mode {
            self.test_mode = true;
            self.echo(line);
            self.respond(protocol::TRAILER);
        } else {
            log::debug!("Dummy: unknown command {}", line);
            self.echo(line);
            self.respond(b"E-1\r\n");
        }
    }

    fn handle_read_page(&mut self, line: &str, args: &str) {
        let address = match args
            .split(';')
            .next()
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
        {
            Some(address) if address < self.config.total_pages => address,
            _ => {
                self.echo(line);
                self.respond(b"E-1\r\n");
                return;
            }
        };
        self.requests.push(address);

        if let Some(remaining) = self.dropped.get_mut(&address) {
            if *remaining > 0 {
                *remaining -= 1;
                log::debug!("Dummy: dropping response for page 0x{:x}", address);
                return;
            }
        }

        let page = self.page(address);
        self.echo(line);
        self.respond(&page);
        self.respond(protocol::TRAILER);
    }
}

impl Transport for DummySensor {
    fn write(&mut self, data: &[u8]) -> eflash_serial::Result<()> {
        if !self.open {
            return Err(ReaderError::TransportNotReady);
        }
        self.incoming.extend_from_slice(data);
        while let Some(pos) = self.incoming.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.incoming.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if !line.is_empty() {
                self.handle_line(&line);
            }
        }
        Ok(())
    }

    fn bytes_available(&mut self) -> eflash_serial::Result<usize> {
        if !self.open {
            return Err(ReaderError::TransportNotReady);
        }
        Ok(self.outgoing.len().min(self.config.chunk_size))
    }

    fn read_available(&mut self, buf: &mut [u8]) -> eflash_serial::Result<usize> {
        if !self.open {
            return Err(ReaderError::TransportNotReady);
        }
        let n = buf
            .len()
            .min(self.outgoing.len())
            .min(self.config.chunk_size);
        for (dst, src) in buf.iter_mut().zip(self.outgoing.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn flush_input(&mut self) -> eflash_serial::Result<()> {
        self.outgoing.clear();
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) -> eflash_serial::Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// Cadence of the records in a synthetic page
pub const SYNTHETIC_CADENCE: Cadence = Cadence::M5;

/// Record `index` of a synthetic page starting at `first_timestamp`
pub fn synthetic_record(first_timestamp: u32, index: usize) -> Record {
    let step = index as u32;
    Record {
        timestamp: first_timestamp.wrapping_add(step * SYNTHETIC_CADENCE.seconds()),
        temperature: 20.0 + f64::from(step) * 0.25,
        vertical_axis: VerticalAxis::PosZ,
        alpha: [0.5 * f64::from(step), -1.25, 89.9999999],
        acc_peak: 1.125,
        acc_rms: 0.25,
        event: Event::Cadence {
            cadence: SYNTHETIC_CADENCE,
            sampling: Sampling {
                averaging: Averaging::Samples500,
                range: Range::G2,
            },
        },
    }
}

/// Build a written page of eight cadence records
pub fn synthetic_page(first_timestamp: u32) -> Vec<u8> {
    let mut data = vec![ERASED; PAGE_PAYLOAD_LEN];
    for slot in 0..RECORDS_PER_PAGE {
        let start = slot * RECORD_LENGTH_BYTES;
        data[start] = START_BYTE;
        data[start + 1..start + RECORD_LENGTH_BYTES]
            .copy_from_slice(&encode_record(&synthetic_record(first_timestamp, slot)));
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use eflash_core::page::{split_page, FramedPage};
    use eflash_core::record::decode_record;
    use eflash_core::scan::{scan_flash, PageRead, ScanConfig, TerminationReason};
    use eflash_serial::{AtShell, MemoryDump, PageReader, ReadConfig};
    use pretty_assertions::assert_eq;

    fn read_config() -> ReadConfig {
        ReadConfig {
            timeout: Duration::from_millis(50),
            backoff: Duration::from_millis(1),
            ..ReadConfig::default()
        }
    }

    #[test]
    fn test_synthetic_page_decodes() {
        let page = synthetic_page(1_700_000_000);
        let slots = match split_page(&page).unwrap() {
            FramedPage::Written(slots) => slots,
            FramedPage::Blank => panic!("synthetic page is blank"),
        };
        for (i, payload) in slots.iter().enumerate() {
            assert_eq!(decode_record(payload).unwrap(), synthetic_record(1_700_000_000, i));
        }
    }

    #[test]
    fn test_read_written_and_erased() {
        let mut sensor = DummySensor::new_default();
        sensor.fill_pages(0x40..0x41, 0);
        let mut reader = PageReader::new(sensor, read_config());

        assert!(matches!(reader.read_page(0x40).unwrap(), PageRead::Written(_)));
        assert_eq!(reader.read_page(0x41).unwrap(), PageRead::Blank);
    }

    #[test]
    fn test_small_chunks() {
        let mut sensor = DummySensor::new(DummyConfig {
            chunk_size: 7,
            ..DummyConfig::default()
        });
        sensor.fill_pages(0..1, 0);
        let mut reader = PageReader::new(
            sensor,
            ReadConfig {
                timeout: Duration::from_secs(5),
                ..read_config()
            },
        )
        .with_sink(MemoryDump::new());
        assert!(matches!(reader.read_page(0).unwrap(), PageRead::Written(_)));
        assert_eq!(reader.sink().bin(), &synthetic_page(0)[..]);
        assert_eq!(reader.transport_mut().timeout(), ReadConfig::default().port_timeout);
    }

    #[test]
    fn test_without_echo_response_is_short() {
        let mut sensor = DummySensor::new(DummyConfig {
            echo: false,
            ..DummyConfig::default()
        });
        sensor.fill_pages(0..1, 0);
        let mut reader = PageReader::new(sensor, read_config());
        assert_eq!(reader.read_page(0).unwrap(), PageRead::Skipped);
        assert_eq!(reader.into_parts().0.requests(), &[0, 0, 0]);
    }

    #[test]
    fn test_dropped_response_recovers() {
        let mut sensor = DummySensor::new_default();
        sensor.fill_pages(0x40..0x42, 0);
        sensor.drop_responses(0x41, 1);
        let mut reader = PageReader::new(sensor, read_config()).with_sink(MemoryDump::new());

        let report = scan_flash(&mut reader, &ScanConfig::default()).unwrap();
        assert_eq!(report.termination, TerminationReason::BlankFound);
        assert_eq!(report.pages_read, 2);
        assert_eq!(report.skipped, 0);
        assert_eq!(reader.skipped(), 0);
        assert_eq!(reader.sink().pages(), 2);

        let (sensor, _) = reader.into_parts();
        assert_eq!(sensor.requests(), &[0x40, 0x41, 0x41, 0x42]);
    }

    #[test]
    fn test_scan_finds_data_past_start() {
        let mut sensor = DummySensor::new(DummyConfig {
            total_pages: 0x200,
            ..DummyConfig::default()
        });
        sensor.fill_pages(0x80..0x83, 1_600_000_000);
        let mut reader = PageReader::new(sensor, read_config());

        let report = scan_flash(
            &mut reader,
            &ScanConfig {
                address_space: 0x200,
                ..ScanConfig::default()
            },
        )
        .unwrap();
        assert_eq!(report.pages_read, 3);
        assert_eq!(report.last_written, Some(0x82));
        assert_eq!(report.records().count(), 3 * RECORDS_PER_PAGE);
        let (_, _, first) = report.records().next().unwrap();
        assert_eq!(first.timestamp, 1_600_000_000);
        assert_eq!(reader.into_parts().0.requests(), &[0x40, 0x80, 0x81, 0x82, 0x83]);
    }

    #[test]
    fn test_at_shell() {
        let mut shell = AtShell::new(DummySensor::new_default());
        shell
            .enter_test_mode(5, Duration::ZERO, Duration::from_millis(50))
            .unwrap();
        assert!(matches!(
            shell.send_command("SN", None, Duration::from_millis(50)),
            Err(ReaderError::AtError(code)) if code == "-1"
        ));
        assert!(shell.into_inner().in_test_mode());
    }

    #[test]
    fn test_out_of_range_read() {
        let mut sensor = DummySensor::new(DummyConfig {
            total_pages: 0x10,
            ..DummyConfig::default()
        });
        sensor.write(b"AT+EFLASHRP=10;0;840\r\n").unwrap();
        let mut buf = [0u8; 64];
        let n = sensor.read_available(&mut buf).unwrap();
        assert!(buf[..n].ends_with(b"E-1\r\n"));
        assert!(sensor.requests().is_empty());
    }

    #[test]
    fn test_closed() {
        let mut sensor = DummySensor::new_default();
        sensor.close();
        assert!(!sensor.is_open());
        assert!(sensor.write(b"AT+TST\r\n").is_err());
    }
}
