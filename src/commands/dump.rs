//! Dump command implementation

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use eflash_core::scan::{scan_flash, PageRead, PageSource, ScanConfig, ScanReport};
use eflash_serial::{AtShell, DumpSink, FileDump, PageReader, ReadConfig, Transport};

use crate::cli::DumpArgs;
use crate::config::ConfigFile;
use crate::devices::{self, OpenOptions};

/// `TST` attempts before giving up on test mode
const TEST_MODE_ATTEMPTS: u32 = 5;

/// Pause before each `TST`
const TEST_MODE_DELAY: Duration = Duration::from_millis(500);

/// Wait for each `TST` answer
const TEST_MODE_TIMEOUT: Duration = Duration::from_secs(3);

fn create_spinner_style() -> Result<ProgressStyle, Box<dyn std::error::Error>> {
    Ok(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?)
}

/// Page source that reports scan progress on a spinner
pub struct ProgressSource<S> {
    inner: S,
    pb: ProgressBar,
    written: u32,
    skipped: u32,
}

impl<S: PageSource> ProgressSource<S> {
    pub fn new(inner: S) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(create_spinner_style().unwrap_or_else(|_| ProgressStyle::default_spinner()));
        pb.enable_steady_tick(Duration::from_millis(100));
        Self {
            inner,
            pb,
            written: 0,
            skipped: 0,
        }
    }

    pub fn finish(&self, report: &ScanReport) {
        self.pb.finish_with_message(format!("Scan complete: {}", report.termination));
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: PageSource> PageSource for ProgressSource<S> {
    type Error = S::Error;

    fn read_page(&mut self, address: u32) -> Result<PageRead, Self::Error> {
        self.pb.set_message(format!(
            "page 0x{:x} | {} written | {} skipped",
            address, self.written, self.skipped
        ));
        let read = self.inner.read_page(address)?;
        match read {
            PageRead::Written(_) => self.written += 1,
            PageRead::Skipped => self.skipped += 1,
            PageRead::Blank => {}
        }
        Ok(read)
    }
}

/// Scan with an open transport and write the dump files
pub fn run_scan<T: Transport, D: DumpSink>(
    transport: T,
    sink: D,
    scan: &ScanConfig,
    read: ReadConfig,
) -> Result<(ScanReport, D), Box<dyn std::error::Error>> {
    let reader = PageReader::new(transport, read).with_sink(sink);
    let mut source = ProgressSource::new(reader);
    let report = scan_flash(&mut source, scan)?;
    source.finish(&report);
    let (_, sink) = source.into_inner().into_parts();
    Ok((report, sink))
}

/// Run the dump command
pub fn run_dump(args: &DumpArgs, config: &ConfigFile) -> Result<(), Box<dyn std::error::Error>> {
    let scan = config.scan_config(&args.scan);
    let read = config.read_config(&args.read, scan.address_space);
    scan.validate()?;
    read.validate()?;

    let transport = devices::open_device(
        &args.device,
        &OpenOptions {
            baud: config.baud(&args.read),
            listener: args.listener,
        },
    )?;

    let transport = if args.no_test_mode {
        transport
    } else {
        let mut shell = AtShell::new(transport);
        shell.enter_test_mode(TEST_MODE_ATTEMPTS, TEST_MODE_DELAY, TEST_MODE_TIMEOUT)?;
        shell.into_inner()
    };

    let sink = if args.append {
        FileDump::append_to(&args.output)?
    } else {
        FileDump::create(&args.output)?
    };

    log::info!(
        "Scanning from page 0x{:x} in blocks of {} pages",
        scan.start_address,
        scan.block_size
    );
    let (report, sink) = run_scan(transport, sink, &scan, read)?;

    print_summary(&report);
    println!(
        "Wrote {} pages to {} and {}",
        sink.pages(),
        sink.bin_path().display(),
        sink.txt_path().display()
    );

    if args.print_records {
        super::decode::print_pages(&report.pages);
    }

    Ok(())
}

fn print_summary(report: &ScanReport) {
    println!("Scan result:     {}", report.termination);
    println!("Pages written:   {}", report.pages_read);
    println!("Pages probed:    {}", report.pages_probed);
    println!("Pages skipped:   {}", report.skipped);
    if let Some(address) = report.last_address {
        println!("Last page read:  0x{:x}", address);
    }
    match report.last_written {
        Some(address) => println!("Last written:    0x{:x}", address),
        None => println!("Last written:    none"),
    }
    println!("Records:         {}", report.records().count());
    if report.decode_errors() > 0 {
        println!("Decode errors:   {}", report.decode_errors());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eflash_core::scan::TerminationReason;
    use eflash_dummy::DummySensor;
    use eflash_serial::MemoryDump;

    #[test]
    fn test_run_scan_counts() {
        let mut sensor = DummySensor::new_default();
        sensor.fill_pages(0x40..0x45, 0);

        let read = ReadConfig {
            timeout: Duration::from_millis(100),
            ..ReadConfig::default()
        };
        let (report, sink) =
            run_scan(sensor, MemoryDump::new(), &ScanConfig::default(), read).unwrap();
        assert_eq!(report.termination, TerminationReason::BlankFound);
        assert_eq!(report.pages_read, 5);
        assert_eq!(sink.pages(), 5);
    }
}
