//! eflash-serial - AT command transport and page read protocol
//!
//! This crate talks to the sensor over its AT command port and reads the
//! external flash one page at a time.
//!
//! # Protocol Overview
//!
//! The device speaks line-oriented AT commands (`AT+<cmd>[=<args>]\r\n`),
//! echoes each command and ends successful responses with an `O` line. A
//! page read (`AT+EFLASHRP=<page>;0;840`) is answered with the echo, 2112 raw
//! bytes of page data and `O\r\n`.
//!
//! # Example
//!
//! ```no_run
//! use eflash_core::scan::{scan_flash, ScanConfig};
//! use eflash_serial::{AtShell, FileDump, PageReader, ReadConfig, SerialTransport};
//! use std::time::Duration;
//!
//! let transport = SerialTransport::open("/dev/ttyUSB0", None)?;
//! let mut shell = AtShell::new(transport);
//! shell.enter_test_mode(5, Duration::from_millis(500), Duration::from_secs(3))?;
//!
//! let mut reader = PageReader::new(shell.into_inner(), ReadConfig::default())
//!     .with_sink(FileDump::create("dump")?);
//! let report = scan_flash(&mut reader, &ScanConfig::default())?;
//! println!("{} pages read", report.pages_read);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod at;
pub mod dump;
pub mod error;
pub mod protocol;
pub mod reader;
pub mod transport;

// Re-exports
pub use at::AtShell;
pub use dump::{Discard, DumpSink, FileDump, MemoryDump};
pub use error::{ReaderError, Result};
pub use reader::{PageReader, ReadConfig};
pub use transport::listener::ListenerTransport;
pub use transport::serial::{SerialTransport, DEFAULT_BAUD};
pub use transport::Transport;

/// Serial connection options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConnection {
    /// Device path (e.g., "/dev/ttyUSB0" or "COM1")
    pub device: String,
    /// Baud rate (None for the sensor default)
    pub baud: Option<u32>,
}

impl SerialConnection {
    /// Parse a connection string
    ///
    /// Formats:
    /// - `dev=/dev/ttyUSB0` - default baud
    /// - `dev=/dev/ttyUSB0:460800` - specified baud
    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        let dev = s
            .strip_prefix("dev=")
            .ok_or_else(|| format!("Invalid serial connection string: {}. Use dev=...", s))?;

        if let Some((device, baud_str)) = dev.rsplit_once(':') {
            if let Ok(baud) = baud_str.parse() {
                return Ok(SerialConnection {
                    device: device.to_string(),
                    baud: Some(baud),
                });
            }
            if baud_str.bytes().all(|b| b.is_ascii_digit()) {
                return Err(format!("Invalid baud rate: {}", baud_str));
            }
        }

        if dev.is_empty() {
            return Err("Missing device path in dev= parameter".to_string());
        }
        Ok(SerialConnection {
            device: dev.to_string(),
            baud: None,
        })
    }
}

/// Open a serial transport from a connection string
pub fn open_serial(options: &str) -> std::result::Result<SerialTransport, Box<dyn std::error::Error>> {
    let conn = SerialConnection::parse(options)?;
    Ok(SerialTransport::open(&conn.device, conn.baud)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_connection() {
        assert_eq!(
            SerialConnection::parse("dev=/dev/ttyUSB0").unwrap(),
            SerialConnection {
                device: "/dev/ttyUSB0".to_string(),
                baud: None
            }
        );
        assert_eq!(
            SerialConnection::parse("dev=/dev/ttyACM0:115200").unwrap(),
            SerialConnection {
                device: "/dev/ttyACM0".to_string(),
                baud: Some(115200)
            }
        );
        assert_eq!(
            SerialConnection::parse("dev=COM3").unwrap().device,
            "COM3"
        );
    }

    #[test]
    fn test_parse_connection_errors() {
        assert!(SerialConnection::parse("/dev/ttyUSB0").is_err());
        assert!(SerialConnection::parse("dev=").is_err());
        assert!(SerialConnection::parse("dev=/dev/ttyUSB0:99999999999").is_err());
    }
}
