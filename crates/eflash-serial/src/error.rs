//! Error types for the reader and the AT shell

use thiserror::Error;

/// Errors from the transport, the page read protocol and the AT shell
#[derive(Debug, Error)]
pub enum ReaderError {
    /// The transport is closed
    #[error("Transport is not open")]
    TransportNotReady,

    /// Page address past the end of flash
    #[error("Page address 0x{address:x} out of range (flash has 0x{limit:x} pages)")]
    InvalidAddress { address: u32, limit: u32 },

    /// Read parameters are unusable
    #[error("Invalid read configuration: {0}")]
    InvalidConfig(&'static str),

    /// No complete response in time
    #[error("Communication timeout")]
    Timeout,

    /// Device answered with an error line
    #[error("Device reported error {0}")]
    AtError(String),

    /// Device answered with something that does not fit the command
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// I/O error during communication or while writing the dump
    #[error("I/O error: {0}")]
    IoError(String),

    /// Serial port error
    #[error("Serial port error: {0}")]
    SerialError(#[from] serialport::Error),

    /// Page or record could not be handled
    #[error(transparent)]
    Core(#[from] eflash_core::Error),
}

/// Result type for reader operations
pub type Result<T> = core::result::Result<T, ReaderError>;

impl From<std::io::Error> for ReaderError {
    fn from(e: std::io::Error) -> Self {
        ReaderError::IoError(e.to_string())
    }
}
