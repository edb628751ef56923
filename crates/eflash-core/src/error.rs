//! Error types for eflash-core
//!
//! This module provides a no_std compatible error type shared by the page
//! framer and the record decoder.

use core::fmt;

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Framing errors
    /// A sub-record of a written page does not start with the start byte
    Framing {
        /// Index of the offending sub-record within the page (0-7)
        slot: usize,
    },

    // Decode errors
    /// A lookup-table index read from a record is out of range
    InvalidEnumIndex {
        /// Name of the lookup table
        table: &'static str,
        /// The index found in the record
        index: u8,
    },
    /// Input buffer does not have the length the operation requires
    InvalidLength {
        /// Required length in bytes
        expected: usize,
        /// Length that was provided
        actual: usize,
    },
    /// Hex text could not be converted to bytes
    InvalidHex,
}

impl Error {
    /// Returns true if this error was raised while framing a page, as opposed
    /// to decoding an already framed record
    pub fn is_framing(&self) -> bool {
        matches!(self, Self::Framing { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Framing { slot } => {
                write!(f, "sub-record {} is missing its start byte", slot)
            }
            Self::InvalidEnumIndex { table, index } => {
                write!(f, "index {} is out of range for the {} table", index, table)
            }
            Self::InvalidLength { expected, actual } => {
                write!(f, "expected {} bytes, got {}", expected, actual)
            }
            Self::InvalidHex => write!(f, "invalid hex text"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
