//! eflash-core - Page framing and record decoding for sensor flash dumps
//!
//! This crate turns the raw pages read from a sensor's external flash into
//! typed measurement records, and drives the page-by-page search for written
//! data. It is designed to be `no_std` compatible so the decoder can run on
//! the same targets as the device firmware.
//!
//! # Features
//!
//! - `std` - Enable standard library support (includes `alloc`, adds `jiff`
//!   timestamps)
//! - `alloc` - Enable heap allocation for the scan driver and hex helpers
//!
//! # Example
//!
//! ```ignore
//! use eflash_core::page::{split_page, FramedPage};
//! use eflash_core::record::decode_record;
//!
//! fn print_page(page: &[u8]) -> eflash_core::Result<()> {
//!     if let FramedPage::Written(slots) = split_page(page)? {
//!         for payload in slots {
//!             println!("{}", decode_record(payload)?);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod error;
pub mod page;
pub mod record;
#[cfg(feature = "alloc")]
pub mod scan;

pub use error::{Error, Result};
