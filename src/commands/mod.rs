//! CLI command implementations
//!
//! `dump` talks to a device and writes the capture files; `decode` works
//! offline on those files.

pub mod decode;
pub mod dump;
mod list;

pub use list::list_devices;
