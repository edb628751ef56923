//! Configuration file parsing
//!
//! Settings come from three layers: built-in defaults, an optional TOML
//! file, and command-line flags. Later layers win.
//!
//! ```toml
//! [scan]
//! start = "0x40"
//! address_space = 0x10000
//! block_size = 64
//! max_pages_per_block = 64
//! max_consecutive_skips = 8
//!
//! [read]
//! timeout_ms = 2000
//! attempts = 3
//! backoff_ms = 100
//! baud = 460800
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eflash_core::scan::ScanConfig;
use eflash_serial::ReadConfig;
use thiserror::Error;

use crate::cli::{ReadArgs, ScanArgs};

/// File looked up in the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "eflash.toml";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Config file is not valid
    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Configuration file structure
#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub scan: ScanSection,
    #[serde(default)]
    pub read: ReadSection,
}

/// `[scan]` table
#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScanSection {
    #[serde(default, deserialize_with = "deserialize_opt_hex_u32")]
    pub start: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_opt_hex_u32")]
    pub address_space: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_opt_hex_u32")]
    pub block_size: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_opt_hex_u32")]
    pub max_pages_per_block: Option<u32>,
    #[serde(default)]
    pub max_consecutive_skips: Option<u32>,
}

/// `[read]` table
#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadSection {
    pub timeout_ms: Option<u64>,
    pub attempts: Option<u32>,
    pub backoff_ms: Option<u64>,
    pub baud: Option<u32>,
}

/// Deserialize an optional u32 that can be hex (0x...) or decimal
fn deserialize_opt_hex_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    // Try to deserialize as a number first, then as a string
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum HexOrInt {
        Int(u32),
        Str(String),
    }

    match HexOrInt::deserialize(deserializer)? {
        HexOrInt::Int(n) => Ok(Some(n)),
        HexOrInt::Str(s) => parse_number(&s).map(Some).map_err(serde::de::Error::custom),
    }
}

/// Parse a number that can be hex (0x...) or decimal
fn parse_number(s: &str) -> Result<u32, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("invalid hex: {}", e))
    } else {
        s.parse().map_err(|e| format!("invalid number: {}", e))
    }
}

impl ConfigFile {
    /// Load a configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse a configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load the file given on the command line, or the default file if present
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            let config = Self::from_toml_file(path)?;
            log::info!("Loaded configuration from {}", path.display());
            return Ok(config);
        }

        let default = Path::new(DEFAULT_CONFIG_FILE);
        if default.is_file() {
            let config = Self::from_toml_file(default)?;
            log::debug!("Loaded configuration from {}", default.display());
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Scan parameters with command-line overrides applied
    pub fn scan_config(&self, args: &ScanArgs) -> ScanConfig {
        let defaults = ScanConfig::default();
        let file = &self.scan;
        ScanConfig {
            start_address: args.start.or(file.start).unwrap_or(defaults.start_address),
            address_space: args
                .address_space
                .or(file.address_space)
                .unwrap_or(defaults.address_space),
            block_size: args
                .block_size
                .or(file.block_size)
                .unwrap_or(defaults.block_size),
            max_pages_per_block: args
                .max_pages
                .or(file.max_pages_per_block)
                .unwrap_or(defaults.max_pages_per_block),
            max_consecutive_skips: args.max_skips.or(file.max_consecutive_skips),
        }
    }

    /// Read parameters with command-line overrides applied
    ///
    /// The reader rejects addresses past the scanned address space.
    pub fn read_config(&self, args: &ReadArgs, address_space: u32) -> ReadConfig {
        let defaults = ReadConfig::default();
        let file = &self.read;
        ReadConfig {
            timeout: args
                .timeout_ms
                .or(file.timeout_ms)
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
            max_attempts: args
                .attempts
                .or(file.attempts)
                .unwrap_or(defaults.max_attempts),
            backoff: args
                .backoff_ms
                .or(file.backoff_ms)
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff),
            total_pages: address_space,
            ..defaults
        }
    }

    /// Baud rate for serial devices without one in the device string
    pub fn baud(&self, args: &ReadArgs) -> Option<u32> {
        args.baud.or(self.read.baud)
    }
}
