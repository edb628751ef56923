//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

#[derive(Parser)]
#[command(name = "eflash")]
#[command(author, version, about = "Sensor external flash reader", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Configuration file (TOML format)
    /// Defaults to ./eflash.toml when present
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Scan options, each overriding the configuration file
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ScanArgs {
    /// First page to probe (hex, e.g., 0x40)
    #[arg(long, value_parser = parse_hex_u32)]
    pub start: Option<u32>,

    /// Number of pages in flash (hex or decimal)
    #[arg(long, value_parser = parse_hex_u32)]
    pub address_space: Option<u32>,

    /// Pages skipped per probe while searching for data
    #[arg(long, value_parser = parse_hex_u32)]
    pub block_size: Option<u32>,

    /// Most pages read once data is found
    #[arg(long, value_parser = parse_hex_u32)]
    pub max_pages: Option<u32>,

    /// Stop after this many unreadable pages in a row
    #[arg(long)]
    pub max_skips: Option<u32>,
}

/// Page read options, each overriding the configuration file
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ReadArgs {
    /// Time allowed for one page read attempt, in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Attempts per page before it is skipped
    #[arg(long)]
    pub attempts: Option<u32>,

    /// Pause between attempts, in milliseconds
    #[arg(long)]
    pub backoff_ms: Option<u64>,

    /// Serial baud rate when the device string has none
    #[arg(long)]
    pub baud: Option<u32>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct DumpArgs {
    /// Device to read from: serial:dev=<port>[:<baud>] or dummy[:pages=<n>]
    #[arg(short, long)]
    pub device: String,

    /// Output file stem; writes <stem>.bin and <stem>.txt
    #[arg(short, long)]
    pub output: PathBuf,

    /// Append to existing dump files instead of replacing them
    #[arg(long)]
    pub append: bool,

    /// Don't put the device in test mode first
    #[arg(long)]
    pub no_test_mode: bool,

    /// Read the serial port from a background thread
    #[arg(long)]
    pub listener: bool,

    /// Print every decoded record after the scan
    #[arg(long)]
    pub print_records: bool,

    #[command(flatten)]
    pub scan: ScanArgs,

    #[command(flatten)]
    pub read: ReadArgs,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan the flash and dump written pages
    Dump(DumpArgs),

    /// Decode a dump file or a single record
    Decode {
        /// Dump file (.bin, or .txt for hex)
        #[arg(short, long, required_unless_present = "record")]
        input: Option<PathBuf>,

        /// Treat the input as hex text regardless of its extension
        #[arg(long)]
        hex: bool,

        /// Decode one record payload given as hex
        #[arg(long, conflicts_with = "input")]
        record: Option<String>,
    },

    /// List supported devices
    ListDevices,
}
