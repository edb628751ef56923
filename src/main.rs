//! eflash - Sensor external flash reader
//!
//! Reads the measurement log from a sensor's external flash over its AT
//! command shell and decodes the records.
//!
//! # Architecture
//!
//! - `eflash-core` frames pages, decodes records and drives the search for
//!   written pages through the `PageSource` trait
//! - `eflash-serial` implements `PageSource` on top of any `Transport`
//!   (serial port, listener thread) and writes the dump files
//! - `eflash-dummy` emulates a sensor in memory for testing

mod cli;
mod commands;
mod config;
mod devices;

use clap::Parser;
use cli::{Cli, Commands};
use config::ConfigFile;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let config = match ConfigFile::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Dump(args) => commands::dump::run_dump(&args, &config),
        Commands::Decode { input, hex, record } => match (record, input) {
            (Some(record), _) => commands::decode::run_decode_record(&record),
            (None, Some(input)) => commands::decode::run_decode_file(&input, hex),
            (None, None) => Err("Nothing to decode".into()),
        },
        Commands::ListDevices => {
            commands::list_devices();
            Ok(())
        }
    };

    result
}
