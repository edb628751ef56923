//! Decode command implementation

use std::fs;
use std::path::Path;

use eflash_core::page::{decode_hex_dump, split_dump};
use eflash_core::record::decode_record_hex;
use eflash_core::scan::{decode_page, DecodedPage};

/// Decode a single sub-record payload given as hex
pub fn run_decode_record(hex: &str) -> Result<(), Box<dyn std::error::Error>> {
    let record = decode_record_hex(hex)?;
    println!("{}", record);
    Ok(())
}

/// Load a dump from disk
///
/// `.txt` files (or any file with `force_hex`) hold the hex form.
pub fn load_dump(path: &Path, force_hex: bool) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let is_hex = force_hex || path.extension().is_some_and(|ext| ext == "txt");
    if is_hex {
        let text = fs::read_to_string(path)?;
        Ok(decode_hex_dump(&text)?)
    } else {
        Ok(fs::read(path)?)
    }
}

/// Frame and decode every page of a dump
///
/// Addresses are positions in the dump, not flash addresses.
pub fn decode_dump(dump: &[u8]) -> Result<Vec<DecodedPage>, Box<dyn std::error::Error>> {
    let mut pages = Vec::new();
    for (index, data) in split_dump(dump)?.enumerate() {
        let address = index as u32;
        match decode_page(address, data) {
            Ok(Some(page)) => pages.push(page),
            Ok(None) => log::debug!("Dump page {} is blank", index),
            Err(e) => return Err(format!("Dump page {}: {}", index, e).into()),
        }
    }
    Ok(pages)
}

/// Decode a dump file and print its records
pub fn run_decode_file(path: &Path, force_hex: bool) -> Result<(), Box<dyn std::error::Error>> {
    let dump = load_dump(path, force_hex)?;
    log::info!("Decoding {} bytes from {}", dump.len(), path.display());

    let pages = decode_dump(&dump)?;
    print_pages(&pages);

    let records: usize = pages.iter().map(|p| p.entries.len()).sum();
    let errors = pages
        .iter()
        .flat_map(|p| p.entries.iter())
        .filter(|e| e.record.is_err())
        .count();
    println!();
    println!(
        "{} written pages, {} records, {} decode errors",
        pages.len(),
        records - errors,
        errors
    );
    Ok(())
}

/// Print decoded pages, one record per line
pub fn print_pages(pages: &[DecodedPage]) {
    for page in pages {
        for entry in &page.entries {
            match &entry.record {
                Ok(record) => {
                    if !entry.tail.matches(record) {
                        log::warn!(
                            "Page 0x{:x} record {}: tail does not match (length {}, timestamp {})",
                            page.address,
                            entry.slot,
                            entry.tail.length,
                            entry.tail.timestamp
                        );
                    }
                    println!("0x{:04x}.{} {}", page.address, entry.slot, record);
                }
                Err(e) => println!("0x{:04x}.{} error: {}", page.address, entry.slot, e),
            }
        }
    }
}
