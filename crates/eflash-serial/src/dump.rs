//! Dump sinks for written pages
//!
//! A dump is a pair of files sharing a stem: `<stem>.bin` holds the raw bytes
//! of every written page, `<stem>.txt` the same bytes as lower-case hex
//! without separators. Both are append-only and in read order.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use eflash_core::page::Page;

use crate::error::Result;

/// Receives every written page the reader captures
pub trait DumpSink {
    /// Append one page; either both representations are stored or neither
    fn append(&mut self, page: &Page) -> Result<()>;
}

/// Sink that drops every page
#[derive(Debug, Default, Clone, Copy)]
pub struct Discard;

impl DumpSink for Discard {
    fn append(&mut self, _page: &Page) -> Result<()> {
        Ok(())
    }
}

/// Dump kept in memory
#[derive(Debug, Default, Clone)]
pub struct MemoryDump {
    bin: Vec<u8>,
    txt: String,
    pages: u32,
}

impl MemoryDump {
    /// Create an empty dump
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw bytes of all pages
    pub fn bin(&self) -> &[u8] {
        &self.bin
    }

    /// Hex text of all pages
    pub fn txt(&self) -> &str {
        &self.txt
    }

    /// Number of pages stored
    pub fn pages(&self) -> u32 {
        self.pages
    }
}

impl DumpSink for MemoryDump {
    fn append(&mut self, page: &Page) -> Result<()> {
        self.bin.extend_from_slice(page.data());
        self.txt.push_str(&page.to_hex());
        self.pages += 1;
        Ok(())
    }
}

/// Dump written to a `.bin`/`.txt` file pair
#[derive(Debug)]
pub struct FileDump {
    bin: File,
    txt: File,
    bin_path: PathBuf,
    txt_path: PathBuf,
    pages: u32,
}

impl FileDump {
    /// Create the file pair, truncating existing files
    pub fn create(stem: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(stem.as_ref(), true)
    }

    /// Open the file pair for appending, creating missing files
    pub fn append_to(stem: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(stem.as_ref(), false)
    }

    fn open_with(stem: &Path, truncate: bool) -> Result<Self> {
        let (bin_path, txt_path) = Self::paths_for(stem);
        let open = |path: &Path| {
            if truncate {
                File::create(path)?;
            }
            OpenOptions::new().create(true).append(true).open(path)
        };
        let bin = open(&bin_path)?;
        let txt = open(&txt_path)?;
        log::debug!(
            "Dump files {} and {}",
            bin_path.display(),
            txt_path.display()
        );
        Ok(Self::from_files(bin, txt, bin_path, txt_path))
    }

    fn from_files(bin: File, txt: File, bin_path: PathBuf, txt_path: PathBuf) -> Self {
        Self {
            bin,
            txt,
            bin_path,
            txt_path,
            pages: 0,
        }
    }

    /// `.bin` and `.txt` paths for a stem
    pub fn paths_for(stem: &Path) -> (PathBuf, PathBuf) {
        (stem.with_extension("bin"), stem.with_extension("txt"))
    }

    /// Path of the raw dump
    pub fn bin_path(&self) -> &Path {
        &self.bin_path
    }

    /// Path of the hex dump
    pub fn txt_path(&self) -> &Path {
        &self.txt_path
    }

    /// Pages appended through this handle
    pub fn pages(&self) -> u32 {
        self.pages
    }

    fn write_both(&mut self, page: &Page) -> std::io::Result<()> {
        self.bin.write_all(page.data())?;
        self.txt.write_all(page.to_hex().as_bytes())?;
        self.bin.flush()?;
        self.txt.flush()
    }
}

/// Cut `file` back to `len` and leave the write position there
fn truncate_to(mut file: &File, len: u64) -> std::io::Result<()> {
    if file.metadata()?.len() != len {
        file.set_len(len)?;
        file.seek(SeekFrom::Start(len))?;
    }
    Ok(())
}

impl DumpSink for FileDump {
    fn append(&mut self, page: &Page) -> Result<()> {
        let bin_len = self.bin.metadata()?.len();
        let txt_len = self.txt.metadata()?.len();

        if let Err(e) = self.write_both(page) {
            log::error!(
                "Writing page 0x{:x} to the dump failed, rolling back: {}",
                page.address(),
                e
            );
            truncate_to(&self.bin, bin_len)?;
            truncate_to(&self.txt, txt_len)?;
            return Err(e.into());
        }

        self.pages += 1;
        Ok(())
    }
}
