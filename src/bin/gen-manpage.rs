//! Render eflash man pages
//!
//! Writes `eflash.1` plus one page per subcommand (`eflash-dump.1`,
//! `eflash-decode.1`, `eflash-list-devices.1`).
//!
//! Usage: cargo run --bin gen-manpage -- [output-dir]

use clap::CommandFactory;
use std::fs;
use std::path::{Path, PathBuf};

#[path = "../cli.rs"]
mod cli;

/// Render one command to `<dir>/<title>.1` and return the path
fn render(cmd: clap::Command, title: &str, dir: &Path) -> std::io::Result<PathBuf> {
    let path = dir.join(format!("{}.1", title));
    let mut buffer = Vec::new();
    clap_mangen::Man::new(cmd).title(title).render(&mut buffer)?;
    fs::write(&path, buffer)?;
    Ok(path)
}

fn main() -> std::io::Result<()> {
    let dir = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("man"));
    fs::create_dir_all(&dir)?;

    let cmd = cli::Cli::command();
    let root = cmd.get_name().to_string();
    let mut written = vec![render(cmd.clone(), &root, &dir)?];

    for sub in cmd.get_subcommands().filter(|s| s.get_name() != "help") {
        let title = format!("{}-{}", root, sub.get_name());
        written.push(render(sub.clone(), &title, &dir)?);
    }

    for path in &written {
        println!("{}", path.display());
    }
    println!("View with: man -l {}", written[0].display());

    Ok(())
}
