//! Preload library command handlers
//!
//! Handles commands related to the LD_PRELOAD library that applies a redirection
//! table inside another program.

use anyhow::{bail, Context, Result};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

const LIBRARY_NAME: &str = "librewire_preload.so";

/// Directories searched for the preload library, in order
///
/// `REWIRE_PRELOAD_DIR` comes first, then the directory of the rewire executable,
/// then the cargo output directories under the current directory.
fn search_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    if let Some(dir) = std::env::var_os("REWIRE_PRELOAD_DIR") {
        dirs.push(PathBuf::from(dir));
    }
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
    {
        dirs.push(exe_dir);
    }
    dirs.push(PathBuf::from("target/release"));
    dirs.push(PathBuf::from("target/debug"));

    dirs
}

/// First directory in `dirs` that holds the preload library
fn locate_library(dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .map(|d| d.join(LIBRARY_NAME))
        .find(|p| p.is_file())
        .and_then(|p| std::fs::canonicalize(p).ok())
}

pub fn find_preload_library() -> Option<PathBuf> {
    locate_library(&search_dirs())
}

/// Handle preload info subcommand
pub fn handle_preload_info() -> Result<()> {
    match find_preload_library() {
        Some(p) => {
            println!("Preload library: {}", p.display());
            println!();
            println!("Usage:");
            println!("  REWIRE_TABLE=table.toml LD_PRELOAD={} ./program", p.display());
            println!();
            println!("Environment variables:");
            println!("  REWIRE_TABLE=<path>  Redirection table to apply (required)");
            println!("  REWIRE_LOG=<path>    Log file (default: /tmp/rewire_preload.log)");
            println!("  REWIRE_DEV=1         Log a summary once the table is applied");
            Ok(())
        }
        None => {
            bail!("Preload library not found. Build with: cargo build -p rewire-preload --release")
        }
    }
}

/// Assemble the child command with the preload environment
fn build_command(
    lib: &Path,
    table: &Path,
    dev: bool,
    log_file: &Path,
    command: &[String],
) -> Result<Command> {
    let Some((program, args)) = command.split_first() else {
        bail!("No command specified");
    };

    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.env("LD_PRELOAD", lib);
    cmd.env("REWIRE_TABLE", table);
    cmd.env("REWIRE_LOG", log_file);
    if dev {
        cmd.env("REWIRE_DEV", "1");
    }

    Ok(cmd)
}

/// Handle preload run subcommand
pub fn handle_preload_run(
    table: &Path,
    dev: bool,
    log_file: &Path,
    command: &[String],
) -> Result<()> {
    let lib = find_preload_library().context("Preload library not found")?;
    let table = std::fs::canonicalize(table)
        .with_context(|| format!("Table not found: {}", table.display()))?;

    // Inside the child, table errors only reach the log file
    rewire::RedirectionTable::from_toml_file(&table)
        .with_context(|| format!("Invalid table {}", table.display()))?;

    let mut cmd = build_command(&lib, &table, dev, log_file, command)?;

    println!("Running with LD_PRELOAD={}", lib.display());
    println!("Table: {}", table.display());
    println!("Log: {}", log_file.display());
    println!();

    let status = cmd.status().context("Failed to run command")?;
    std::process::exit(status.code().unwrap_or(1));
}

/// Copy every complete line available from `reader` to `out`
///
/// Lines reporting failed redirections are prefixed with `!`. Returns how many
/// failure lines were seen.
fn forward_lines<R: BufRead, W: Write>(reader: &mut R, out: &mut W) -> std::io::Result<usize> {
    let mut failures = 0;
    let mut line = String::new();

    while reader.read_line(&mut line)? > 0 {
        if line.contains("redirection failed") {
            failures += 1;
            write!(out, "! {}", line)?;
        } else {
            write!(out, "  {}", line)?;
        }
        line.clear();
    }

    out.flush()?;
    Ok(failures)
}

/// Handle preload watch subcommand
///
/// The preload library creates the log when the child starts, so watching may
/// begin before the file exists.
pub fn handle_preload_watch(log_file: &Path) -> Result<()> {
    println!("Watching: {}", log_file.display());
    println!("Press Ctrl+C to stop\n");

    let poll = Duration::from_millis(100);
    while !log_file.exists() {
        std::thread::sleep(poll);
    }

    let file = std::fs::File::open(log_file)
        .with_context(|| format!("Failed to open {}", log_file.display()))?;
    let mut reader = BufReader::new(file);
    let mut stdout = std::io::stdout();
    let mut failures = 0;

    loop {
        let seen = forward_lines(&mut reader, &mut stdout)
            .with_context(|| format!("Failed to read {}", log_file.display()))?;
        if seen > 0 {
            failures += seen;
            eprintln!("{} failed redirection(s) so far", failures);
        }
        std::thread::sleep(poll);
    }
}
