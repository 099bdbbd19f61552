//! LD_PRELOAD library that applies a redirection table to its host
//!
//! When the dynamic loader maps this library, a constructor loads the table,
//! makes its libraries available, resolves every entry against the symbols of
//! the process and patches the sources before `main` runs.
//!
//! Usage:
//!   REWIRE_TABLE=/path/to/table.toml LD_PRELOAD=/path/to/librewire_preload.so ./program
//!
//! Environment variables:
//!   REWIRE_TABLE=<path>  - Redirection table (required)
//!   REWIRE_LOG=<path>    - Log file path (default: /tmp/rewire_preload.log)
//!   REWIRE_DEV=1         - Debug logging and a summary line after the batch
//!
//! The host can inspect what was attempted through the exported
//! `rewire_audit_*` functions.

// The constructor is not compiled into unit tests
#![cfg_attr(test, allow(dead_code))]

use anyhow::{Context, Result};
use libc::{c_char, c_int};
use once_cell::sync::Lazy;
use rewire::{
    initialize_all, AuditLog, BatchOptions, BatchReport, CurrentProcess, DynamicSymbols,
    PatchGate, Redirector, RedirectionTable,
};
use std::ffi::{CStr, CString};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{error, info, warn};

const DEFAULT_LOG: &str = "/tmp/rewire_preload.log";

static GATE: PatchGate = PatchGate::new();
static AUDIT: Lazy<Arc<AuditLog>> = Lazy::new(|| Arc::new(AuditLog::new()));

fn get_log_path() -> String {
    std::env::var("REWIRE_LOG").unwrap_or_else(|_| DEFAULT_LOG.to_string())
}

fn dev_mode() -> bool {
    std::env::var("REWIRE_DEV").map(|v| v == "1").unwrap_or(false)
}

fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Create the log file and route tracing output into it
fn init_logging(log_path: &str, dev: bool) {
    let Ok(mut file) = File::create(log_path) else {
        return;
    };

    let _ = writeln!(file, "=== rewire-preload initialized ===");
    let _ = writeln!(file, "PID: {}", std::process::id());
    let _ = writeln!(file, "Timestamp: {}", get_timestamp());
    let _ = writeln!(file, "Log file: {}", log_path);
    let _ = writeln!(
        file,
        "REWIRE_TABLE: {}",
        std::env::var("REWIRE_TABLE").unwrap_or_default()
    );
    let _ = writeln!(file, "REWIRE_DEV: {}", dev);
    let _ = writeln!(file, "==================================");

    let filter = if dev { "rewire=debug" } else { "rewire=info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
}

/// `dlopen` every library the table depends on
///
/// A library that fails to load is logged; entries that need it fail to resolve.
fn load_libraries(libraries: &[String]) -> usize {
    let mut loaded = 0;

    for lib in libraries {
        let Ok(path) = CString::new(lib.as_str()) else {
            warn!(library = %lib, "library path contains NUL");
            continue;
        };

        let handle = unsafe { libc::dlopen(path.as_ptr(), libc::RTLD_NOW | libc::RTLD_GLOBAL) };
        if handle.is_null() {
            let reason = unsafe {
                let err = libc::dlerror();
                if err.is_null() {
                    "unknown error".to_string()
                } else {
                    CStr::from_ptr(err).to_string_lossy().into_owned()
                }
            };
            warn!(library = %lib, %reason, "failed to load library");
        } else {
            loaded += 1;
        }
    }

    loaded
}

/// Load `table_path` and apply it through `gate`, recording into `audit`
fn apply_table(
    table_path: &Path,
    gate: &PatchGate,
    audit: &Arc<AuditLog>,
    options: &BatchOptions,
) -> Result<BatchReport> {
    let table = RedirectionTable::from_toml_file(table_path)
        .with_context(|| format!("Failed to load table {}", table_path.display()))?;

    load_libraries(&table.libraries);

    let redirector = Redirector::new(CurrentProcess::new()).with_audit(Arc::clone(audit));
    let symbols = DynamicSymbols::new();

    gate.open(|| initialize_all(&table, &symbols, &redirector, options))
        .context("Table was already applied")
}

fn initialize() {
    let dev = dev_mode();
    init_logging(&get_log_path(), dev);

    let Ok(table) = std::env::var("REWIRE_TABLE") else {
        warn!("REWIRE_TABLE is not set; nothing to redirect");
        return;
    };

    match apply_table(
        Path::new(&table),
        &GATE,
        &AUDIT,
        &BatchOptions { dev_mode: dev },
    ) {
        Ok(report) if report.is_clean() => info!("{}", report.summary()),
        Ok(report) => warn!("{}", report.summary()),
        Err(e) => error!("{:#}", e),
    }
}

// Constructor - runs when library is loaded
#[cfg(not(test))]
#[ctor::ctor]
fn init() {
    initialize();
}

/// Copy `name` into a caller buffer as a NUL-terminated string
///
/// Returns the full length of `name` in bytes. At most `cap - 1` bytes are copied.
unsafe fn copy_name(name: &str, buf: *mut c_char, cap: usize) -> isize {
    if !buf.is_null() && cap > 0 {
        let n = name.len().min(cap - 1);
        std::ptr::copy_nonoverlapping(name.as_ptr(), buf as *mut u8, n);
        *buf.add(n) = 0;
    }
    name.len() as isize
}

/// Number of redirection attempts recorded so far
#[no_mangle]
pub extern "C" fn rewire_audit_len() -> usize {
    AUDIT.len()
}

/// Source name of attempt `index`; -1 if there is no such attempt
///
/// # Safety
/// `buf` must be null or valid for `cap` bytes of writes.
#[no_mangle]
pub unsafe extern "C" fn rewire_audit_source(index: usize, buf: *mut c_char, cap: usize) -> isize {
    match AUDIT.get(index) {
        Some(record) => copy_name(&record.source, buf, cap),
        None => -1,
    }
}

/// Destination name of attempt `index`; -1 if there is no such attempt
///
/// # Safety
/// `buf` must be null or valid for `cap` bytes of writes.
#[no_mangle]
pub unsafe extern "C" fn rewire_audit_destination(
    index: usize,
    buf: *mut c_char,
    cap: usize,
) -> isize {
    match AUDIT.get(index) {
        Some(record) => copy_name(&record.destination, buf, cap),
        None => -1,
    }
}

/// Whether attempt `index` was applied: 1 applied, 0 failed or in flight, -1 no such attempt
#[no_mangle]
pub extern "C" fn rewire_audit_applied(index: usize) -> c_int {
    match AUDIT.get(index) {
        Some(record) => c_int::from(record.is_applied()),
        None => -1,
    }
}

/// Block until the table has been applied, or `timeout_ms` passes; 1 if applied
#[no_mangle]
pub extern "C" fn rewire_wait_patched(timeout_ms: u64) -> c_int {
    c_int::from(GATE.wait_timeout(Duration::from_millis(timeout_ms)))
}
