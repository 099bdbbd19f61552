//! Table command handlers
//!
//! Handles `table check` and `table simulate`. Simulation resolves the table against a
//! symbol map and patches sparse in-memory code instead of a live process.

use anyhow::{bail, Context, Result};
use rewire::{
    initialize_all, BatchOptions, BatchReport, BindingFlags, BufferMemory, CodeMemory,
    EntryStatus, MethodDescriptor, MethodTable, Redirector, RedirectionTable,
};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;

use super::jump::{format_bytes, parse_address};
use crate::cli::WidthArg;

const PAGE: usize = 0x1000;

fn load_table(path: &Path) -> Result<RedirectionTable> {
    RedirectionTable::from_toml_file(path)
        .with_context(|| format!("Failed to load table {}", path.display()))
}

/// Handle the check command
pub fn check(path: &Path) -> Result<()> {
    let table = load_table(path)?;

    println!("Table: {}", path.display());
    if !table.libraries.is_empty() {
        println!("Libraries:");
        for lib in &table.libraries {
            println!("  {}", lib);
        }
    }

    println!(
        "Entries: {} ({} enabled, {} disabled)",
        table.len(),
        table.enabled().count(),
        table.len() - table.enabled().count()
    );

    for (i, entry) in table.entries.iter().enumerate() {
        let state = if entry.enabled { "" } else { " [disabled]" };
        let group = entry.group.as_deref().unwrap_or("-");
        println!(
            "  {:3}  {:12} {} -> {}{}",
            i, group, entry.source, entry.destination, state
        );
        if let Some(note) = &entry.note {
            println!("       {:12} {}", "", note);
        }
    }

    let groups = table.groups();
    if !groups.is_empty() {
        println!("Groups: {}", groups.join(", "));
    }

    for source in table.duplicate_sources() {
        println!("Warning: {} is redirected more than once; the last patch wins", source);
    }

    Ok(())
}

/// Value in a symbol map
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SymbolValue {
    Address(i64),
    Text(String),
}

/// Symbols registered from a map file, plus the addresses that need simulated code
#[derive(Debug, Default)]
pub struct SymbolMap {
    pub methods: MethodTable,
    pub addresses: BTreeSet<usize>,
}

/// Parse a symbol map
///
/// ```toml
/// "Tradeable::PriceFor" = 0x10001000
/// "RA_Tradeable::PriceFor" = "0x20001000"
/// "RA_Lord::Notify_PawnTookDamage" = "pending"
/// ```
pub fn parse_symbol_map(contents: &str) -> Result<SymbolMap> {
    let raw: BTreeMap<String, SymbolValue> =
        toml::from_str(contents).context("Failed to parse symbol map")?;

    let map = SymbolMap::default();
    let mut addresses = BTreeSet::new();

    for (key, value) in raw {
        let descriptor: MethodDescriptor = key.parse()?;
        let params: Vec<&str> = descriptor
            .parameters
            .iter()
            .flatten()
            .map(String::as_str)
            .collect();
        let member = descriptor.member_name();

        let address = match value {
            SymbolValue::Address(a) => {
                Some(usize::try_from(a).with_context(|| format!("Negative address for {}", key))?)
            }
            SymbolValue::Text(t) if t.eq_ignore_ascii_case("pending") => None,
            SymbolValue::Text(t) => Some(
                parse_address(&t).with_context(|| format!("Bad address for {}", key))?,
            ),
        };

        match address {
            Some(a) => {
                map.methods.register(
                    &descriptor.type_name,
                    &member,
                    BindingFlags::all(),
                    &params,
                    a,
                );
                if a != 0 {
                    addresses.insert(a);
                }
            }
            None => map.methods.register_pending(
                &descriptor.type_name,
                &member,
                BindingFlags::all(),
                &params,
            ),
        }
    }

    Ok(SymbolMap { addresses, ..map })
}

/// Executable pages around every address, merged into non-overlapping regions
///
/// Each run of pages gets one extra page so a jump near the end still fits.
pub fn simulated_memory(addresses: &BTreeSet<usize>) -> Result<BufferMemory> {
    let memory = BufferMemory::new();
    let mut run: Option<(usize, usize)> = None;

    for &address in addresses {
        let page = address & !(PAGE - 1);
        let Some(page_end) = page.checked_add(2 * PAGE) else {
            bail!("Address {:#x} is too close to the end of the address space", address);
        };

        run = match run {
            Some((start, end)) if page <= end => Some((start, end.max(page_end))),
            Some((start, end)) => {
                memory.add_code(start, end - start);
                Some((page, page_end))
            }
            None => Some((page, page_end)),
        };
    }
    if let Some((start, end)) = run {
        memory.add_code(start, end - start);
    }

    Ok(memory)
}

/// Run `table` against `symbols` in simulated memory
pub fn run_simulation(
    table: &RedirectionTable,
    symbols: &SymbolMap,
    width: WidthArg,
    options: &BatchOptions,
) -> Result<(BatchReport, Redirector<BufferMemory>)> {
    let memory = simulated_memory(&symbols.addresses)?;
    let redirector = Redirector::new(memory).with_width(width.resolve()?);
    let report = initialize_all(table, &symbols.methods, &redirector, options);
    Ok((report, redirector))
}

/// Handle the simulate command
pub fn simulate(path: &Path, symbols: &Path, width: WidthArg, dev_mode: bool) -> Result<()> {
    let table = load_table(path)?;
    let contents = std::fs::read_to_string(symbols)
        .with_context(|| format!("Failed to read {}", symbols.display()))?;
    let map = parse_symbol_map(&contents)?;
    debug!(
        path = %symbols.display(),
        addresses = map.addresses.len(),
        "loaded symbol map"
    );
    let symbols = map;

    if table.is_empty() {
        bail!("Table {} has no entries", path.display());
    }

    let (report, redirector) = run_simulation(&table, &symbols, width, &BatchOptions { dev_mode })?;

    for outcome in &report.outcomes {
        let group = outcome.group.as_deref().unwrap_or("-");
        match &outcome.status {
            EntryStatus::Applied(patch) => {
                println!(
                    "  {:3}  {:12} {} -> {}",
                    outcome.index, group, outcome.source, outcome.destination
                );
                let site = redirector
                    .memory()
                    .read_bytes(patch.source_address, patch.jump.size())?;
                println!("       {:12} {:#x}: {}", "", patch.source_address, format_bytes(&site));
            }
            EntryStatus::Failed(e) => {
                println!(
                    "  {:3}  {:12} {} -> {}: FAILED",
                    outcome.index, group, outcome.source, outcome.destination
                );
                println!("       {:12} {}", "", e);
            }
            EntryStatus::Skipped => {
                println!("  {:3}  {:12} {} (disabled)", outcome.index, group, outcome.source);
            }
        }
    }

    println!();
    println!("{}", report.summary());
    println!("Audit log: {} attempts", redirector.audit().len());
    for source in redirector.audit().duplicate_sources() {
        println!("Warning: {} was redirected more than once", source);
    }

    Ok(())
}
