//! Demo command handler
//!
//! Redirects a function of this very process and calls it before and after.

use anyhow::Result;

#[cfg(all(unix, any(target_arch = "x86", target_arch = "x86_64")))]
use super::jump::format_bytes;

#[cfg(all(unix, any(target_arch = "x86", target_arch = "x86_64")))]
mod live {
    use anyhow::{bail, Result};
    use rewire::{
        initialize_all, BatchOptions, BatchReport, BindingFlags, CurrentProcess,
        MethodDescriptor, MethodTable, PatchGate, Redirector, RedirectionTable,
    };
    use std::hint::black_box;

    #[inline(never)]
    pub extern "C" fn price_for(base: u64) -> u64 {
        let mut price = base;
        for markup in 1..=black_box(3u64) {
            price = price.wrapping_add(price / 10).wrapping_add(markup);
        }
        price
    }

    #[inline(never)]
    pub extern "C" fn adjusted_price_for(base: u64) -> u64 {
        black_box(base) / 2
    }

    pub fn call(base: u64) -> u64 {
        let f: extern "C" fn(u64) -> u64 = black_box(price_for);
        f(base)
    }

    pub fn apply(dev_mode: bool) -> Result<(BatchReport, Redirector<CurrentProcess>)> {
        let flags = BindingFlags::STATIC | BindingFlags::PUBLIC;
        let methods = MethodTable::new();
        methods.register("Tradeable", "PriceFor", flags, &["u64"], price_for as usize);
        methods.register(
            "RA_Tradeable",
            "PriceFor",
            flags,
            &["u64"],
            adjusted_price_for as usize,
        );

        let table = RedirectionTable::new().redirect(
            MethodDescriptor::new("Tradeable", "PriceFor")
                .with_flags(flags)
                .with_parameters(["u64"]),
            MethodDescriptor::new("RA_Tradeable", "PriceFor").with_parameters(["u64"]),
        );

        let redirector = Redirector::new(CurrentProcess::new());
        let gate = PatchGate::new();
        let report =
            gate.open(|| initialize_all(&table, &methods, &redirector, &BatchOptions { dev_mode }))?;

        if let Some((_, e)) = report.failed().next() {
            bail!("Redirection failed: {}", e);
        }
        Ok((report, redirector))
    }
}

/// Handle the demo command
#[cfg(all(unix, any(target_arch = "x86", target_arch = "x86_64")))]
pub fn handle(dev_mode: bool) -> Result<()> {
    use anyhow::Context;
    use rewire::CodeMemory;

    let base = 100;
    println!("Tradeable.PriceFor({}) = {}", base, live::call(base));

    let (report, redirector) = live::apply(dev_mode).context("Live redirection failed")?;

    for patch in report.applied() {
        println!(
            "Patched {} at {:#x} -> {} at {:#x}",
            patch.source, patch.source_address, patch.destination, patch.destination_address
        );
        println!("  was: {}", format_bytes(&patch.overwritten));
        let now = redirector
            .memory()
            .read_bytes(patch.source_address, patch.jump.size())?;
        println!("  now: {}", format_bytes(&now));
    }

    println!("Tradeable.PriceFor({}) = {}", base, live::call(base));
    println!(
        "RA_Tradeable.PriceFor({}) = {}",
        base,
        live::adjusted_price_for(base)
    );
    println!("Audit log: {} attempts", redirector.audit().len());

    Ok(())
}

#[cfg(not(all(unix, any(target_arch = "x86", target_arch = "x86_64"))))]
pub fn handle(_dev_mode: bool) -> Result<()> {
    anyhow::bail!("The live demo needs a unix x86 or x86_64 process")
}
