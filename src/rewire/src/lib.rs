//! # rewire
//!
//! Load-time function redirection: make every call to one method run another.
//!
//! This library provides functionality to:
//! - Describe methods by declaring type, member name, binding flags and overload
//! - Resolve descriptors to entry addresses through a [`Reflection`] backend
//! - Overwrite a source entry with an unconditional jump to a destination
//! - Apply an ordered [`RedirectionTable`] once, before patched code may run
//! - Keep an append-only [`AuditLog`] of every attempt
//!
//! ## Example
//!
//! ```no_run
//! use rewire::{BatchOptions, CurrentProcess, DynamicSymbols, PatchGate, Redirector, RedirectionTable};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! static GATE: PatchGate = PatchGate::new();
//!
//! let table = RedirectionTable::from_toml_file("rewire.toml")?;
//! let redirector = Redirector::new(CurrentProcess::new());
//!
//! let report = GATE.open(|| {
//!     rewire::initialize_all(&table, &DynamicSymbols::new(), &redirector, &BatchOptions::default())
//! })?;
//! println!("{}", report.summary());
//!
//! for record in redirector.audit().records() {
//!     println!("{} -> {}", record.source, record.destination);
//! }
//! # Ok(())
//! # }
//! ```

pub mod arch;
pub mod audit;
pub mod batch;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod gate;
pub mod memory;
pub mod resolve;
#[cfg(unix)]
pub mod symbols;
pub mod table;

#[doc(inline)]
pub use arch::{Jump, PointerWidth};
#[doc(inline)]
pub use audit::{AuditLog, RecordOutcome, RedirectionRecord};
#[doc(inline)]
pub use batch::{initialize_all, BatchOptions, BatchReport, EntryOutcome, EntryStatus};
#[doc(inline)]
pub use descriptor::{BindingFlags, MemberKind, MethodDescriptor};
#[doc(inline)]
pub use engine::{Patch, Redirector};
#[doc(inline)]
pub use error::{GateError, MemoryError, RedirectError, TableError};
#[doc(inline)]
pub use gate::{PatchGate, PatchState};
#[doc(inline)]
pub use memory::{BufferMemory, CodeMemory, CurrentProcess, MemoryRegion};
#[doc(inline)]
pub use resolve::{MethodTable, Reflection, Resolution, ResolvedMethod};
#[cfg(unix)]
#[doc(inline)]
pub use symbols::DynamicSymbols;
#[doc(inline)]
pub use table::{RedirectionEntry, RedirectionTable};

#[cfg(all(test, target_os = "linux", target_arch = "x86_64"))]
mod tests {
    use super::*;
    use std::hint::black_box;

    #[inline(never)]
    extern "C" fn compute_price(base: u64) -> u64 {
        let mut total = base;
        for i in 0..black_box(4u64) {
            total = total.wrapping_mul(31).wrapping_add(i);
        }
        total
    }

    #[inline(never)]
    extern "C" fn compute_price_adjusted(base: u64) -> u64 {
        black_box(base) ^ 0x5A5A_0000
    }

    #[test]
    fn test_live_redirection_substitutes_calls() {
        let before: extern "C" fn(u64) -> u64 = black_box(compute_price);
        let expected_original = before(7);
        assert_ne!(expected_original, compute_price_adjusted(7));

        let flags = BindingFlags::STATIC | BindingFlags::PUBLIC;
        let methods = MethodTable::new();
        methods.register("Tradeable", "PriceFor", flags, &[], compute_price as usize);
        methods.register("RA_Tradeable", "PriceFor", flags, &[], compute_price_adjusted as usize);

        let table = RedirectionTable::new().redirect(
            MethodDescriptor::new("Tradeable", "PriceFor"),
            MethodDescriptor::new("RA_Tradeable", "PriceFor"),
        );

        let redirector = Redirector::new(CurrentProcess::new());
        let gate = PatchGate::new();
        let report = gate
            .open(|| initialize_all(&table, &methods, &redirector, &BatchOptions::default()))
            .unwrap();
        assert!(report.is_clean(), "{:?}", report);

        let after: extern "C" fn(u64) -> u64 = black_box(compute_price);
        assert_eq!(after(7), compute_price_adjusted(7));
        assert_eq!(after(1234), 1234 ^ 0x5A5A_0000);

        let site = redirector
            .memory()
            .read_bytes(compute_price as usize, arch::ABSOLUTE_JUMP_LEN)
            .unwrap();
        assert_eq!(
            Jump::decode(&site).map(|j| j.target(compute_price as usize)),
            Some(compute_price_adjusted as usize)
        );
        assert_eq!(redirector.audit().sources(), vec!["Tradeable.PriceFor"]);
    }
}
