//! Dynamic symbol resolution
//!
//! Resolves descriptors against the shared objects already loaded into this process.
//! The declaring type names the module (`libfoo.so`), the member names an exported
//! symbol. An empty type or `*` searches the global scope.

use crate::descriptor::MethodDescriptor;
use crate::resolve::{Reflection, Resolution};
use std::ffi::CString;

/// [`Reflection`] backed by `dlopen`/`dlsym`
#[derive(Debug, Default, Clone, Copy)]
pub struct DynamicSymbols;

impl DynamicSymbols {
    pub fn new() -> Self {
        Self
    }
}

impl Reflection for DynamicSymbols {
    fn resolve(&self, descriptor: &MethodDescriptor) -> Resolution {
        let symbol = match CString::new(descriptor.member_name()) {
            Ok(s) => s,
            Err(_) => return Resolution::not_found(descriptor.clone(), "symbol contains NUL"),
        };

        let module = descriptor.type_name.as_str();
        let global = module.is_empty() || module == "*";

        let handle = if global {
            libc::RTLD_DEFAULT
        } else {
            let Ok(path) = CString::new(module) else {
                return Resolution::not_found(descriptor.clone(), "module name contains NUL");
            };
            // Only look at modules that are already mapped
            let handle =
                unsafe { libc::dlopen(path.as_ptr(), libc::RTLD_LAZY | libc::RTLD_NOLOAD) };
            if handle.is_null() {
                return Resolution::not_found(
                    descriptor.clone(),
                    format!("module '{}' is not loaded", module),
                );
            }
            handle
        };

        let address = unsafe { libc::dlsym(handle, symbol.as_ptr()) } as usize;

        if !global {
            // The module stays mapped; this only drops the reference taken above
            unsafe { libc::dlclose(handle) };
        }

        if address == 0 {
            return Resolution::not_found(
                descriptor.clone(),
                format!("symbol '{}' not exported", descriptor.member_name()),
            );
        }

        Resolution::resolved(descriptor.clone(), address)
    }
}
