//! Current Process Code Memory
//!
//! Patches the running process in place. On Linux the mappings from
//! `/proc/self/maps` decide what may be written: a patch has to land inside one
//! executable mapping or it is refused before any page protection changes.

use super::{CodeMemory, MemoryRegion};
use crate::error::MemoryError;
use once_cell::sync::Lazy;

#[cfg(unix)]
static PAGE_SIZE: Lazy<usize> = Lazy::new(|| {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        4096
    }
});

#[cfg(not(unix))]
static PAGE_SIZE: Lazy<usize> = Lazy::new(|| 4096);

/// The process this library is loaded into
#[derive(Debug, Default, Clone, Copy)]
pub struct CurrentProcess;

impl CurrentProcess {
    pub fn new() -> Self {
        Self
    }

    pub fn page_size() -> usize {
        *PAGE_SIZE
    }

    /// Page-aligned span covering `[address, address + len)`
    pub fn page_span(address: usize, len: usize) -> (usize, usize) {
        let page = Self::page_size();
        let start = address & !(page - 1);
        let end = (address + len + page - 1) & !(page - 1);
        (start, end - start)
    }

    #[cfg(target_os = "linux")]
    fn maps() -> Result<Vec<MemoryRegion>, MemoryError> {
        let contents = std::fs::read_to_string("/proc/self/maps")?;
        Ok(parse_maps(&contents))
    }

    /// Protection to restore after writing, checked against the mappings
    #[cfg(all(unix, target_os = "linux"))]
    fn original_protection(&self, address: usize, len: usize) -> Result<libc::c_int, MemoryError> {
        let region = Self::maps()?
            .into_iter()
            .find(|r| r.contains(address))
            .ok_or(MemoryError::Unmapped { address, len })?;

        if !region.covers(address, len) {
            return Err(MemoryError::Unmapped { address, len });
        }
        if !region.is_executable() {
            return Err(MemoryError::NotExecutable { address });
        }

        let mut prot = libc::PROT_NONE;
        if region.is_readable() {
            prot |= libc::PROT_READ;
        }
        if region.is_writable() {
            prot |= libc::PROT_WRITE;
        }
        prot |= libc::PROT_EXEC;
        Ok(prot)
    }

    #[cfg(all(unix, not(target_os = "linux")))]
    fn original_protection(&self, _address: usize, _len: usize) -> Result<libc::c_int, MemoryError> {
        Ok(libc::PROT_READ | libc::PROT_EXEC)
    }

    #[cfg(unix)]
    fn protect(start: usize, len: usize, prot: libc::c_int) -> Result<(), MemoryError> {
        let rc = unsafe { libc::mprotect(start as *mut libc::c_void, len, prot) };
        if rc != 0 {
            let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
            return Err(MemoryError::Protect {
                address: start,
                len,
                errno,
            });
        }
        Ok(())
    }
}

impl CodeMemory for CurrentProcess {
    fn read_bytes(&self, address: usize, size: usize) -> Result<Vec<u8>, MemoryError> {
        if address == 0 {
            return Err(MemoryError::Unmapped { address, len: size });
        }

        #[cfg(target_os = "linux")]
        {
            let readable = Self::maps()?
                .iter()
                .any(|r| r.is_readable() && r.covers(address, size));
            if !readable {
                return Err(MemoryError::Unmapped { address, len: size });
            }
        }

        let bytes = unsafe { std::slice::from_raw_parts(address as *const u8, size) };
        Ok(bytes.to_vec())
    }

    #[cfg(all(unix, any(target_arch = "x86", target_arch = "x86_64")))]
    fn write_code(&self, address: usize, bytes: &[u8]) -> Result<(), MemoryError> {
        if address == 0 {
            return Err(MemoryError::Unmapped {
                address,
                len: bytes.len(),
            });
        }

        let restore = self.original_protection(address, bytes.len())?;
        let (page_start, page_len) = Self::page_span(address, bytes.len());

        Self::protect(
            page_start,
            page_len,
            libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
        )?;

        // SAFETY: the span is mapped, executable and now writable. Callers guarantee no
        // thread is executing these bytes while they change.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), address as *mut u8, bytes.len());
        }

        Self::protect(page_start, page_len, restore)
    }

    #[cfg(not(all(unix, any(target_arch = "x86", target_arch = "x86_64"))))]
    fn write_code(&self, _address: usize, _bytes: &[u8]) -> Result<(), MemoryError> {
        Err(MemoryError::Unsupported(
            "in-place patching needs a unix x86 or x86_64 process",
        ))
    }

    fn regions(&self) -> Vec<MemoryRegion> {
        current_regions()
    }

    fn is_live(&self) -> bool {
        true
    }
}

#[cfg(target_os = "linux")]
fn current_regions() -> Vec<MemoryRegion> {
    CurrentProcess::maps().unwrap_or_default()
}

#[cfg(not(target_os = "linux"))]
fn current_regions() -> Vec<MemoryRegion> {
    Vec::new()
}

/// Parse the contents of a `/proc/<pid>/maps` file
pub fn parse_maps(contents: &str) -> Vec<MemoryRegion> {
    let mut regions = Vec::new();

    for line in contents.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        let Some((start, end)) = parts[0].split_once('-') else {
            continue;
        };
        let (Ok(start), Ok(end)) = (
            usize::from_str_radix(start, 16),
            usize::from_str_radix(end, 16),
        ) else {
            continue;
        };

        let perms = parts.get(1).unwrap_or(&"").to_string();
        let offset = parts
            .get(2)
            .and_then(|s| usize::from_str_radix(s, 16).ok())
            .unwrap_or(0);
        let path = parts.get(5).map(|s| s.to_string());

        regions.push(MemoryRegion {
            start,
            end,
            perms,
            offset,
            path,
        });
    }

    regions
}
