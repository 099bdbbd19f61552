//! Code Memory Trait
//!
//! Core abstraction for reading and patching code in some address space.

use super::MemoryRegion;
use crate::error::MemoryError;
use byteorder::{ByteOrder, LE};

/// Read and patch access to executable code
pub trait CodeMemory: Send + Sync {
    /// Read bytes from a virtual address
    fn read_bytes(&self, address: usize, size: usize) -> Result<Vec<u8>, MemoryError>;

    /// Overwrite code at `address`; the region must be executable
    fn write_code(&self, address: usize, bytes: &[u8]) -> Result<(), MemoryError>;

    /// The mapped regions known to this source
    fn regions(&self) -> Vec<MemoryRegion>;

    /// Whether writes change code that is actually running
    fn is_live(&self) -> bool;

    /// Read a little-endian u32
    fn read_u32(&self, address: usize) -> Result<u32, MemoryError> {
        let bytes = self.read_bytes(address, 4)?;
        Ok(LE::read_u32(&bytes))
    }

    /// Read a little-endian u64
    fn read_u64(&self, address: usize) -> Result<u64, MemoryError> {
        let bytes = self.read_bytes(address, 8)?;
        Ok(LE::read_u64(&bytes))
    }

    /// Find the region containing the given address
    fn find_region(&self, address: usize) -> Option<MemoryRegion> {
        self.regions().into_iter().find(|r| r.contains(address))
    }

    /// Check whether `[address, address + len)` is inside one executable region
    fn is_patchable(&self, address: usize, len: usize) -> bool {
        self.find_region(address)
            .map(|r| r.is_executable() && r.covers(address, len))
            .unwrap_or(false)
    }
}
