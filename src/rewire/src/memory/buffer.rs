//! Buffer Code Memory
//!
//! Sparse in-memory regions standing in for a process address space. Used by tests
//! and by table simulation, where patch sites must be inspected without touching
//! real code.

use super::{CodeMemory, MemoryRegion};
use crate::error::MemoryError;
use std::sync::Mutex;

/// `int3`, used to fill fresh code regions
pub const FILL_BYTE: u8 = 0xCC;

/// In-memory [`CodeMemory`] made of independent regions
#[derive(Debug, Default)]
pub struct BufferMemory {
    regions: Mutex<Vec<(MemoryRegion, Vec<u8>)>>,
}

impl BufferMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a region holding `data` at `start`
    pub fn with_region(self, start: usize, data: Vec<u8>, perms: &str) -> Self {
        self.add_region(start, data, perms);
        self
    }

    /// Add an executable region of `len` bytes filled with [`FILL_BYTE`]
    pub fn with_code(self, start: usize, len: usize) -> Self {
        self.add_code(start, len);
        self
    }

    pub fn add_region(&self, start: usize, data: Vec<u8>, perms: &str) {
        let region = MemoryRegion::new(start, start + data.len(), perms);
        self.lock().push((region, data));
    }

    pub fn add_code(&self, start: usize, len: usize) {
        self.add_region(start, vec![FILL_BYTE; len], "r-xp");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(MemoryRegion, Vec<u8>)>> {
        self.regions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CodeMemory for BufferMemory {
    fn read_bytes(&self, address: usize, size: usize) -> Result<Vec<u8>, MemoryError> {
        let regions = self.lock();
        let (region, data) = regions
            .iter()
            .find(|(r, _)| r.covers(address, size))
            .ok_or(MemoryError::Unmapped { address, len: size })?;

        let offset = address - region.start;
        Ok(data[offset..offset + size].to_vec())
    }

    fn write_code(&self, address: usize, bytes: &[u8]) -> Result<(), MemoryError> {
        let mut regions = self.lock();
        let (region, data) = regions
            .iter_mut()
            .find(|(r, _)| r.covers(address, bytes.len()))
            .ok_or(MemoryError::Unmapped {
                address,
                len: bytes.len(),
            })?;

        if !region.is_executable() {
            return Err(MemoryError::NotExecutable { address });
        }

        let offset = address - region.start;
        data[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn regions(&self) -> Vec<MemoryRegion> {
        self.lock().iter().map(|(r, _)| r.clone()).collect()
    }

    fn is_live(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_read_bytes() {
        let memory = BufferMemory::new().with_region(0x1000, vec![0x41, 0x42, 0x43, 0x44], "r--p");

        assert_eq!(memory.read_bytes(0x1000, 4).unwrap(), vec![0x41, 0x42, 0x43, 0x44]);
        assert_eq!(memory.read_bytes(0x1001, 2).unwrap(), vec![0x42, 0x43]);
    }

    #[test]
    fn test_buffer_read_u32_u64() {
        let memory = BufferMemory::new().with_region(
            0x1000,
            vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08],
            "r--p",
        );

        assert_eq!(memory.read_u32(0x1000).unwrap(), 0x04030201);
        assert_eq!(memory.read_u64(0x1000).unwrap(), 0x0807060504030201);
    }

    #[test]
    fn test_buffer_out_of_bounds() {
        let memory = BufferMemory::new().with_code(0x1000, 16);

        assert!(memory.read_bytes(0x100C, 8).is_err());
        assert!(memory.read_bytes(0x0500, 4).is_err());
        assert!(matches!(
            memory.write_code(0x100C, &[0; 12]),
            Err(MemoryError::Unmapped { .. })
        ));
    }

    #[test]
    fn test_buffer_write_code() {
        let memory = BufferMemory::new().with_code(0x1000, 16);

        memory.write_code(0x1004, &[0x90, 0x90]).unwrap();
        let bytes = memory.read_bytes(0x1000, 8).unwrap();
        assert_eq!(bytes, vec![0xCC, 0xCC, 0xCC, 0xCC, 0x90, 0x90, 0xCC, 0xCC]);
    }

    #[test]
    fn test_buffer_refuses_data_region_writes() {
        let memory = BufferMemory::new().with_region(0x1000, vec![0; 16], "rw-p");

        assert!(matches!(
            memory.write_code(0x1000, &[0xE9]),
            Err(MemoryError::NotExecutable { address: 0x1000 })
        ));
    }

    #[test]
    fn test_buffer_sparse_regions() {
        let memory = BufferMemory::new()
            .with_code(0x1000_0000, 64)
            .with_code(0x2000_0000, 64);

        assert_eq!(memory.regions().len(), 2);
        assert!(memory.is_patchable(0x2000_0000, 12));
        assert!(!memory.is_patchable(0x1800_0000, 12));
        assert!(!memory.is_live());
    }
}
