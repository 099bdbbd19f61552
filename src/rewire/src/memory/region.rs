//! Memory Region Types
//!
//! Address ranges with `/proc/<pid>/maps` style permission strings.

/// A mapped address range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegion {
    pub start: usize,
    pub end: usize,
    pub perms: String,
    pub offset: usize,
    pub path: Option<String>,
}

impl MemoryRegion {
    /// Anonymous region with the given permissions
    pub fn new(start: usize, end: usize, perms: &str) -> Self {
        Self {
            start,
            end,
            perms: perms.to_string(),
            offset: 0,
            path: None,
        }
    }

    pub fn size(&self) -> usize {
        self.end - self.start
    }

    pub fn contains(&self, address: usize) -> bool {
        address >= self.start && address < self.end
    }

    /// Whether `[address, address + len)` lies entirely inside this region
    pub fn covers(&self, address: usize, len: usize) -> bool {
        self.contains(address)
            && address
                .checked_add(len)
                .map(|end| end <= self.end)
                .unwrap_or(false)
    }

    pub fn is_readable(&self) -> bool {
        self.perms.starts_with('r')
    }

    pub fn is_writable(&self) -> bool {
        self.perms.chars().nth(1) == Some('w')
    }

    pub fn is_executable(&self) -> bool {
        self.perms.chars().nth(2) == Some('x')
    }
}
