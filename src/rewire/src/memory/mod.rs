//! Code memory access
//!
//! A patch site is reached through the [`CodeMemory`] trait:
//! - [`CurrentProcess`] patches the running process in place
//! - [`BufferMemory`] keeps sparse in-memory regions for tests and simulation

mod buffer;
mod process;
mod region;
mod traits;

pub use buffer::{BufferMemory, FILL_BYTE};
pub use process::{parse_maps, CurrentProcess};
pub use region::MemoryRegion;
pub use traits::CodeMemory;
