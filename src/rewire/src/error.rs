//! Error types for resolution, patching and table loading

use thiserror::Error;

/// Errors that can occur while redirecting one method to another
#[derive(Debug, Error)]
pub enum RedirectError {
    #[error("Source {name} could not be resolved: {reason}")]
    SourceUnresolved { name: String, reason: String },

    #[error("Destination {name} could not be resolved: {reason}")]
    DestinationUnresolved { name: String, reason: String },

    #[error("{name} resolved to a null code address")]
    NullAddress { name: String },

    #[error("{name} at {address:#x} would redirect to itself")]
    SelfRedirect { name: String, address: usize },

    #[error("Unsupported pointer width: {0} bits")]
    UnsupportedPointerWidth(u32),

    #[error("Relative jump from {from:#x} cannot reach {to:#x}")]
    OffsetOutOfRange { from: usize, to: usize },

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// Errors raised by a [`CodeMemory`](crate::memory::CodeMemory) implementation
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("{len} bytes at {address:#x} are not inside a mapped region")]
    Unmapped { address: usize, len: usize },

    #[error("Patch site {address:#x} is not in an executable region")]
    NotExecutable { address: usize },

    #[error("Failed to change protection of {len} bytes at {address:#x} (errno {errno})")]
    Protect {
        address: usize,
        len: usize,
        errno: i32,
    },

    #[error("Code patching is not supported on this platform: {0}")]
    Unsupported(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while loading a redirection table
#[derive(Debug, Error)]
pub enum TableError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse table: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid method descriptor '{input}': {reason}")]
    Descriptor { input: String, reason: String },
}

/// Errors from the one-time patch gate
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GateError {
    #[error("Redirections were already applied")]
    AlreadyPatched,
}
