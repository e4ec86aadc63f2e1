//! Error types for the buffer engine.

use crate::buffer::MapKind;
use thiserror::Error;

/// Errors returned by buffer, catalog and container operations.
#[derive(Debug, Error)]
pub enum MetaError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("out of memory allocating {size} bytes")]
    NoMemory { size: usize },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("storage backend mismatch: {dst} cannot compose with {src}")]
    NotImplemented { dst: MapKind, src: MapKind },

    #[error("not found: {0}")]
    NoSuch(String),

    #[error("out of bounds: {0}")]
    OutOfBounds(String),

    #[error("busy: {references} references outstanding")]
    Busy { references: u32 },

    #[error("failed: {0}")]
    Failed(String),

    #[error("no more entries")]
    NoMore,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for buffer operations.
pub type Result<T> = std::result::Result<T, MetaError>;
