//! Utilities used by the buffer engine: addresses, constants, logging and options.

/// An abstract address for tag payloads.
pub mod address;
/// Constants shared across the crate.
pub mod constants;
/// Alignment calculations.
pub mod conversions;
/// Wrappers of the `log` macros.
pub(crate) mod log;
/// Logger initialization.
pub mod logger;
/// Options for creating buffers.
pub mod options;
#[cfg(test)]
pub(crate) mod test_util;
/// Zeroed allocation of region slabs.
pub(crate) mod zeroed_alloc;

pub use self::address::Address;
