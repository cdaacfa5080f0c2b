//! Utilities shared by the collector, the envelope code and the public API.

/// Address and object reference newtypes.
pub mod address;
/// Identity-keyed hash tables.
pub mod bucket;
/// Constants used throughout the crate.
pub mod constants;
/// Alignment and size conversions.
pub mod conversions;
/// Raw memory dumps.
pub mod dump;
/// Error types.
pub mod error;
/// The object header.
pub mod header;
/// Segments, pools and the segment map.
pub mod heap;
/// Logger initialization.
pub mod logger;
/// Options, read from the environment or set by the runtime.
pub mod options;
/// Diagnostics written before a fatal abort.
pub(crate) mod panic;
#[cfg(test)]
pub(crate) mod test_util;

pub use self::address::Address;
pub use self::address::ObjectReference;
