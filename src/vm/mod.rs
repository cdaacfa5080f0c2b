//! The interface between the memory manager and the runtime built on top of it.
//!
//! The runtime describes its object layouts by implementing [`Traceable`] for each type and
//! registering it under a [`TypeCode`]. It reports which interpreter activity is calling
//! through [`Activity`].

mod activity;
pub mod builtin;
mod scanning;
mod types;

pub use self::activity::{Activity, NullActivity};
pub use self::scanning::{FlattenPolicy, Slot, SlotVisitor, Traceable};
pub use self::types::{TypeCode, TypeTable};
