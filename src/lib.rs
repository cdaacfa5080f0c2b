//! objmem is the object memory of a dynamically-typed object runtime: segment-based
//! allocation, a stop-the-world mark/sweep collector with short-term protection for
//! unanchored objects, image persistence and object-graph envelopes.
//!
//! The runtime describes its types by implementing [`vm::Traceable`] and registering them
//! with a [`MemoryBuilder`]. [`memory_manager::objmem_init`] then creates the [`Memory`]
//! through which everything else is done:
//!
//! ```ignore
//! let mut builder = MemoryBuilder::new();
//! memory_manager::process(&mut builder, "maxHeapSize", "67108864");
//! builder.register_type(MY_TYPE, Arc::new(MyType))?;
//! let memory = memory_manager::objmem_init(builder)?;
//! memory.init_save_stack();
//! let object = memory.new_object(MY_TYPE, 16)?;
//! ```

#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;

pub mod envelope;
mod image;
pub mod memory;
pub mod memory_manager;
pub mod plan;
pub mod policy;
pub mod util;
pub mod vm;

pub use crate::envelope::Envelope;
pub use crate::memory::{Memory, MemoryBuilder, MemoryStats};
pub use crate::plan::CollectionSummary;
pub use crate::util::error::{
    AllocationError, ConsistencyError, EnvelopeError, ImageError, MemoryError, OrphanKind,
};
pub use crate::util::{Address, ObjectReference};
pub use crate::vm::TypeCode;
