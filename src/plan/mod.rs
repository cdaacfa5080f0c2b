//! The collector: heap state, marking and the traversal modes built on it.
//!
//! Every traversal of the object graph (collection, orphan checking, image save and restore,
//! packing and unpacking) enumerates references the same way, through the object's type.
//! What happens to each reference is decided by the active [`TraversalContext`].

pub mod context;
pub mod heap;
pub mod live_stack;
mod mark;
mod orphan;
pub mod save_stack;
mod tracing;

pub use self::context::TraversalContext;
pub use self::heap::Heap;
pub use self::live_stack::LiveStack;
pub use self::mark::CollectionSummary;
pub use self::orphan::OrphanMarker;
pub use self::save_stack::{SaveStack, SaveTable};
