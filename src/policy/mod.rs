//! Segment sets and their free chains.
//!
//! Live segments are partitioned into three sets: normal objects, large objects and old
//! space. Each set allocates from its own dead-object pool and sweeps its own segments.

mod dead_pool;
pub mod segment_set;

pub use self::segment_set::{Block, SegmentSet, SetStats, SweepSummary};
