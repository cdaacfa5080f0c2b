mod accounting;
pub mod gc_trigger;
pub mod pool;
pub mod segment;
pub mod segment_map;

pub use self::accounting::ByteAccounting;
pub use self::gc_trigger::CollectionTrigger;
pub use self::segment::{Segment, SegmentKind};
pub use self::segment_map::SegmentMap;
