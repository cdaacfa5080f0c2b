// Not every test uses every helper.
#![allow(dead_code)]

use std::sync::Arc;

use crate::memory::{Memory, MemoryBuilder};
use crate::plan::Heap;
use crate::util::constants::BYTES_IN_WORD;
use crate::util::heap::SegmentMap;
use crate::util::options::Options;
use crate::util::ObjectReference;
use crate::vm::{Slot, SlotVisitor, Traceable, TypeCode, TypeTable};

/// Type code of [`PairType`] in fixture memories.
pub const PAIR: TypeCode = TypeCode(TypeCode::FIRST_USER.0);

/// Body size of a pair.
pub const PAIR_BYTES: usize = 2 * BYTES_IN_WORD;

/// A cons cell: two reference slots.
pub struct PairType;

impl Traceable for PairType {
    fn name(&self) -> &'static str {
        "Pair"
    }

    fn scan_object(&self, _storage: &SegmentMap, object: ObjectReference, visitor: &mut dyn SlotVisitor) {
        visitor.visit_slot(Slot::of_body(object, 0));
        visitor.visit_slot(Slot::of_body(object, 1));
    }

    fn layout_is_valid(&self, storage: &SegmentMap, object: ObjectReference) -> bool {
        storage.header(object).body_words() >= 2
    }
}

/// Options for tests: environment variables are ignored and segments are small.
pub fn test_options() -> Options {
    let mut options = Options::builtin_defaults();
    options.segment_size = 4096;
    options.large_segment_size = 16384;
    options.large_object_threshold = 1024;
    options.max_heap_size = 4 << 20;
    options.live_stack_size = 8;
    options.save_stack_size = 16;
    options
}

pub fn test_types() -> TypeTable {
    let mut types = TypeTable::new();
    types
        .register(PAIR, Arc::new(PairType))
        .expect("pair type registered twice");
    types
}

/// A bare heap with the pair type registered.
pub fn heap() -> Heap {
    Heap::new(Arc::new(test_options()), Arc::new(test_types()))
}

pub fn builder() -> MemoryBuilder {
    let mut builder = MemoryBuilder::new();
    builder.options = test_options();
    builder
        .register_type(PAIR, Arc::new(PairType))
        .expect("pair type registered twice");
    builder
}

/// A memory with the pair type registered.
pub fn memory() -> Memory {
    builder().build()
}

/// Allocate a pair and fill both slots.
pub fn pair(heap: &mut Heap, first: Option<ObjectReference>, second: Option<ObjectReference>) -> ObjectReference {
    let object = heap.new_object(PAIR, PAIR_BYTES).expect("out of memory");
    heap.write_reference(object, 0, first);
    heap.write_reference(object, 1, second);
    object
}
