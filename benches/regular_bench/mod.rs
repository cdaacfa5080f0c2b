pub mod alloc;
pub mod collect;
pub mod envelope;

use std::sync::Arc;

pub use criterion::Criterion;

use objmem::util::heap::SegmentMap;
use objmem::vm::{Slot, SlotVisitor, Traceable};
use objmem::{Memory, MemoryBuilder, ObjectReference, TypeCode};

pub const PAIR: TypeCode = TypeCode(16);
pub const PAIR_BYTES: usize = 2 * std::mem::size_of::<usize>();

struct PairType;

impl Traceable for PairType {
    fn name(&self) -> &'static str {
        "Pair"
    }

    fn scan_object(&self, _storage: &SegmentMap, object: ObjectReference, visitor: &mut dyn SlotVisitor) {
        visitor.visit_slot(Slot::of_body(object, 0));
        visitor.visit_slot(Slot::of_body(object, 1));
    }
}

/// A memory with the pair type registered and room for the larger benchmarks.
pub fn memory(max_heap_size: usize) -> Memory {
    let mut builder = MemoryBuilder::new();
    assert!(builder.set_option("maxHeapSize", &max_heap_size.to_string()));
    builder.register_type(PAIR, Arc::new(PairType)).unwrap();
    builder.build()
}

/// A binary tree of pairs of the given depth.
pub fn tree(memory: &Memory, depth: usize) -> ObjectReference {
    let node = memory.new_object(PAIR, PAIR_BYTES).unwrap();
    if depth > 0 {
        let left = tree(memory, depth - 1);
        let right = tree(memory, depth - 1);
        memory.set_field(node, 0, Some(left)).unwrap();
        memory.set_field(node, 1, Some(right)).unwrap();
    }
    node
}

pub fn bench(c: &mut Criterion) {
    alloc::bench(c);
    collect::bench(c);
    envelope::bench(c);
}
