// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use objmem::util::heap::SegmentMap;
use objmem::vm::{FlattenPolicy, Slot, SlotVisitor, Traceable};
use objmem::{Memory, MemoryBuilder, ObjectReference, TypeCode};

pub const PAIR: TypeCode = TypeCode(16);
pub const HANDLE: TypeCode = TypeCode(17);

pub const PAIR_BYTES: usize = 2 * std::mem::size_of::<usize>();

/// Two reference slots.
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

/// An object bound to its process, such as an open file. It only crosses an envelope as a
/// proxy.
pub struct HandleType;

impl Traceable for HandleType {
    fn name(&self) -> &'static str {
        "Handle"
    }

    fn has_references(&self) -> bool {
        false
    }

    fn scan_object(&self, _: &SegmentMap, _: ObjectReference, _: &mut dyn SlotVisitor) {}

    fn flatten_policy(&self) -> FlattenPolicy {
        FlattenPolicy::Proxy
    }
}

pub fn builder() -> MemoryBuilder {
    let mut builder = MemoryBuilder::new();
    assert!(builder.set_options_bulk_by_str(
        "segmentSize=4096 largeSegmentSize=16384 largeObjectThreshold=1024 maxHeapSize=4194304 \
         liveStackSize=8 saveStackSize=16 orphanCheck=false restoreImage=false"
    ));
    builder.register_type(PAIR, Arc::new(PairType)).unwrap();
    builder.register_type(HANDLE, Arc::new(HandleType)).unwrap();
    builder
}

pub fn memory() -> Memory {
    builder().build()
}

pub fn pair(memory: &Memory, first: Option<ObjectReference>, second: Option<ObjectReference>) -> ObjectReference {
    let object = memory.new_object(PAIR, PAIR_BYTES).unwrap();
    memory.set_field(object, 0, first).unwrap();
    memory.set_field(object, 1, second).unwrap();
    object
}

pub fn first(memory: &Memory, object: ObjectReference) -> Option<ObjectReference> {
    memory.get_field(object, 0).unwrap()
}

pub fn second(memory: &Memory, object: ObjectReference) -> Option<ObjectReference> {
    memory.get_field(object, 1).unwrap()
}

/// A path in the temporary directory that no other test uses.
pub fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("objmem-{}-{}", std::process::id(), name))
}
