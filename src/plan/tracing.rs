//! This module contains code useful for tracing,
//! i.e. visiting the reachable objects by traversing all or part of an object graph.

use crate::util::constants::BEHAVIOUR_WORD;
use crate::util::heap::SegmentMap;
use crate::util::ObjectReference;
use crate::vm::{Slot, TypeTable};

/// A buffer of values produced during tracing.
///
/// Scanning reads object storage while the traversal that consumes the slots writes it, so
/// slots are collected here first and processed afterwards.
pub struct VectorQueue<T> {
    /// Enqueued values.
    buffer: Vec<T>,
}

impl<T> VectorQueue<T> {
    /// Reserve a capacity of this on first enqueue to avoid frequent resizing.
    const CAPACITY: usize = 64;

    /// Create an empty `VectorQueue`.
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Return the contents of the underlying vector.  It will empty the queue.
    pub fn take(&mut self) -> Vec<T> {
        std::mem::take(&mut self.buffer)
    }

    #[inline(always)]
    pub fn push(&mut self, v: T) {
        if self.buffer.is_empty() {
            self.buffer.reserve(Self::CAPACITY);
        }
        self.buffer.push(v);
    }
}

impl<T> Default for VectorQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The slot holding an object's non-primitive behaviour, if it has one.
pub fn behaviour_slot(storage: &SegmentMap, object: ObjectReference) -> Option<Slot> {
    storage
        .header(object)
        .is_non_primitive()
        .then(|| Slot::from_address(object.header_word(BEHAVIOUR_WORD)))
}

/// Collect the reference slots of `object`: the behaviour slot first (if
/// `with_behaviour` is set and the object is non-primitive), then the body slots reported
/// by the object's type. Objects of unknown type report no slots.
pub fn collect_slots(
    types: &TypeTable,
    storage: &SegmentMap,
    object: ObjectReference,
    with_behaviour: bool,
) -> Vec<Slot> {
    let mut queue = VectorQueue::new();
    if with_behaviour {
        if let Some(slot) = behaviour_slot(storage, object) {
            queue.push(slot);
        }
    }
    let header = storage.header(object);
    if header.has_references() {
        if let Some(ty) = types.get(header.type_code()) {
            ty.scan_object(storage, object, &mut |slot: Slot| queue.push(slot));
        }
    }
    queue.take()
}
