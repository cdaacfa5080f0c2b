//! The validating mark used by the orphan check.
//!
//! It marks the same objects as the normal mark phase, but every reference is checked before
//! it is followed, and the live stack carries enough history to report how a bad reference
//! was reached.

use std::collections::HashSet;

use crate::plan::heap::Heap;
use crate::plan::live_stack::LiveStack;
use crate::util::constants::{BYTES_IN_GRAIN, HEADER_BYTES};
use crate::util::conversions::is_valid_object_size;
use crate::util::error::{ConsistencyError, OrphanKind};
use crate::util::heap::SegmentMap;
use crate::util::{Address, ObjectReference};
use crate::vm::Slot;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum OrphanEntry {
    /// Waiting to be scanned.
    Object(ObjectReference),
    /// Being scanned. Popped once everything pushed while scanning it is done, so the
    /// `Ancestor` entries on the stack always spell out the path from the root.
    Ancestor(ObjectReference),
}

pub struct OrphanMarker {
    /// Start of every object and dead block in the heap.
    starts: HashSet<Address>,
    stack: LiveStack<OrphanEntry>,
}

impl OrphanMarker {
    /// Walk every segment to learn where objects start. A segment whose objects do not tile
    /// it is already corrupt.
    pub fn new(storage: &SegmentMap, stack_size: usize) -> Result<Self, ConsistencyError> {
        let mut starts = HashSet::new();
        for segment in storage.segments() {
            for step in segment.objects() {
                match step {
                    Ok((addr, _)) => {
                        starts.insert(addr);
                    }
                    Err(bad) => {
                        return Err(ConsistencyError {
                            reference: bad.at,
                            kind: OrphanKind::MalformedSegment {
                                at: bad.at,
                                size: bad.size,
                            },
                            ancestry: vec![],
                        })
                    }
                }
            }
        }
        Ok(OrphanMarker {
            starts,
            stack: LiveStack::new(stack_size),
        })
    }

    fn ancestry(&self) -> Vec<ObjectReference> {
        self.stack
            .iter()
            .rev()
            .filter_map(|entry| match entry {
                Some(OrphanEntry::Ancestor(object)) => Some(object),
                _ => None,
            })
            .collect()
    }

    fn orphan(&self, reference: Address, kind: OrphanKind) -> ConsistencyError {
        ConsistencyError {
            reference,
            kind,
            ancestry: self.ancestry(),
        }
    }

    fn validate(&self, heap: &Heap, object: ObjectReference) -> Result<(), ConsistencyError> {
        let addr = object.to_raw_address();
        let Some(segment) = heap.storage.segment_of(addr) else {
            return Err(self.orphan(addr, OrphanKind::OutsideHeap));
        };
        if !addr.is_aligned_to(BYTES_IN_GRAIN) {
            return Err(self.orphan(addr, OrphanKind::Misaligned));
        }
        if !self.starts.contains(&addr) || segment.end() - addr < HEADER_BYTES {
            return Err(self.orphan(addr, OrphanKind::NotObjectStart));
        }
        let header = segment.read_header(addr);
        if !is_valid_object_size(header.size()) || header.size() > segment.end() - addr {
            return Err(self.orphan(addr, OrphanKind::BadSize(header.size())));
        }
        if header.is_dead_object() {
            return Err(self.orphan(addr, OrphanKind::DeadObject));
        }
        if !heap.types.is_known(header.type_code()) {
            return Err(self.orphan(addr, OrphanKind::UnknownType(header.type_code())));
        }
        Ok(())
    }

    /// Check `object` and mark it. Old-space objects are checked but not traced.
    fn mark(&mut self, heap: &mut Heap, object: ObjectReference) -> Result<(), ConsistencyError> {
        self.validate(heap, object)?;
        let mut header = heap.storage.header(object);
        if header.is_old_space() || header.is_object_live(heap.mark) {
            return Ok(());
        }
        header.set_object_mark(heap.mark);
        heap.storage.set_header(object, &header);
        // Objects without references are pushed too, so their behaviour gets checked.
        self.stack.push(Some(OrphanEntry::Object(object)));
        Ok(())
    }

    /// Start a traversal at `root`.
    pub fn begin(&mut self, heap: &mut Heap, root: ObjectReference) -> Result<(), ConsistencyError> {
        self.stack.push_sentinel();
        self.mark(heap, root)
    }

    /// The next object to scan, or `None` once the current traversal is complete.
    pub fn next_object(&mut self) -> Option<ObjectReference> {
        loop {
            match self.stack.pop()? {
                OrphanEntry::Ancestor(_) => continue,
                OrphanEntry::Object(object) => {
                    self.stack.push(Some(OrphanEntry::Ancestor(object)));
                    return Some(object);
                }
            }
        }
    }

    pub fn visit(&mut self, heap: &mut Heap, slot: Slot) -> Result<(), ConsistencyError> {
        match slot.load(&heap.storage) {
            Some(referent) => self.mark(heap, referent),
            None => Ok(()),
        }
    }
}
