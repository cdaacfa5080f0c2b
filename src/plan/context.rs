//! The special traversal modes.
//!
//! Besides the plain mark phase, object graphs are walked to check the heap, to save an
//! image, to flatten an envelope, and to fix up a buffer that was just placed in the heap.
//! All of them enumerate references the same way, through the object's type, and differ
//! only in what is done with each reference. [`TraversalContext`] names the active mode and
//! carries its state; exactly one is active per traversal.

use crate::envelope::{Flattener, Relocator, Unflattener};
use crate::plan::heap::Heap;
use crate::plan::orphan::OrphanMarker;
use crate::plan::tracing::collect_slots;
use crate::util::error::TraversalError;
use crate::util::ObjectReference;
use crate::vm::Slot;

pub enum TraversalContext {
    /// Validate every reference while marking.
    OrphanCheck(OrphanMarker),
    /// Copy the closure of the image roots into an image buffer.
    SavingImage(Flattener),
    /// Copy the closure of an envelope receiver into an envelope buffer.
    Flattening(Flattener),
    /// Turn the offsets of a restored image into references.
    RestoringImage(Relocator),
    /// Turn the offsets of a placed envelope into references.
    Relocating(Relocator),
    /// Bind proxies and collect objects to rehash in a relocated envelope.
    Unflattening(Unflattener),
}

impl TraversalContext {
    /// Process one reference slot of the object being scanned.
    pub fn mark_general(&mut self, heap: &mut Heap, slot: Slot) -> Result<(), TraversalError> {
        match self {
            TraversalContext::OrphanCheck(marker) => Ok(marker.visit(heap, slot)?),
            TraversalContext::SavingImage(flattener) | TraversalContext::Flattening(flattener) => {
                flattener.visit(heap, slot)
            }
            TraversalContext::RestoringImage(relocator) | TraversalContext::Relocating(relocator) => {
                relocator.visit(heap, slot)
            }
            TraversalContext::Unflattening(unflattener) => unflattener.visit(heap, slot),
        }
    }

    /// Process every reference slot of `object`, its behaviour included.
    pub fn live_general(&mut self, heap: &mut Heap, object: ObjectReference) -> Result<(), TraversalError> {
        for slot in collect_slots(&heap.types, &heap.storage, object, true) {
            self.mark_general(heap, slot)?;
        }
        Ok(())
    }

    /// Start a graph traversal at `root`. Returns the word that stands for `root` in the
    /// output: its buffer offset when flattening, the reference itself otherwise.
    pub fn begin(&mut self, heap: &mut Heap, root: ObjectReference) -> Result<usize, TraversalError> {
        match self {
            TraversalContext::OrphanCheck(marker) => {
                marker.begin(heap, root)?;
                Ok(root.value())
            }
            TraversalContext::SavingImage(flattener) | TraversalContext::Flattening(flattener) => {
                flattener.begin(heap, root)
            }
            _ => Ok(root.value()),
        }
    }

    fn next_object(&mut self) -> Option<ObjectReference> {
        match self {
            TraversalContext::OrphanCheck(marker) => marker.next_object(),
            TraversalContext::SavingImage(flattener) | TraversalContext::Flattening(flattener) => {
                flattener.next_object()
            }
            _ => None,
        }
    }

    /// Trace the whole graph reachable from `root`.
    pub fn trace_from(&mut self, heap: &mut Heap, root: ObjectReference) -> Result<usize, TraversalError> {
        let word = self.begin(heap, root)?;
        while let Some(object) = self.next_object() {
            self.live_general(heap, object)?;
        }
        Ok(word)
    }

    /// Visit each object of a placed buffer once, in address order.
    pub fn walk(&mut self, heap: &mut Heap, objects: &[ObjectReference]) -> Result<(), TraversalError> {
        for &object in objects {
            match self {
                TraversalContext::RestoringImage(relocator) | TraversalContext::Relocating(relocator) => {
                    relocator.enter(heap, object)?
                }
                TraversalContext::Unflattening(unflattener) => unflattener.enter(heap, object),
                _ => {}
            }
            self.live_general(heap, object)?;
        }
        Ok(())
    }
}
