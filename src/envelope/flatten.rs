//! Packing: copying an object graph out of the heap into a flat buffer.

use crate::envelope::buffer::FlatBuffer;
use crate::envelope::Envelope;
use crate::plan::context::TraversalContext;
use crate::plan::heap::Heap;
use crate::plan::live_stack::LiveStack;
use crate::util::bucket::GrowableBucket;
use crate::util::constants::{BYTES_IN_WORD, HEADER_BYTES};
use crate::util::error::{EnvelopeError, TraversalError};
use crate::util::header::{MarkValue, ObjectHeader};
use crate::util::ObjectReference;
use crate::vm::builtin::requires_proxy;
use crate::vm::{Slot, TypeCode};

/// State of one flatten traversal.
///
/// Objects are copied into the buffer the first time they are reached, with their header
/// reset and their reference slots still holding heap addresses. The pair (original, offset)
/// is pushed, and scanning the original later overwrites each slot of the copy with the
/// offset of the referent. The duplicate table maps each original to its offset, which both
/// terminates cycles and preserves sharing.
pub struct Flattener {
    buffer: FlatBuffer,
    duplicates: GrowableBucket<usize>,
    stack: LiveStack<(ObjectReference, usize)>,
    /// The object being scanned and the offset of its copy.
    current: Option<(ObjectReference, usize)>,
    /// Replace registered objects by proxies. Images carry every object as is.
    apply_proxies: bool,
}

impl Flattener {
    pub fn new(stack: LiveStack<(ObjectReference, usize)>, apply_proxies: bool) -> Self {
        Flattener {
            buffer: FlatBuffer::new(),
            duplicates: GrowableBucket::new(),
            stack,
            current: None,
            apply_proxies,
        }
    }

    pub fn buffer_mut(&mut self) -> &mut FlatBuffer {
        &mut self.buffer
    }

    /// The finished buffer, and the stack to give back to its owner.
    pub fn finish(mut self) -> (FlatBuffer, LiveStack<(ObjectReference, usize)>) {
        self.stack.reset();
        (self.buffer, self.stack)
    }

    fn copy_object(&mut self, heap: &Heap, object: ObjectReference) -> usize {
        let header = heap.storage.header(object);
        let offset = self.buffer.reserve(header.size());
        self.buffer.write_header(offset, &header.for_flatten());
        self.buffer.write_body(offset, heap.storage.body(object));
        self.duplicates.put(offset, object);
        offset
    }

    fn copy_proxy(&mut self, object: ObjectReference, tag: usize) -> usize {
        let size = HEADER_BYTES + BYTES_IN_WORD;
        let mut header = ObjectHeader::init_header(size, MarkValue::CLEAR, TypeCode::PROXY);
        header.set_has_no_references();
        header.set_proxy();
        let offset = self.buffer.reserve(size);
        self.buffer.write_header(offset, &header);
        self.buffer.store(offset + HEADER_BYTES, tag);
        self.duplicates.put(offset, object);
        trace!("Flattened {} as proxy {}", object, tag);
        offset
    }

    /// The offset standing for `object`, copying it first if it has not been reached yet.
    pub fn flatten_reference(&mut self, heap: &Heap, object: ObjectReference) -> Result<usize, TraversalError> {
        if let Some(offset) = self.duplicates.get(object) {
            return Ok(offset);
        }
        if self.apply_proxies {
            if let Some(tag) = heap.proxies.tag_of(object) {
                return Ok(self.copy_proxy(object, tag));
            }
            let type_code = heap.storage.header(object).type_code();
            if heap.types.get(type_code).is_some_and(|ty| requires_proxy(ty.as_ref())) {
                panic!(
                    "{} of type {} cannot be flattened without a proxy",
                    object,
                    heap.types.name(type_code)
                );
            }
        }
        let offset = self.copy_object(heap, object);
        self.stack.push(Some((object, offset)));
        Ok(offset)
    }

    pub fn begin(&mut self, heap: &Heap, root: ObjectReference) -> Result<usize, TraversalError> {
        self.stack.push_sentinel();
        self.flatten_reference(heap, root)
    }

    pub fn next_object(&mut self) -> Option<ObjectReference> {
        self.current = self.stack.pop();
        self.current.map(|(original, _)| original)
    }

    /// Replace the copy of `slot` with the offset of its referent.
    pub fn visit(&mut self, heap: &mut Heap, slot: Slot) -> Result<(), TraversalError> {
        let Some((original, offset)) = self.current else {
            return Ok(());
        };
        let word = match slot.load(&heap.storage) {
            Some(referent) => self.flatten_reference(heap, referent)?,
            None => 0,
        };
        self.buffer
            .store(offset + (slot.address() - original.to_raw_address()), word);
        Ok(())
    }
}

/// Pack `receiver` and everything it reaches. The flatten stack is borrowed for the
/// duration of the traversal.
pub(crate) fn pack(
    heap: &mut Heap,
    stack: &mut LiveStack<(ObjectReference, usize)>,
    receiver: ObjectReference,
) -> Result<Envelope, EnvelopeError> {
    let flattener = Flattener::new(std::mem::replace(stack, LiveStack::new(0)), true);
    let mut context = TraversalContext::Flattening(flattener);
    let result = context.trace_from(heap, receiver);
    let TraversalContext::Flattening(flattener) = context else {
        unreachable!("flatten mode changed during the traversal")
    };
    let (buffer, returned) = flattener.finish();
    *stack = returned;
    let offset = result?;
    debug_assert_eq!(offset, HEADER_BYTES);
    debug!("Packed {} into {} bytes", receiver, buffer.len_bytes());
    Ok(Envelope::from_buffer(buffer))
}
