//! Puffing: turning an envelope back into live objects.

use crate::envelope::buffer;
use crate::envelope::relocate::{Relocator, Unflattener};
use crate::envelope::Envelope;
use crate::plan::context::TraversalContext;
use crate::plan::heap::Heap;
use crate::policy::Block;
use crate::util::constants::MIN_OBJECT_SIZE;
use crate::util::error::{EnvelopeError, TraversalError};
use crate::util::{Address, ObjectReference};

/// Relocate the placed objects, then bind proxies and rehash. Returns the receiver.
fn unflatten(
    heap: &mut Heap,
    base: Address,
    starts: Vec<usize>,
    objects: &[ObjectReference],
) -> Result<ObjectReference, TraversalError> {
    let mut relocating = TraversalContext::Relocating(Relocator::new(base, starts, heap.mark, false));
    relocating.walk(heap, objects)?;

    let mut unflattening = TraversalContext::Unflattening(Unflattener::new());
    unflattening.walk(heap, objects)?;
    let TraversalContext::Unflattening(unflattener) = unflattening else {
        unreachable!("unflatten mode changed during the traversal")
    };
    let receiver = unflattener.resolve(heap, objects[0])?;
    unflattener.rehash_all(heap);
    Ok(receiver)
}

/// Copy the envelope into the heap and reconstruct its objects. The receiver is returned
/// on the save stack. Nothing is left behind if the envelope turns out to be malformed.
pub(crate) fn puff(heap: &mut Heap, envelope: &Envelope) -> Result<ObjectReference, EnvelopeError> {
    let words = envelope.words();
    let starts = buffer::validate(words, &heap.types)?;
    let size = envelope.len_bytes();
    let block = heap.allocate_block(heap.set_for_size(size), size)?;
    heap.trigger.on_allocation(block.size);
    heap.storage
        .words_mut(block.start, words.len())
        .copy_from_slice(words);

    // The block may be a little larger than the buffer. A usable tail is freed, a smaller
    // one is given to the last object.
    let slack = block.size - size;
    let placed = if slack >= MIN_OBJECT_SIZE {
        heap.free_block(Block {
            start: block.start + size,
            size: slack,
        });
        Block {
            start: block.start,
            size,
        }
    } else {
        if slack > 0 {
            heap.storage.zero_bytes(block.start + size, slack);
            if let Some(last) = starts
                .last()
                .and_then(|offset| ObjectReference::from_raw_address(block.start + *offset))
            {
                heap.storage
                    .update_header(last, |h| h.set_size(h.size() + slack));
            }
        }
        block
    };

    let objects: Vec<ObjectReference> = starts[1..]
        .iter()
        .filter_map(|offset| ObjectReference::from_raw_address(placed.start + *offset))
        .collect();
    match unflatten(heap, placed.start, starts, &objects) {
        Ok(receiver) => {
            heap.free_block(Block {
                start: placed.start,
                size: MIN_OBJECT_SIZE,
            });
            heap.protect(receiver);
            debug!(
                "Unpacked {} objects ({} bytes), receiver {}",
                objects.len(),
                size,
                receiver
            );
            Ok(receiver)
        }
        Err(e) => {
            warn!("Rejected envelope: {}", e);
            heap.free_block(placed);
            Err(e.into())
        }
    }
}
