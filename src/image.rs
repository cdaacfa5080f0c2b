//! Image save and restore.
//!
//! An image is a flat buffer holding the closure of a set of roots, written to a file:
//!
//! | field | size |
//! |-------|------|
//! | magic `OBJMIMG\0` | 8 bytes |
//! | version | u32 |
//! | byte count `n` | u64 |
//! | buffer words | `n` bytes, one little-endian u64 per word |
//!
//! The buffer's first object is the placeholder and its second is an array of the roots.
//! Restoring places the buffer in a new old-space segment: its objects become permanent and
//! are never swept.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::envelope::buffer::{self, FlatBuffer};
use crate::envelope::{Flattener, Relocator, Unflattener};
use crate::plan::context::TraversalContext;
use crate::plan::heap::Heap;
use crate::plan::live_stack::LiveStack;
use crate::policy::Block;
use crate::util::constants::{BYTES_IN_WORD, HEADER_BYTES, MIN_OBJECT_SIZE};
use crate::util::conversions::words_to_bytes;
use crate::util::error::{AllocationError, ImageError, TraversalError};
use crate::util::header::{MarkValue, ObjectHeader};
use crate::util::heap::SegmentKind;
use crate::util::{Address, ObjectReference};
use crate::vm::TypeCode;

const IMAGE_MAGIC: &[u8; 8] = b"OBJMIMG\0";
const IMAGE_VERSION: u32 = 1;

fn write_u32(w: &mut dyn Write, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_u32(r: &mut dyn Read) -> io::Result<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

fn write_u64(w: &mut dyn Write, v: u64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_u64(r: &mut dyn Read) -> io::Result<u64> {
    let mut b = [0u8; 8];
    r.read_exact(&mut b)?;
    Ok(u64::from_le_bytes(b))
}

/// Flatten the closure of `roots` into an image buffer. Proxies are not applied: the image
/// is restored into the memory that will run it.
pub(crate) fn flatten_image(heap: &mut Heap, roots: &[ObjectReference]) -> Result<FlatBuffer, TraversalError> {
    let mut flattener = Flattener::new(LiveStack::new(heap.options.live_stack_size), false);
    let size = HEADER_BYTES + words_to_bytes(1 + roots.len());
    let root_array = flattener.buffer_mut().reserve(size);
    debug_assert_eq!(root_array, MIN_OBJECT_SIZE);
    flattener
        .buffer_mut()
        .write_header(root_array, &ObjectHeader::init_header(size, MarkValue::CLEAR, TypeCode::ARRAY));
    flattener
        .buffer_mut()
        .store(root_array + HEADER_BYTES, roots.len());

    let mut context = TraversalContext::SavingImage(flattener);
    let mut offsets = Vec::with_capacity(roots.len());
    for &root in roots {
        offsets.push(context.trace_from(heap, root)?);
    }
    let TraversalContext::SavingImage(mut flattener) = context else {
        unreachable!("image mode changed during the traversal")
    };
    for (i, offset) in offsets.into_iter().enumerate() {
        flattener
            .buffer_mut()
            .store(root_array + HEADER_BYTES + words_to_bytes(1 + i), offset);
    }
    Ok(flattener.finish().0)
}

/// Save the closure of `roots` to `path`. Returns the size of the object region.
pub(crate) fn save_image(heap: &mut Heap, roots: &[ObjectReference], path: &Path) -> Result<usize, ImageError> {
    let buffer = flatten_image(heap, roots)?;
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(IMAGE_MAGIC)?;
    write_u32(&mut writer, IMAGE_VERSION)?;
    write_u64(&mut writer, buffer.len_bytes() as u64)?;
    for word in buffer.words() {
        write_u64(&mut writer, *word as u64)?;
    }
    writer.flush()?;
    info!(
        "Saved image of {} roots ({} bytes) to {}",
        roots.len(),
        buffer.len_bytes(),
        path.display()
    );
    Ok(buffer.len_bytes())
}

fn read_image_words(path: &Path) -> Result<Vec<usize>, ImageError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic)?;
    if &magic != IMAGE_MAGIC {
        return Err(ImageError::BadMagic);
    }
    let version = read_u32(&mut reader)?;
    if version != IMAGE_VERSION {
        return Err(ImageError::UnsupportedVersion(version as usize));
    }
    let bytes = read_u64(&mut reader)? as usize;
    if bytes % BYTES_IN_WORD != 0 {
        return Err(ImageError::Malformed {
            offset: 0,
            reason: "byte count is not a whole number of words",
        });
    }
    // The count is untrusted: the vector grows as words are actually read.
    let mut words = Vec::with_capacity((bytes / BYTES_IN_WORD).min(1 << 16));
    for _ in 0..bytes / BYTES_IN_WORD {
        words.push(read_u64(&mut reader)? as usize);
    }
    Ok(words)
}

/// Relocate a placed image and read its root array.
fn restore_objects(heap: &mut Heap, base: Address, starts: Vec<usize>) -> Result<Vec<ObjectReference>, TraversalError> {
    let objects: Vec<ObjectReference> = starts[1..]
        .iter()
        .filter_map(|offset| ObjectReference::from_raw_address(base + *offset))
        .collect();
    let root_array = objects[0];
    if heap.storage.header(root_array).type_code() != TypeCode::ARRAY {
        return Err(TraversalError::Malformed {
            offset: MIN_OBJECT_SIZE,
            reason: "image does not start with its root array",
        });
    }
    let mut restoring = TraversalContext::RestoringImage(Relocator::new(base, starts, heap.mark, true));
    restoring.walk(heap, &objects)?;
    let mut unflattening = TraversalContext::Unflattening(Unflattener::new());
    unflattening.walk(heap, &objects)?;
    if let TraversalContext::Unflattening(unflattener) = unflattening {
        unflattener.rehash_all(heap);
    }
    let len = heap.storage.body_word(root_array, 0);
    Ok((0..len)
        .filter_map(|i| heap.storage.load_reference(root_array.body_word(1 + i)))
        .collect())
}

/// Restore the image at `path` into a new old-space segment. The restored roots are
/// registered as roots and returned.
pub(crate) fn restore_image(heap: &mut Heap, path: &Path) -> Result<Vec<ObjectReference>, ImageError> {
    let words = read_image_words(path)?;
    let starts = buffer::validate(&words, &heap.types)?;
    let bytes = words.len() * BYTES_IN_WORD;
    let Some(base) = heap.storage.create_segment_from_words(words, SegmentKind::Old) else {
        return Err(AllocationError::HeapOutOfMemory { requested: bytes }.into());
    };
    let roots = match restore_objects(heap, base, starts) {
        Ok(roots) => roots,
        Err(e) => {
            heap.storage.release_segment(base);
            return Err(e.into());
        }
    };
    heap.sets[SegmentKind::Old].add_placed_segment(&mut heap.storage, base);
    heap.sets[SegmentKind::Old].free_block(
        &mut heap.storage,
        Block {
            start: base,
            size: MIN_OBJECT_SIZE,
        },
    );
    for root in &roots {
        heap.add_root(*root);
    }
    info!(
        "Restored image of {} roots ({} bytes) from {}",
        roots.len(),
        bytes,
        path.display()
    );
    Ok(roots)
}
