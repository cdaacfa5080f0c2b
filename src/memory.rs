//! The object memory: a process-wide facade over the locked [`Heap`].
//!
//! All allocation, object access and collection goes through the heap lock, so a collection
//! never runs concurrently with any other heap operation. Packing and unpacking envelopes
//! additionally take the envelope or unflatten lock, and packing borrows the shared flatten
//! stack. Those three locks are acquired through [`acquire`]: a blocked activity gives up
//! kernel access while it waits.

use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use enum_map::EnumMap;

use crate::envelope::{self, Envelope};
use crate::image;
use crate::plan::{CollectionSummary, Heap, LiveStack};
use crate::policy::SetStats;
use crate::util::constants::{BYTES_IN_GRAIN, BYTES_IN_WORD, HEADER_BYTES};
use crate::util::conversions::{checked_words_to_bytes, is_valid_object_size};
use crate::util::error::{AllocationError, ConsistencyError, EnvelopeError, ImageError, MemoryError};
use crate::util::header::ObjectHeader;
use crate::util::heap::SegmentKind;
use crate::util::options::Options;
use crate::util::ObjectReference;
use crate::vm::builtin::{table_probe, TableProbe, BEHAVIOUR_FIXED_WORDS, TABLE_FIXED_WORDS};
use crate::vm::{Activity, Traceable, TypeCode, TypeTable};

/// Lock `lock` on behalf of `activity`. If the lock is taken, the activity releases kernel
/// access for the duration of the wait.
fn acquire<'a, T>(lock: &'a Mutex<T>, activity: &dyn Activity) -> MutexGuard<'a, T> {
    match lock.try_lock() {
        Ok(guard) => guard,
        Err(TryLockError::Poisoned(e)) => e.into_inner(),
        Err(TryLockError::WouldBlock) => {
            activity.release_kernel();
            let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            activity.request_kernel();
            guard
        }
    }
}

/// Occupancy of the whole memory.
#[derive(Copy, Clone, Debug, Default)]
pub struct MemoryStats {
    pub sets: EnumMap<SegmentKind, SetStats>,
    pub committed_bytes: usize,
    pub collections: usize,
}

impl MemoryStats {
    pub fn segments(&self) -> usize {
        self.sets.values().map(|s| s.segments).sum()
    }

    pub fn live_objects(&self) -> usize {
        self.sets.values().map(|s| s.live_objects).sum()
    }

    pub fn live_bytes(&self) -> usize {
        self.sets.values().map(|s| s.live_bytes).sum()
    }

    pub fn free_bytes(&self) -> usize {
        self.sets.values().map(|s| s.free_bytes).sum()
    }
}

/// Collects options and runtime types before the memory is created.
pub struct MemoryBuilder {
    pub options: Options,
    types: TypeTable,
}

impl MemoryBuilder {
    /// A builder with options read from the environment and the built-in types registered.
    pub fn new() -> Self {
        MemoryBuilder {
            options: Options::default(),
            types: TypeTable::new(),
        }
    }

    /// Set an option by its camelCase or snake_case name.
    pub fn set_option(&mut self, name: &str, val: &str) -> bool {
        self.options.set_from_camelcase_str(name, val)
    }

    /// Set options from a white-space separated list of `key=value` pairs.
    pub fn set_options_bulk_by_str(&mut self, options: &str) -> bool {
        self.options.set_bulk_from_str(options)
    }

    pub fn register_type(&mut self, code: TypeCode, ty: Arc<dyn Traceable>) -> Result<(), MemoryError> {
        self.types.register(code, ty)
    }

    pub fn build(self) -> Memory {
        Memory::new(self.options, self.types)
    }
}

impl Default for MemoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// One object memory.
pub struct Memory {
    heap: Mutex<Heap>,
    types: Arc<TypeTable>,
    options: Arc<Options>,
    /// Work list of pack traversals, kept between packs so it only grows once.
    flatten_stack: Mutex<LiveStack<(ObjectReference, usize)>>,
    /// One pack at a time.
    envelope_lock: Mutex<()>,
    /// One unpack at a time.
    unflatten_lock: Mutex<()>,
}

impl Memory {
    fn new(options: Options, types: TypeTable) -> Self {
        let options = Arc::new(options);
        let types = Arc::new(types);
        Memory {
            heap: Mutex::new(Heap::new(options.clone(), types.clone())),
            flatten_stack: Mutex::new(LiveStack::new(options.live_stack_size)),
            envelope_lock: Mutex::new(()),
            unflatten_lock: Mutex::new(()),
            types,
            options,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    /// A fatal consistency panic leaves the heap lock poisoned. The heap is still whole
    /// then, because a failed mark is abandoned before the panic, so the guard is recovered.
    fn heap(&self) -> MutexGuard<'_, Heap> {
        self.heap.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /* Allocation */

    /// Allocate a new object of a registered type with a zeroed body of at least `body_bytes`
    /// bytes. Once the save stack is initialized, the object survives the next collection
    /// even if it is not stored anywhere.
    pub fn new_object(&self, type_code: TypeCode, body_bytes: usize) -> Result<ObjectReference, MemoryError> {
        self.heap().new_object(type_code, body_bytes)
    }

    /// A new array of `len` null references.
    pub fn new_array(&self, len: usize) -> Result<ObjectReference, MemoryError> {
        alloc_array(&mut self.heap(), len)
    }

    /// A new byte string holding a copy of `bytes`.
    pub fn new_bytes(&self, bytes: &[u8]) -> Result<ObjectReference, MemoryError> {
        alloc_bytes(&mut self.heap(), bytes)
    }

    /// A new identity table with room for `capacity` entries.
    pub fn new_identity_table(&self, capacity: usize) -> Result<ObjectReference, MemoryError> {
        let mut heap = self.heap();
        let table = heap.new_object(TypeCode::IDENTITY_TABLE, body_bytes(TABLE_FIXED_WORDS, capacity, 2)?)?;
        heap.storage.set_body_word(table, 1, capacity);
        Ok(table)
    }

    /// A new non-primitive behaviour for instances of `base` with `slots` reference slots.
    pub fn new_behaviour(&self, base: TypeCode, slots: usize) -> Result<ObjectReference, MemoryError> {
        let mut heap = self.heap();
        if !heap.types.is_known(base) {
            return Err(MemoryError::UnknownType(base));
        }
        let behaviour = heap.new_object(TypeCode::BEHAVIOUR, body_bytes(BEHAVIOUR_FIXED_WORDS, slots, 1)?)?;
        heap.storage.set_body_word(behaviour, 0, base.0 as usize);
        heap.storage.set_body_word(behaviour, 1, slots);
        Ok(behaviour)
    }

    /// Allocate a permanent object. It is never collected.
    pub fn old_object(&self, type_code: TypeCode, body_bytes: usize) -> Result<ObjectReference, MemoryError> {
        self.heap().old_object(type_code, body_bytes)
    }

    pub fn clone_object(&self, original: ObjectReference) -> Result<ObjectReference, MemoryError> {
        let mut heap = self.heap();
        checked(&heap, original)?;
        heap.clone_object(original)
    }

    /* Object access */

    pub fn behaviour(&self, object: ObjectReference) -> Result<Option<ObjectReference>, MemoryError> {
        Ok(checked(&self.heap(), object)?.behaviour())
    }

    /// Attach a non-primitive behaviour to `object`, or make it primitive again with `None`.
    pub fn set_behaviour(&self, object: ObjectReference, behaviour: Option<ObjectReference>) -> Result<(), MemoryError> {
        let mut heap = self.heap();
        let header = checked(&heap, object)?;
        if let Some(behaviour) = behaviour {
            expect_type(&heap, behaviour, TypeCode::BEHAVIOUR)?;
        }
        if header.is_old_space() {
            heap.forget_old_reference(header.behaviour());
            heap.remember_old_reference(behaviour);
        }
        heap.storage
            .update_header(object, |h| h.set_behaviour(behaviour));
        Ok(())
    }

    /// Load the reference at body word `index`.
    pub fn get_field(&self, object: ObjectReference, index: usize) -> Result<Option<ObjectReference>, MemoryError> {
        let heap = self.heap();
        body_index(&heap, object, index)?;
        Ok(heap.storage.load_reference(object.body_word(index)))
    }

    /// Store a reference at body word `index`. This is the write barrier: stores into old
    /// objects keep the remembered set current.
    pub fn set_field(&self, object: ObjectReference, index: usize, value: Option<ObjectReference>) -> Result<(), MemoryError> {
        let mut heap = self.heap();
        body_index(&heap, object, index)?;
        if let Some(value) = value {
            checked(&heap, value)?;
        }
        heap.write_reference(object, index, value);
        Ok(())
    }

    /// Load a raw body word.
    pub fn get_word(&self, object: ObjectReference, index: usize) -> Result<usize, MemoryError> {
        let heap = self.heap();
        body_index(&heap, object, index)?;
        Ok(heap.storage.body_word(object, index))
    }

    /// Store a raw body word. Reference slots must be written with [`Memory::set_field`].
    pub fn set_word(&self, object: ObjectReference, index: usize, value: usize) -> Result<(), MemoryError> {
        let mut heap = self.heap();
        body_index(&heap, object, index)?;
        heap.storage.set_body_word(object, index, value);
        Ok(())
    }

    pub fn array_len(&self, array: ObjectReference) -> Result<usize, MemoryError> {
        let heap = self.heap();
        expect_type(&heap, array, TypeCode::ARRAY)?;
        Ok(heap.storage.body_word(array, 0))
    }

    pub fn array_get(&self, array: ObjectReference, index: usize) -> Result<Option<ObjectReference>, MemoryError> {
        let heap = self.heap();
        array_index(&heap, array, index)?;
        Ok(heap.storage.load_reference(array.body_word(1 + index)))
    }

    pub fn array_set(&self, array: ObjectReference, index: usize, value: Option<ObjectReference>) -> Result<(), MemoryError> {
        let mut heap = self.heap();
        array_index(&heap, array, index)?;
        if let Some(value) = value {
            checked(&heap, value)?;
        }
        heap.write_reference(array, 1 + index, value);
        Ok(())
    }

    /// The contents of a byte string.
    pub fn bytes(&self, object: ObjectReference) -> Result<Vec<u8>, MemoryError> {
        let heap = self.heap();
        expect_type(&heap, object, TypeCode::BYTES)?;
        let len = heap.storage.body_word(object, 0);
        if len == 0 {
            return Ok(vec![]);
        }
        let words = heap
            .storage
            .words(object.body_word(1), len.div_ceil(BYTES_IN_WORD));
        Ok(bytemuck::cast_slice::<usize, u8>(words)[..len].to_vec())
    }

    /// Bind `key` to `value` in an identity table.
    pub fn table_put(&self, table: ObjectReference, key: ObjectReference, value: Option<ObjectReference>) -> Result<(), MemoryError> {
        let mut heap = self.heap();
        expect_type(&heap, table, TypeCode::IDENTITY_TABLE)?;
        checked(&heap, key)?;
        if let Some(value) = value {
            checked(&heap, value)?;
        }
        let pair = match table_probe(&heap.storage, table, key) {
            TableProbe::Found(pair) => pair,
            TableProbe::Vacant(pair) => {
                heap.write_reference(table, TABLE_FIXED_WORDS + 2 * pair, Some(key));
                let count = heap.storage.body_word(table, 0);
                heap.storage.set_body_word(table, 0, count + 1);
                pair
            }
            TableProbe::Full => return Err(MemoryError::TableFull(table)),
        };
        heap.write_reference(table, TABLE_FIXED_WORDS + 2 * pair + 1, value);
        Ok(())
    }

    /// The value bound to `key`, or `None` if `key` is absent or bound to null.
    pub fn table_get(&self, table: ObjectReference, key: ObjectReference) -> Result<Option<ObjectReference>, MemoryError> {
        let heap = self.heap();
        expect_type(&heap, table, TypeCode::IDENTITY_TABLE)?;
        Ok(match table_probe(&heap.storage, table, key) {
            TableProbe::Found(pair) => heap
                .storage
                .load_reference(table.body_word(TABLE_FIXED_WORDS + 2 * pair + 1)),
            _ => None,
        })
    }

    pub fn table_len(&self, table: ObjectReference) -> Result<usize, MemoryError> {
        let heap = self.heap();
        expect_type(&heap, table, TypeCode::IDENTITY_TABLE)?;
        Ok(heap.storage.body_word(table, 0))
    }

    /* Inspection */

    pub fn type_of(&self, object: ObjectReference) -> Result<TypeCode, MemoryError> {
        Ok(checked(&self.heap(), object)?.type_code())
    }

    /// Size of the object in bytes, header included.
    pub fn size_of(&self, object: ObjectReference) -> Result<usize, MemoryError> {
        Ok(checked(&self.heap(), object)?.size())
    }

    pub fn is_old_space(&self, object: ObjectReference) -> Result<bool, MemoryError> {
        Ok(checked(&self.heap(), object)?.is_old_space())
    }

    /// Does `object` name an object of this memory? Unlike the checks made by the accessors,
    /// this walks the containing segment to make sure `object` is an object start.
    pub fn is_valid_object(&self, object: ObjectReference) -> bool {
        self.heap().is_valid_object(object)
    }

    /* Collection */

    /// Run a full collection. A corrupt heap found while marking with `orphan_check` set
    /// aborts the process.
    pub fn collect(&self) -> CollectionSummary {
        self.heap().collect()
    }

    /// Collect with every reference validated, returning the first inconsistency instead
    /// of aborting. Nothing is reclaimed when an inconsistency is found.
    pub fn verify_heap(&self) -> Result<CollectionSummary, ConsistencyError> {
        self.heap().verify()
    }

    /* Roots and protection */

    pub fn add_root(&self, object: ObjectReference) -> Result<(), MemoryError> {
        let mut heap = self.heap();
        checked(&heap, object)?;
        heap.add_root(object);
        Ok(())
    }

    pub fn remove_root(&self, object: ObjectReference) -> bool {
        self.heap().remove_root(object)
    }

    /// Keep `object` alive until a matching [`Memory::release_hold`].
    pub fn hold(&self, object: ObjectReference) -> Result<(), MemoryError> {
        let mut heap = self.heap();
        checked(&heap, object)?;
        heap.save_table.hold(object);
        Ok(())
    }

    pub fn release_hold(&self, object: ObjectReference) -> bool {
        self.heap().save_table.release(object)
    }

    /// Take `object` off the save stack once it is anchored elsewhere.
    pub fn discard(&self, object: ObjectReference) -> bool {
        self.heap()
            .save_stack
            .as_mut()
            .is_some_and(|s| s.remove(object, true))
    }

    /// Make room for `size` unanchored objects at once.
    pub fn extend_save_stack(&self, size: usize) {
        let mut heap = self.heap();
        heap.init_save_stack();
        if let Some(save_stack) = heap.save_stack.as_mut() {
            save_stack.extend(size);
        }
    }

    /// End of bootstrap. New objects are protected by the save stack from now on.
    pub fn init_save_stack(&self) {
        self.heap().init_save_stack()
    }

    /* Uninit */

    /// Ask for `object` to be queued, rather than reclaimed, once it becomes unreachable.
    pub fn set_uninit(&self, object: ObjectReference) -> Result<(), MemoryError> {
        let mut heap = self.heap();
        let header = checked(&heap, object)?;
        if header.is_old_space() {
            // Old objects are never unreachable.
            return Ok(());
        }
        heap.storage
            .update_header(object, |h| h.set_has_uninit(true));
        heap.uninit_table.put(1, object);
        Ok(())
    }

    /// Objects found unreachable since the last call. They stay alive until the caller
    /// drops them.
    pub fn take_pending_uninits(&self) -> Vec<ObjectReference> {
        let mut heap = self.heap();
        let pending = std::mem::take(&mut heap.pending_uninits);
        for object in &pending {
            heap.storage
                .update_header(*object, |h| h.set_uninit_pending(false));
        }
        pending
    }

    /* Proxies */

    /// Register `object` to cross envelope boundaries as `tag`.
    pub fn register_proxy(&self, object: ObjectReference, tag: usize) -> Result<(), MemoryError> {
        let mut heap = self.heap();
        checked(&heap, object)?;
        heap.proxies.register(object, tag);
        Ok(())
    }

    /* Envelopes */

    /// Pack `receiver` and everything reachable from it.
    pub fn pack(&self, activity: &dyn Activity, receiver: ObjectReference) -> Result<Envelope, EnvelopeError> {
        let _envelope = acquire(&self.envelope_lock, activity);
        let mut stack = acquire(&self.flatten_stack, activity);
        let mut heap = self.heap();
        checked(&heap, receiver)?;
        envelope::pack(&mut heap, &mut stack, receiver)
    }

    /// Pack a message send: an array of the receiver, the message name and an array of
    /// the arguments.
    pub fn pack_message(
        &self,
        activity: &dyn Activity,
        receiver: ObjectReference,
        message: &str,
        arguments: &[ObjectReference],
    ) -> Result<Envelope, EnvelopeError> {
        let _envelope = acquire(&self.envelope_lock, activity);
        let mut stack = acquire(&self.flatten_stack, activity);
        let mut heap = self.heap();
        checked(&heap, receiver)?;
        for argument in arguments {
            checked(&heap, *argument)?;
        }
        // Everything involved must survive a collection triggered by the allocations.
        let mut held = Vec::with_capacity(arguments.len() + 3);
        held.push(receiver);
        held.extend_from_slice(arguments);
        for object in &held {
            heap.save_table.hold(*object);
        }
        let result = build_message(&mut heap, &mut held, receiver, message, arguments)
            .map_err(EnvelopeError::from)
            .and_then(|message| envelope::pack(&mut heap, &mut stack, message));
        for object in &held {
            heap.save_table.release(*object);
        }
        result
    }

    /// Pack `receiver` and write the envelope to `destination`. Returns the number of bytes
    /// written.
    pub fn pack_to<W: Write>(
        &self,
        activity: &dyn Activity,
        receiver: ObjectReference,
        destination: &mut W,
    ) -> Result<usize, EnvelopeError> {
        let envelope = self.pack(activity, receiver)?;
        let bytes = envelope.to_bytes();
        destination.write_all(&bytes)?;
        Ok(bytes.len())
    }

    /// Rebuild the objects of `envelope` in this memory. The receiver is returned, protected
    /// by the save stack. A malformed envelope leaves the heap as it was.
    pub fn unpack(&self, activity: &dyn Activity, envelope: &Envelope) -> Result<ObjectReference, EnvelopeError> {
        let _unflatten = acquire(&self.unflatten_lock, activity);
        let mut heap = self.heap();
        envelope::puff(&mut heap, envelope)
    }

    pub fn unpack_from<R: Read>(&self, activity: &dyn Activity, source: &mut R) -> Result<ObjectReference, EnvelopeError> {
        let envelope = Envelope::read_from(source)?;
        self.unpack(activity, &envelope)
    }

    /* Images */

    /// Save the closure of `roots` as an image file. Returns the size of the object region.
    pub fn save_image(&self, roots: &[ObjectReference], path: &Path) -> Result<usize, ImageError> {
        let mut heap = self.heap();
        for root in roots {
            checked(&heap, *root)?;
        }
        image::save_image(&mut heap, roots, path)
    }

    /// Load an image into old space. Its roots are registered and returned.
    pub fn restore_image(&self, path: &Path) -> Result<Vec<ObjectReference>, ImageError> {
        image::restore_image(&mut self.heap(), path)
    }

    /* Diagnostics */

    pub fn stats(&self) -> MemoryStats {
        let heap = self.heap();
        let mut stats = MemoryStats {
            committed_bytes: heap.storage.committed_bytes(),
            collections: heap.trigger.collections(),
            ..Default::default()
        };
        for (kind, set) in heap.sets.iter() {
            stats.sets[kind] = set.census(&heap.storage);
        }
        stats
    }

    /// Write every segment to `path` in the raw dump format.
    pub fn dump_memory(&self, path: &Path) -> io::Result<()> {
        crate::util::dump::write_memory_dump(&self.heap().storage, path)
    }
}

/// The header of `object` if it plausibly names an object of this memory: mapped, aligned,
/// a known type, and a size that fits its segment. Cheap; does not walk the segment.
fn checked(heap: &Heap, object: ObjectReference) -> Result<ObjectHeader, MemoryError> {
    let addr = object.to_raw_address();
    let invalid = MemoryError::InvalidReference(object);
    let Some(segment) = heap.storage.segment_of(addr) else {
        return Err(invalid);
    };
    let remaining = segment.end() - addr;
    if !addr.is_aligned_to(BYTES_IN_GRAIN) || remaining < HEADER_BYTES {
        return Err(invalid);
    }
    let header = segment.read_header(addr);
    if header.is_dead_object()
        || !is_valid_object_size(header.size())
        || header.size() > remaining
        || !heap.types.is_known(header.type_code())
    {
        return Err(invalid);
    }
    Ok(header)
}

fn expect_type(heap: &Heap, object: ObjectReference, expected: TypeCode) -> Result<ObjectHeader, MemoryError> {
    let header = checked(heap, object)?;
    if header.type_code() != expected {
        return Err(MemoryError::WrongType {
            object,
            expected,
            found: header.type_code(),
        });
    }
    Ok(header)
}

fn body_index(heap: &Heap, object: ObjectReference, index: usize) -> Result<(), MemoryError> {
    let len = checked(heap, object)?.body_words();
    if index >= len {
        return Err(MemoryError::IndexOutOfBounds { object, index, len });
    }
    Ok(())
}

fn array_index(heap: &Heap, array: ObjectReference, index: usize) -> Result<(), MemoryError> {
    expect_type(heap, array, TypeCode::ARRAY)?;
    let len = heap.storage.body_word(array, 0);
    if index >= len {
        return Err(MemoryError::IndexOutOfBounds {
            object: array,
            index,
            len,
        });
    }
    Ok(())
}

/// Body bytes for `fixed` words followed by `count` entries of `per_entry` words each. A
/// body too large to express in bytes can never be allocated.
fn body_bytes(fixed: usize, count: usize, per_entry: usize) -> Result<usize, AllocationError> {
    count
        .checked_mul(per_entry)
        .and_then(|words| words.checked_add(fixed))
        .and_then(checked_words_to_bytes)
        .ok_or(AllocationError::HeapOutOfMemory { requested: usize::MAX })
}

fn alloc_array(heap: &mut Heap, len: usize) -> Result<ObjectReference, MemoryError> {
    let array = heap.new_object(TypeCode::ARRAY, body_bytes(1, len, 1)?)?;
    heap.storage.set_body_word(array, 0, len);
    Ok(array)
}

fn alloc_bytes(heap: &mut Heap, bytes: &[u8]) -> Result<ObjectReference, MemoryError> {
    let words = bytes.len().div_ceil(BYTES_IN_WORD);
    let object = heap.new_object(TypeCode::BYTES, body_bytes(1, words, 1)?)?;
    heap.storage.set_body_word(object, 0, bytes.len());
    if words > 0 {
        let mut packed = vec![0usize; words];
        bytemuck::cast_slice_mut::<usize, u8>(&mut packed)[..bytes.len()].copy_from_slice(bytes);
        heap.storage
            .words_mut(object.body_word(1), words)
            .copy_from_slice(&packed);
    }
    Ok(object)
}

/// Build `[receiver, message, [arguments...]]`. Each new object is added to `held`.
fn build_message(
    heap: &mut Heap,
    held: &mut Vec<ObjectReference>,
    receiver: ObjectReference,
    message: &str,
    arguments: &[ObjectReference],
) -> Result<ObjectReference, MemoryError> {
    let args = alloc_array(heap, arguments.len())?;
    heap.save_table.hold(args);
    held.push(args);
    for (i, argument) in arguments.iter().enumerate() {
        heap.write_reference(args, 1 + i, Some(*argument));
    }
    let name = alloc_bytes(heap, message.as_bytes())?;
    heap.save_table.hold(name);
    held.push(name);
    let send = alloc_array(heap, 3)?;
    heap.write_reference(send, 1, Some(receiver));
    heap.write_reference(send, 2, Some(name));
    heap.write_reference(send, 3, Some(args));
    Ok(send)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test_util::fixtures::{memory, PAIR};
    use crate::vm::NullActivity;

    #[test]
    fn arrays_are_bounds_checked() {
        let memory = memory();
        let array = memory.new_array(2).unwrap();
        assert_eq!(memory.array_len(array).unwrap(), 2);
        assert_eq!(memory.array_get(array, 1).unwrap(), None);
        memory.array_set(array, 0, Some(array)).unwrap();
        assert_eq!(memory.array_get(array, 0).unwrap(), Some(array));
        assert!(matches!(
            memory.array_get(array, 2),
            Err(MemoryError::IndexOutOfBounds { index: 2, len: 2, .. })
        ));
    }

    #[test]
    fn bytes_keep_their_length() {
        let memory = memory();
        for text in ["", "a", "exactly8", "a little longer than one word"] {
            let object = memory.new_bytes(text.as_bytes()).unwrap();
            assert_eq!(memory.bytes(object).unwrap(), text.as_bytes());
        }
    }

    #[test]
    fn wrong_type_is_reported() {
        let memory = memory();
        let bytes = memory.new_bytes(b"abc").unwrap();
        assert!(matches!(
            memory.array_len(bytes),
            Err(MemoryError::WrongType {
                expected: TypeCode::ARRAY,
                found: TypeCode::BYTES,
                ..
            })
        ));
    }

    #[test]
    fn references_outside_the_heap_are_rejected() {
        let memory = memory();
        let stray = ObjectReference::from_word(HEADER_BYTES * 1024).unwrap();
        assert_eq!(memory.type_of(stray), Err(MemoryError::InvalidReference(stray)));
        assert!(!memory.is_valid_object(stray));
    }

    #[test]
    fn identity_table_put_and_get() {
        let memory = memory();
        let table = memory.new_identity_table(2).unwrap();
        let a = memory.new_object(PAIR, 2 * BYTES_IN_WORD).unwrap();
        let b = memory.new_object(PAIR, 2 * BYTES_IN_WORD).unwrap();
        let c = memory.new_object(PAIR, 2 * BYTES_IN_WORD).unwrap();
        memory.table_put(table, a, Some(b)).unwrap();
        memory.table_put(table, b, Some(a)).unwrap();
        memory.table_put(table, a, Some(c)).unwrap();
        assert_eq!(memory.table_len(table).unwrap(), 2);
        assert_eq!(memory.table_get(table, a).unwrap(), Some(c));
        assert_eq!(memory.table_get(table, c).unwrap(), None);
        assert_eq!(memory.table_put(table, c, None), Err(MemoryError::TableFull(table)));
    }

    #[test]
    fn behaviours_must_be_behaviour_objects() {
        let memory = memory();
        let object = memory.new_object(PAIR, 2 * BYTES_IN_WORD).unwrap();
        let behaviour = memory.new_behaviour(PAIR, 0).unwrap();
        memory.set_behaviour(object, Some(behaviour)).unwrap();
        assert_eq!(memory.behaviour(object).unwrap(), Some(behaviour));
        assert!(memory.set_behaviour(object, Some(object)).is_err());
        memory.set_behaviour(object, None).unwrap();
        assert_eq!(memory.behaviour(object).unwrap(), None);
    }

    #[test]
    fn old_space_stores_are_remembered() {
        let memory = memory();
        let old = memory.old_object(TypeCode::ARRAY, 2 * BYTES_IN_WORD).unwrap();
        memory.set_word(old, 0, 1).unwrap();
        let young = memory.new_array(0).unwrap();
        memory.array_set(old, 0, Some(young)).unwrap();
        assert!(memory.heap().old2new.has_index(young));
        memory.array_set(old, 0, None).unwrap();
        assert!(!memory.heap().old2new.has_index(young));
    }

    #[test]
    fn message_envelopes_hold_three_slots() {
        let memory = memory();
        memory.init_save_stack();
        let receiver = memory.new_array(0).unwrap();
        let argument = memory.new_bytes(b"arg").unwrap();
        let envelope = memory
            .pack_message(&NullActivity, receiver, "value:", &[argument])
            .unwrap();
        assert!(memory.heap().save_table.held().is_empty());

        let send = memory.unpack(&NullActivity, &envelope).unwrap();
        assert_eq!(memory.array_len(send).unwrap(), 3);
        let name = memory.array_get(send, 1).unwrap().unwrap();
        assert_eq!(memory.bytes(name).unwrap(), b"value:");
        let args = memory.array_get(send, 2).unwrap().unwrap();
        let copied = memory.array_get(args, 0).unwrap().unwrap();
        assert_ne!(copied, argument);
        assert_eq!(memory.bytes(copied).unwrap(), b"arg");
    }

    #[test]
    fn stats_count_objects() {
        let memory = memory();
        let before = memory.stats();
        memory.new_array(4).unwrap();
        memory.old_object(TypeCode::BYTES, BYTES_IN_WORD).unwrap();
        let after = memory.stats();
        assert_eq!(after.live_objects(), before.live_objects() + 2);
        assert!(after.sets[SegmentKind::Old].segments >= 1);
        assert!(after.committed_bytes > 0);
    }
}
