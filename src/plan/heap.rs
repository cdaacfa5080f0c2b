use std::sync::Arc;

use enum_map::{enum_map, EnumMap};

use crate::envelope::ProxyRegistry;
use crate::plan::live_stack::LiveStack;
use crate::plan::save_stack::{SaveStack, SaveTable};
use crate::policy::{Block, SegmentSet};
use crate::util::bucket::GrowableBucket;
use crate::util::constants::{BYTES_IN_GRAIN, BYTES_IN_WORD, HEADER_BYTES};
use crate::util::conversions::object_size_for_body;
use crate::util::error::{AllocationError, MemoryError};
use crate::util::header::{MarkValue, ObjectHeader};
use crate::util::heap::{CollectionTrigger, SegmentKind, SegmentMap};
use crate::util::options::Options;
use crate::util::ObjectReference;
use crate::vm::{TypeCode, TypeTable};

/// The collector-owned state of one object memory.
///
/// Everything in here is mutated only while the memory's heap lock is held, which makes
/// allocation and collection mutually exclusive.
pub struct Heap {
    pub(crate) storage: SegmentMap,
    pub(crate) sets: EnumMap<SegmentKind, SegmentSet>,
    pub(crate) types: Arc<TypeTable>,
    pub(crate) options: Arc<Options>,
    /// The mark value of live objects. New objects are born with it.
    pub(crate) mark: MarkValue,
    pub(crate) live_stack: LiveStack<ObjectReference>,
    /// Absent during bootstrap, before the runtime is ready to anchor objects.
    pub(crate) save_stack: Option<SaveStack>,
    pub(crate) save_table: SaveTable,
    pub(crate) roots: Vec<ObjectReference>,
    /// New-space objects referenced from old space, with the number of such references.
    pub(crate) old2new: GrowableBucket<usize>,
    /// Objects that want a callback once they become unreachable.
    pub(crate) uninit_table: GrowableBucket<usize>,
    /// Unreachable objects whose callback has not been run yet.
    pub(crate) pending_uninits: Vec<ObjectReference>,
    pub(crate) proxies: ProxyRegistry,
    pub(crate) trigger: CollectionTrigger,
}

impl Heap {
    pub fn new(options: Arc<Options>, types: Arc<TypeTable>) -> Self {
        let sets = enum_map! {
            SegmentKind::Normal => SegmentSet::new(SegmentKind::Normal, options.segment_size),
            SegmentKind::Large => SegmentSet::new(SegmentKind::Large, options.large_segment_size),
            SegmentKind::Old => SegmentSet::new(SegmentKind::Old, options.segment_size),
        };
        Heap {
            storage: SegmentMap::new(options.max_heap_size),
            sets,
            types,
            mark: MarkValue::FIRST,
            live_stack: LiveStack::new(options.live_stack_size),
            save_stack: None,
            save_table: SaveTable::new(),
            roots: vec![],
            old2new: GrowableBucket::new(),
            uninit_table: GrowableBucket::new(),
            pending_uninits: vec![],
            proxies: ProxyRegistry::new(),
            trigger: CollectionTrigger::new(options.collection_threshold),
            options,
        }
    }

    /// End of bootstrap: from now on every new object is pushed on the save stack.
    pub fn init_save_stack(&mut self) {
        if self.save_stack.is_none() {
            self.save_stack = Some(SaveStack::new(self.options.save_stack_size));
        }
    }

    /// The set an object of `size` bytes is allocated in.
    pub fn set_for_size(&self, size: usize) -> SegmentKind {
        if size >= self.options.large_object_threshold {
            SegmentKind::Large
        } else {
            SegmentKind::Normal
        }
    }

    fn sibling(kind: SegmentKind) -> Option<SegmentKind> {
        match kind {
            SegmentKind::Normal => Some(SegmentKind::Large),
            SegmentKind::Large => Some(SegmentKind::Normal),
            SegmentKind::Old => None,
        }
    }

    /// Get a block of `size` bytes from the set `kind`, recovering from an empty free chain
    /// if needed.
    pub fn allocate_block(&mut self, kind: SegmentKind, size: usize) -> Result<Block, AllocationError> {
        if let Some(block) = self.sets[kind].allocate(&mut self.storage, size) {
            return Ok(block);
        }
        self.handle_allocation_failure(kind, size)
    }

    fn handle_allocation_failure(&mut self, kind: SegmentKind, size: usize) -> Result<Block, AllocationError> {
        let collectable = kind != SegmentKind::Old;
        let mut collected = false;
        if collectable && self.trigger.is_gc_required() {
            self.collect();
            collected = true;
            if let Some(block) = self.sets[kind].allocate(&mut self.storage, size) {
                return Ok(block);
            }
        }
        loop {
            if let Some(block) = self.allocate_from_sibling(kind, size) {
                return Ok(block);
            }
            if self.sets[kind].add_segment(&mut self.storage, size) {
                if let Some(block) = self.sets[kind].allocate(&mut self.storage, size) {
                    return Ok(block);
                }
            }
            if !collectable || collected {
                break;
            }
            self.collect();
            collected = true;
            if let Some(block) = self.sets[kind].allocate(&mut self.storage, size) {
                return Ok(block);
            }
        }
        warn!("Out of object memory allocating {} bytes in the {} set", size, kind.name());
        Err(AllocationError::HeapOutOfMemory { requested: size })
    }

    /// Prefer memory that is already mapped: a whole empty segment of the sibling set,
    /// then a large enough dead block in it.
    fn allocate_from_sibling(&mut self, kind: SegmentKind, size: usize) -> Option<Block> {
        let sibling = Self::sibling(kind)?;
        if let Some(start) = self.sets[sibling].donate_segment(&self.storage, size) {
            self.sets[kind].adopt_segment(&mut self.storage, start);
            if let Some(block) = self.sets[kind].allocate(&mut self.storage, size) {
                return Some(block);
            }
        }
        self.sets[sibling].donate_object(&mut self.storage, size)
    }

    /// Return a block to the free chains of the set owning its segment.
    pub(crate) fn free_block(&mut self, block: Block) {
        if let Some(kind) = self.storage.segment_of(block.start).map(|s| s.kind()) {
            self.sets[kind].free_block(&mut self.storage, block);
        }
    }

    /// Push a new object on the save stack, once there is one.
    pub(crate) fn protect(&mut self, object: ObjectReference) {
        if let Some(save_stack) = self.save_stack.as_mut() {
            save_stack.push(object);
        }
    }

    /// Write a fresh header over a block and zero its body.
    fn init_object(&mut self, block: Block, type_code: TypeCode, has_references: bool) -> ObjectReference {
        self.storage.zero_bytes(block.start, block.size);
        let mut header = ObjectHeader::init_header(block.size, self.mark, type_code);
        if !has_references {
            header.set_has_no_references();
        }
        self.storage.write_header_at(block.start, &header);
        match ObjectReference::from_raw_address(block.start) {
            Some(object) => object,
            None => unreachable!("block at address zero"),
        }
    }

    fn type_has_references(&self, type_code: TypeCode) -> Result<bool, MemoryError> {
        self.types
            .get(type_code)
            .map(|t| t.has_references())
            .ok_or(MemoryError::UnknownType(type_code))
    }

    /// Allocate a collectable object with room for `body_bytes` bytes after the header. The
    /// body is zeroed, so every reference slot starts out null. The object is protected by
    /// the save stack until the next collection.
    pub fn new_object(&mut self, type_code: TypeCode, body_bytes: usize) -> Result<ObjectReference, MemoryError> {
        let has_references = self.type_has_references(type_code)?;
        let size = object_size_for_body(body_bytes).ok_or(AllocationError::HeapOutOfMemory {
            requested: body_bytes,
        })?;
        let block = self.allocate_block(self.set_for_size(size), size)?;
        let object = self.init_object(block, type_code, has_references);
        self.trigger.on_allocation(block.size);
        self.protect(object);
        Ok(object)
    }

    /// Allocate a permanent object. It is never swept and needs no protection.
    pub fn old_object(&mut self, type_code: TypeCode, body_bytes: usize) -> Result<ObjectReference, MemoryError> {
        let has_references = self.type_has_references(type_code)?;
        let size = object_size_for_body(body_bytes).ok_or(AllocationError::HeapOutOfMemory {
            requested: body_bytes,
        })?;
        let block = self.allocate_block(SegmentKind::Old, size)?;
        let object = self.init_object(block, type_code, has_references);
        self.storage.update_header(object, |h| h.set_old_space());
        Ok(object)
    }

    /// A new object with the same type and contents as `original`.
    pub fn clone_object(&mut self, original: ObjectReference) -> Result<ObjectReference, MemoryError> {
        let header = self.storage.header(original);
        let size = header.size();
        // The original must survive a collection triggered by this allocation.
        self.roots.push(original);
        let block = self.allocate_block(self.set_for_size(size), size);
        self.roots.pop();
        let block = block?;
        self.storage.zero_bytes(block.start, block.size);
        let body = header.body_words() * BYTES_IN_WORD;
        self.storage
            .copy_bytes(original.body_word(0), block.start + HEADER_BYTES, body);
        self.storage
            .write_header_at(block.start, &header.for_clone(block.size, self.mark));
        let Some(clone) = ObjectReference::from_raw_address(block.start) else {
            unreachable!("block at address zero");
        };
        self.trigger.on_allocation(block.size);
        self.protect(clone);
        Ok(clone)
    }

    /// Is `object` a live object of this memory? Walks the containing segment.
    pub fn is_valid_object(&self, object: ObjectReference) -> bool {
        let addr = object.to_raw_address();
        match self.storage.segment_of(addr) {
            Some(segment) => {
                addr.is_aligned_to(BYTES_IN_GRAIN)
                    && segment.is_object_start(addr)
                    && !segment.read_header(addr).is_dead_object()
            }
            None => false,
        }
    }

    /// Store `value` into the reference slot at body word `index` of `object`, keeping the
    /// old-to-new remembered set up to date.
    pub fn write_reference(&mut self, object: ObjectReference, index: usize, value: Option<ObjectReference>) {
        let slot = object.body_word(index);
        if self.storage.header(object).is_old_space() {
            let previous = self.storage.load_reference(slot);
            self.forget_old_reference(previous);
            self.remember_old_reference(value);
        }
        self.storage.store_reference(slot, value);
    }

    /// Record that an old-space object now refers to `target`.
    pub(crate) fn remember_old_reference(&mut self, target: Option<ObjectReference>) {
        if let Some(target) = target {
            if !self.storage.header(target).is_old_space() {
                self.old2new.increment(target);
            }
        }
    }

    /// Record that an old-space object no longer refers to `target`.
    pub(crate) fn forget_old_reference(&mut self, target: Option<ObjectReference>) {
        if let Some(target) = target {
            self.old2new.decrement(target);
        }
    }

    pub fn add_root(&mut self, object: ObjectReference) {
        self.roots.push(object);
    }

    /// Remove one registration of `object` as a root.
    pub fn remove_root(&mut self, object: ObjectReference) -> bool {
        match self.roots.iter().rposition(|r| *r == object) {
            Some(index) => {
                self.roots.remove(index);
                true
            }
            None => false,
        }
    }
}
