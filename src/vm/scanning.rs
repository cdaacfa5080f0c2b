use crate::util::heap::SegmentMap;
use crate::util::{Address, ObjectReference};

/// A word of object storage that holds a (nullable) object reference.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Slot(Address);

impl Slot {
    pub fn from_address(addr: Address) -> Self {
        Slot(addr)
    }

    /// Body word `index` of `object`.
    pub fn of_body(object: ObjectReference, index: usize) -> Self {
        Slot(object.body_word(index))
    }

    pub fn address(self) -> Address {
        self.0
    }

    pub fn load(self, storage: &SegmentMap) -> Option<ObjectReference> {
        storage.load_reference(self.0)
    }

    pub fn store(self, storage: &mut SegmentMap, value: Option<ObjectReference>) {
        storage.store_reference(self.0, value)
    }

    /// The raw word. Inside a flat buffer this is an offset, not a reference.
    pub fn load_word(self, storage: &SegmentMap) -> usize {
        storage.load_word(self.0)
    }

    pub fn store_word(self, storage: &mut SegmentMap, value: usize) {
        storage.store_word(self.0, value)
    }
}

/// Callback trait of scanning functions that report slots.
pub trait SlotVisitor {
    /// Call this function for each reference slot.
    fn visit_slot(&mut self, slot: Slot);
}

/// This lets us use closures as SlotVisitor.
impl<F: FnMut(Slot)> SlotVisitor for F {
    fn visit_slot(&mut self, slot: Slot) {
        self(slot)
    }
}

/// How the flattener treats objects of a type.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FlattenPolicy {
    /// Copy the object and its transitive closure into the envelope.
    Copy,
    /// The object cannot cross an envelope boundary. It must be registered as a proxy, and
    /// the envelope carries the proxy tag in its place.
    Proxy,
}

/// The capability every heap type implements. The memory manager has no compile-time
/// knowledge of object layouts; it asks the type of an object, through the type table, to
/// enumerate the object's reference slots. One enumeration serves every traversal: normal
/// marking, orphan checking, image save and restore, flattening and unflattening.
///
/// Scanning must only depend on the object's header and on non-reference words of its body
/// (such as a length). During relocation the reference slots hold buffer offsets rather than
/// references.
pub trait Traceable: Send + Sync + 'static {
    /// A name for diagnostics.
    fn name(&self) -> &'static str;

    /// Can objects of this type hold references? Objects of types returning false get the
    /// `NoReferences` header flag and are never pushed on the live stack.
    fn has_references(&self) -> bool {
        true
    }

    /// Report every reference slot of `object` to `visitor`. The behaviour slot of the header
    /// is not included: the memory manager handles it.
    fn scan_object(&self, storage: &SegmentMap, object: ObjectReference, visitor: &mut dyn SlotVisitor);

    /// Do the length words of `object` fit inside its body? Objects read from a flat
    /// buffer are checked with this before they are scanned.
    fn layout_is_valid(&self, _storage: &SegmentMap, _object: ObjectReference) -> bool {
        true
    }

    fn flatten_policy(&self) -> FlattenPolicy {
        FlattenPolicy::Copy
    }

    /// Does this type cache identity hashes (directly or in its layout) that are invalid once
    /// objects are moved to a new address space?
    fn needs_rehash(&self) -> bool {
        false
    }

    /// Rebuild identity-hash dependent state after unflattening. Called once per object,
    /// after every object of the envelope has been reconstructed.
    fn rehash(&self, _storage: &mut SegmentMap, _object: ObjectReference) {}
}
