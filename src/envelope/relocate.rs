//! Unpacking: the two passes over a buffer that has been copied into the heap.

use crate::plan::heap::Heap;
use crate::util::error::TraversalError;
use crate::util::header::MarkValue;
use crate::util::{Address, ObjectReference};
use crate::vm::{Slot, TypeCode};

/// Pass one: every offset becomes a reference into the placed copy.
///
/// The buffer was validated as a whole, but its contents are still untrusted: each object's
/// layout is checked before its slots are enumerated, and each offset must name the start of
/// an object of the buffer.
pub struct Relocator {
    base: Address,
    /// Offsets of the objects of the buffer, ascending.
    starts: Vec<usize>,
    mark: MarkValue,
    old_space: bool,
}

impl Relocator {
    pub fn new(base: Address, starts: Vec<usize>, mark: MarkValue, old_space: bool) -> Self {
        Relocator {
            base,
            starts,
            mark,
            old_space,
        }
    }

    fn offset_of(&self, addr: Address) -> usize {
        addr - self.base
    }

    /// Prepare `object` for scanning: check its layout and give it its collector state.
    pub fn enter(&mut self, heap: &mut Heap, object: ObjectReference) -> Result<(), TraversalError> {
        let offset = self.offset_of(object.to_raw_address());
        let mut header = heap.storage.header(object);
        let Some(ty) = heap.types.get(header.type_code()) else {
            return Err(TraversalError::Malformed {
                offset,
                reason: "unknown type code",
            });
        };
        if !ty.layout_is_valid(&heap.storage, object) {
            return Err(TraversalError::Malformed {
                offset,
                reason: "object layout does not fit its size",
            });
        }
        if header.is_proxy() && header.type_code() != TypeCode::PROXY {
            return Err(TraversalError::Malformed {
                offset,
                reason: "proxy flag on a non-proxy object",
            });
        }
        // The header flags must agree with the type, or slots would be skipped.
        if ty.has_references() {
            header.set_has_references();
        } else {
            header.set_has_no_references();
        }
        header.clear_old_space();
        header.set_uninit_pending(false);
        header.set_has_uninit(false);
        if header.is_non_primitive() && header.behaviour().is_none() {
            return Err(TraversalError::Malformed {
                offset,
                reason: "non-primitive object without a behaviour",
            });
        }
        header.set_object_mark(self.mark);
        if self.old_space {
            header.set_old_space();
        }
        heap.storage.set_header(object, &header);
        Ok(())
    }

    pub fn visit(&mut self, heap: &mut Heap, slot: Slot) -> Result<(), TraversalError> {
        let offset = slot.load_word(&heap.storage);
        if offset == 0 {
            return Ok(());
        }
        if self.starts.binary_search(&offset).is_err() {
            return Err(TraversalError::Malformed {
                offset: self.offset_of(slot.address()),
                reason: "reference to no object of the buffer",
            });
        }
        slot.store_word(&mut heap.storage, (self.base + offset).as_usize());
        Ok(())
    }
}

/// Pass two: proxies are bound to the objects they stand for, and objects whose layout
/// depends on identity hashes are queued for rehashing.
#[derive(Default)]
pub struct Unflattener {
    rehash: Vec<ObjectReference>,
}

impl Unflattener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&mut self, heap: &mut Heap, object: ObjectReference) {
        let type_code = heap.storage.header(object).type_code();
        if heap.types.get(type_code).is_some_and(|ty| ty.needs_rehash()) {
            self.rehash.push(object);
        }
    }

    /// The object a reference to `target` should point at: the bound object if `target` is
    /// a proxy, `target` itself otherwise.
    pub fn resolve(&self, heap: &Heap, target: ObjectReference) -> Result<ObjectReference, TraversalError> {
        let header = heap.storage.header(target);
        if !header.is_proxy() {
            return Ok(target);
        }
        let tag = heap.storage.body_word(target, 0);
        heap.proxies
            .resolve(tag)
            .ok_or(TraversalError::UnresolvedProxy { tag })
    }

    pub fn visit(&mut self, heap: &mut Heap, slot: Slot) -> Result<(), TraversalError> {
        if let Some(target) = slot.load(&heap.storage) {
            let resolved = self.resolve(heap, target)?;
            if resolved != target {
                slot.store(&mut heap.storage, Some(resolved));
            }
        }
        Ok(())
    }

    /// Rehash every queued object, once each.
    pub fn rehash_all(self, heap: &mut Heap) {
        for object in self.rehash {
            let type_code = heap.storage.header(object).type_code();
            if let Some(ty) = heap.types.get(type_code).cloned() {
                ty.rehash(&mut heap.storage, object);
            }
        }
    }
}
