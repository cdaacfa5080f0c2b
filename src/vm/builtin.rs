//! Types the memory manager itself relies on.
//!
//! | code | type | body layout |
//! |------|------|-------------|
//! | 0 | placeholder | empty |
//! | 1 | behaviour | base type code, slot count `n`, `n` references |
//! | 2 | array | length `n`, `n` references |
//! | 3 | bytes | byte length, packed bytes |
//! | 4 | proxy | proxy tag |
//! | 5 | identity table | count, capacity `c`, `c` (key, value) reference pairs |
//!
//! Blocks handed out by the allocator may be slightly larger than requested, so every
//! variable-sized layout records its logical length in the first body word.

use std::sync::Arc;

use crate::util::constants::{BYTES_IN_WORD, LOG_BYTES_IN_GRAIN};
use crate::util::heap::SegmentMap;
use crate::util::ObjectReference;
use crate::vm::{FlattenPolicy, Slot, SlotVisitor, Traceable, TypeCode};

lazy_static! {
    // Shared by the type tables of every memory in the process.
    static ref BUILTIN_TYPES: Vec<(TypeCode, Arc<dyn Traceable>)> = vec![
        (TypeCode::PLACEHOLDER, Arc::new(PlaceholderType) as Arc<dyn Traceable>),
        (TypeCode::BEHAVIOUR, Arc::new(BehaviourType) as Arc<dyn Traceable>),
        (TypeCode::ARRAY, Arc::new(ArrayType) as Arc<dyn Traceable>),
        (TypeCode::BYTES, Arc::new(BytesType) as Arc<dyn Traceable>),
        (TypeCode::PROXY, Arc::new(ProxyType) as Arc<dyn Traceable>),
        (TypeCode::IDENTITY_TABLE, Arc::new(IdentityTableType) as Arc<dyn Traceable>),
    ];
}

pub(crate) fn builtin_types() -> Vec<(TypeCode, Arc<dyn Traceable>)> {
    BUILTIN_TYPES.clone()
}

fn body_words(storage: &SegmentMap, object: ObjectReference) -> usize {
    storage.header(object).body_words()
}

/// Does a body of `fixed` words followed by `count` items of `width` words fit in `object`?
fn fits(storage: &SegmentMap, object: ObjectReference, fixed: usize, count: usize, width: usize) -> bool {
    let body = body_words(storage, object);
    body >= fixed
        && count
            .checked_mul(width)
            .and_then(|n| n.checked_add(fixed))
            .is_some_and(|n| n <= body)
}

pub struct PlaceholderType;

impl Traceable for PlaceholderType {
    fn name(&self) -> &'static str {
        "Placeholder"
    }

    fn has_references(&self) -> bool {
        false
    }

    fn scan_object(&self, _: &SegmentMap, _: ObjectReference, _: &mut dyn SlotVisitor) {}
}

/// Words of a behaviour body before its reference slots.
pub const BEHAVIOUR_FIXED_WORDS: usize = 2;

pub struct BehaviourType;

impl Traceable for BehaviourType {
    fn name(&self) -> &'static str {
        "Behaviour"
    }

    fn scan_object(&self, storage: &SegmentMap, object: ObjectReference, visitor: &mut dyn SlotVisitor) {
        let slots = storage.body_word(object, 1);
        for i in 0..slots {
            visitor.visit_slot(Slot::of_body(object, BEHAVIOUR_FIXED_WORDS + i));
        }
    }

    fn layout_is_valid(&self, storage: &SegmentMap, object: ObjectReference) -> bool {
        body_words(storage, object) >= BEHAVIOUR_FIXED_WORDS
            && fits(storage, object, BEHAVIOUR_FIXED_WORDS, storage.body_word(object, 1), 1)
    }
}

pub struct ArrayType;

impl Traceable for ArrayType {
    fn name(&self) -> &'static str {
        "Array"
    }

    fn scan_object(&self, storage: &SegmentMap, object: ObjectReference, visitor: &mut dyn SlotVisitor) {
        let len = storage.body_word(object, 0);
        for i in 0..len {
            visitor.visit_slot(Slot::of_body(object, 1 + i));
        }
    }

    fn layout_is_valid(&self, storage: &SegmentMap, object: ObjectReference) -> bool {
        body_words(storage, object) >= 1 && fits(storage, object, 1, storage.body_word(object, 0), 1)
    }
}

pub struct BytesType;

impl Traceable for BytesType {
    fn name(&self) -> &'static str {
        "Bytes"
    }

    fn has_references(&self) -> bool {
        false
    }

    fn scan_object(&self, _: &SegmentMap, _: ObjectReference, _: &mut dyn SlotVisitor) {}

    fn layout_is_valid(&self, storage: &SegmentMap, object: ObjectReference) -> bool {
        if body_words(storage, object) < 1 {
            return false;
        }
        let bytes = storage.body_word(object, 0);
        fits(storage, object, 1, bytes.div_ceil(BYTES_IN_WORD), 1)
    }
}

pub struct ProxyType;

impl Traceable for ProxyType {
    fn name(&self) -> &'static str {
        "Proxy"
    }

    fn has_references(&self) -> bool {
        false
    }

    fn scan_object(&self, _: &SegmentMap, _: ObjectReference, _: &mut dyn SlotVisitor) {}

    fn layout_is_valid(&self, storage: &SegmentMap, object: ObjectReference) -> bool {
        body_words(storage, object) >= 1
    }
}

/// Words of an identity table body before its pairs.
pub const TABLE_FIXED_WORDS: usize = 2;

pub struct IdentityTableType;

impl Traceable for IdentityTableType {
    fn name(&self) -> &'static str {
        "IdentityTable"
    }

    fn scan_object(&self, storage: &SegmentMap, object: ObjectReference, visitor: &mut dyn SlotVisitor) {
        let capacity = storage.body_word(object, 1);
        for i in 0..capacity * 2 {
            visitor.visit_slot(Slot::of_body(object, TABLE_FIXED_WORDS + i));
        }
    }

    fn layout_is_valid(&self, storage: &SegmentMap, object: ObjectReference) -> bool {
        if body_words(storage, object) < TABLE_FIXED_WORDS {
            return false;
        }
        let count = storage.body_word(object, 0);
        let capacity = storage.body_word(object, 1);
        count <= capacity && fits(storage, object, TABLE_FIXED_WORDS, capacity, 2)
    }

    fn needs_rehash(&self) -> bool {
        true
    }

    fn rehash(&self, storage: &mut SegmentMap, object: ObjectReference) {
        let capacity = storage.body_word(object, 1);
        let pairs: Vec<(ObjectReference, usize)> = (0..capacity)
            .filter_map(|i| {
                let key = table_key_slot(object, i).load(storage)?;
                Some((key, table_value_slot(object, i).load_word(storage)))
            })
            .collect();
        for i in 0..capacity * 2 {
            storage.set_body_word(object, TABLE_FIXED_WORDS + i, 0);
        }
        for (key, value) in pairs {
            if let TableProbe::Vacant(i) = table_probe(storage, object, key) {
                table_key_slot(object, i).store(storage, Some(key));
                table_value_slot(object, i).store_word(storage, value);
            }
        }
    }
}

/// Result of looking for a key in an identity table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TableProbe {
    /// The key is stored in this pair.
    Found(usize),
    /// The key is absent; this is the pair it would go into.
    Vacant(usize),
    /// The key is absent and every pair is taken.
    Full,
}

fn table_hash(key: ObjectReference, capacity: usize) -> usize {
    (key.value() >> LOG_BYTES_IN_GRAIN) % capacity
}

/// Linear probe for `key`, starting at its identity hash.
pub fn table_probe(storage: &SegmentMap, table: ObjectReference, key: ObjectReference) -> TableProbe {
    let capacity = storage.body_word(table, 1);
    if capacity == 0 {
        return TableProbe::Full;
    }
    let start = table_hash(key, capacity);
    for step in 0..capacity {
        let i = (start + step) % capacity;
        match table_key_slot(table, i).load(storage) {
            Some(k) if k == key => return TableProbe::Found(i),
            Some(_) => {}
            None => return TableProbe::Vacant(i),
        }
    }
    TableProbe::Full
}

pub fn table_key_slot(table: ObjectReference, pair: usize) -> Slot {
    Slot::of_body(table, TABLE_FIXED_WORDS + 2 * pair)
}

pub fn table_value_slot(table: ObjectReference, pair: usize) -> Slot {
    Slot::of_body(table, TABLE_FIXED_WORDS + 2 * pair + 1)
}

/// The proxy policy is per object for registered proxies; a type can also demand it.
pub fn requires_proxy(ty: &dyn Traceable) -> bool {
    ty.flatten_policy() == FlattenPolicy::Proxy
}
