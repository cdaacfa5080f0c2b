//! The object header.
//!
//! Every object in a segment (live or dead) starts with a header of [`HEADER_WORDS`] words:
//!
//! | word | content |
//! |------|---------|
//! | 0    | object size in bytes, a multiple of the grain |
//! | 1    | mark bits, flag bits and the type code |
//! | 2    | behaviour: the non-primitive behaviour object, or 0 |
//!
//! [`ObjectHeader`] is the decoded form. It is read and written as a whole by the segment
//! map; ordinary object code never touches the encoded words.

use crate::util::constants::*;
use crate::util::conversions::is_valid_object_size;
use crate::util::ObjectReference;
use crate::vm::TypeCode;

const MARK_MASK: usize = 0b11;
const OLD_SPACE_BIT: usize = 1 << 2;
const NO_REFERENCES_BIT: usize = 1 << 3;
const NON_PRIMITIVE_BIT: usize = 1 << 4;
const PROXY_BIT: usize = 1 << 5;
const UNINIT_PENDING_BIT: usize = 1 << 6;
const HAS_UNINIT_BIT: usize = 1 << 7;
const DEAD_OBJECT_BIT: usize = 1 << 8;
const TYPE_CODE_SHIFT: usize = 16;
const TYPE_CODE_MASK: usize = 0xffff;

/// The two-bit mark value. The collector flips between [`MarkValue::FIRST`] and its
/// successor every collection, so an object is live for this cycle iff its mark equals the
/// collector's current value. No clearing pass is needed between cycles.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MarkValue(u8);

impl MarkValue {
    /// Never marked.
    pub const CLEAR: MarkValue = MarkValue(0);
    /// The mark value of the first collection cycle.
    pub const FIRST: MarkValue = MarkValue(1);

    pub const fn new(bits: u8) -> MarkValue {
        MarkValue(bits & MARK_MASK as u8)
    }

    /// The other of the two live mark values.
    pub const fn flip(self) -> MarkValue {
        match self.0 {
            1 => MarkValue(2),
            _ => MarkValue(1),
        }
    }

    pub const fn bits(self) -> u8 {
        self.0
    }
}

/// Which region an object belongs to, as far as the collector is concerned.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SpaceKind {
    /// Ordinary collectable object (normal or large segment set).
    New,
    /// Permanent object: never swept, never traced through by the mark phase.
    Old,
}

/// Decoded object header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ObjectHeader {
    size: usize,
    mark: MarkValue,
    space: SpaceKind,
    has_references: bool,
    non_primitive: bool,
    proxy: bool,
    uninit_pending: bool,
    has_uninit: bool,
    dead: bool,
    type_code: TypeCode,
    behaviour: Option<ObjectReference>,
}

impl ObjectHeader {
    /// A fresh header for a newly allocated object.
    pub fn init_header(size: usize, mark: MarkValue, type_code: TypeCode) -> Self {
        debug_assert!(is_valid_object_size(size), "bad object size {}", size);
        ObjectHeader {
            size,
            mark,
            space: SpaceKind::New,
            has_references: true,
            non_primitive: false,
            proxy: false,
            uninit_pending: false,
            has_uninit: false,
            dead: false,
            type_code,
            behaviour: None,
        }
    }

    /// The header of a free block of `size` bytes.
    pub fn dead_object(size: usize) -> Self {
        let mut header = Self::init_header(size, MarkValue::CLEAR, TypeCode::PLACEHOLDER);
        header.has_references = false;
        header.dead = true;
        header
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn set_size(&mut self, size: usize) {
        debug_assert!(is_valid_object_size(size), "bad object size {}", size);
        self.size = size;
    }

    /// Number of words following the header.
    pub fn body_words(&self) -> usize {
        (self.size - HEADER_BYTES) >> LOG_BYTES_IN_WORD
    }

    pub fn mark(&self) -> MarkValue {
        self.mark
    }

    pub fn set_object_mark(&mut self, mark: MarkValue) {
        self.mark = mark;
    }

    pub fn clear_object_mark(&mut self) {
        self.mark = MarkValue::CLEAR;
    }

    pub fn is_object_live(&self, mark: MarkValue) -> bool {
        self.mark == mark
    }

    pub fn is_object_dead(&self, mark: MarkValue) -> bool {
        self.mark != mark
    }

    pub fn space(&self) -> SpaceKind {
        self.space
    }

    pub fn set_old_space(&mut self) {
        self.space = SpaceKind::Old;
    }

    pub fn clear_old_space(&mut self) {
        self.space = SpaceKind::New;
    }

    pub fn is_old_space(&self) -> bool {
        self.space == SpaceKind::Old
    }

    pub fn set_has_no_references(&mut self) {
        self.has_references = false;
    }

    pub fn set_has_references(&mut self) {
        self.has_references = true;
    }

    pub fn has_references(&self) -> bool {
        self.has_references
    }

    pub fn is_non_primitive(&self) -> bool {
        self.non_primitive
    }

    pub fn is_proxy(&self) -> bool {
        self.proxy
    }

    pub fn set_proxy(&mut self) {
        self.proxy = true;
    }

    pub fn has_uninit(&self) -> bool {
        self.has_uninit
    }

    pub fn set_has_uninit(&mut self, value: bool) {
        self.has_uninit = value;
    }

    pub fn is_uninit_pending(&self) -> bool {
        self.uninit_pending
    }

    pub fn set_uninit_pending(&mut self, value: bool) {
        self.uninit_pending = value;
    }

    /// Does this header describe free space rather than an object?
    pub fn is_dead_object(&self) -> bool {
        self.dead
    }

    pub fn type_code(&self) -> TypeCode {
        self.type_code
    }

    /// The non-primitive behaviour object, if any.
    pub fn behaviour(&self) -> Option<ObjectReference> {
        self.behaviour
    }

    /// Attach a non-primitive behaviour. `None` makes the object primitive again.
    pub fn set_behaviour(&mut self, behaviour: Option<ObjectReference>) {
        self.behaviour = behaviour;
        self.non_primitive = behaviour.is_some();
    }

    /// The header as it is written into a flat buffer: collector state is reset, the type
    /// information is kept. The behaviour word is rewritten by the flattener.
    pub fn for_flatten(&self) -> Self {
        let mut header = *self;
        header.mark = MarkValue::CLEAR;
        header.space = SpaceKind::New;
        header.uninit_pending = false;
        header.has_uninit = false;
        header.dead = false;
        header
    }

    /// The header a clone receives: type information from the original, a fresh size and mark.
    pub fn for_clone(&self, size: usize, mark: MarkValue) -> Self {
        let mut header = Self::init_header(size, mark, self.type_code);
        header.has_references = self.has_references;
        header.set_behaviour(self.behaviour);
        header
    }

    pub fn encode(&self) -> [usize; HEADER_WORDS] {
        let mut bits = (self.mark.bits() as usize) & MARK_MASK;
        if self.space == SpaceKind::Old {
            bits |= OLD_SPACE_BIT;
        }
        if !self.has_references {
            bits |= NO_REFERENCES_BIT;
        }
        if self.non_primitive {
            bits |= NON_PRIMITIVE_BIT;
        }
        if self.proxy {
            bits |= PROXY_BIT;
        }
        if self.uninit_pending {
            bits |= UNINIT_PENDING_BIT;
        }
        if self.has_uninit {
            bits |= HAS_UNINIT_BIT;
        }
        if self.dead {
            bits |= DEAD_OBJECT_BIT;
        }
        bits |= (self.type_code.0 as usize & TYPE_CODE_MASK) << TYPE_CODE_SHIFT;
        let mut words = [0; HEADER_WORDS];
        words[SIZE_WORD] = self.size;
        words[FLAGS_WORD] = bits;
        words[BEHAVIOUR_WORD] = ObjectReference::to_word(self.behaviour);
        words
    }

    pub fn decode(words: &[usize]) -> Self {
        let bits = words[FLAGS_WORD];
        let non_primitive = bits & NON_PRIMITIVE_BIT != 0;
        ObjectHeader {
            size: words[SIZE_WORD],
            mark: MarkValue::new((bits & MARK_MASK) as u8),
            space: if bits & OLD_SPACE_BIT != 0 {
                SpaceKind::Old
            } else {
                SpaceKind::New
            },
            has_references: bits & NO_REFERENCES_BIT == 0,
            non_primitive,
            proxy: bits & PROXY_BIT != 0,
            uninit_pending: bits & UNINIT_PENDING_BIT != 0,
            has_uninit: bits & HAS_UNINIT_BIT != 0,
            dead: bits & DEAD_OBJECT_BIT != 0,
            type_code: TypeCode(((bits >> TYPE_CODE_SHIFT) & TYPE_CODE_MASK) as u16),
            behaviour: if non_primitive {
                ObjectReference::from_word(words[BEHAVIOUR_WORD])
            } else {
                None
            },
        }
    }

    /// Raw behaviour word of an encoded header. In a flat buffer this is an offset.
    pub fn raw_behaviour(words: &[usize]) -> usize {
        words[BEHAVIOUR_WORD]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> ObjectHeader {
        ObjectHeader::init_header(64, MarkValue::FIRST, TypeCode::ARRAY)
    }

    #[test]
    fn set_old_space_is_idempotent() {
        let mut h = header();
        h.set_has_no_references();
        let before = h;
        h.set_old_space();
        h.set_old_space();
        assert!(h.is_old_space());
        assert_eq!(h.has_references(), before.has_references());
        assert_eq!(h.mark(), before.mark());
        assert_eq!(h.size(), before.size());
        assert_eq!(h.type_code(), before.type_code());
    }

    #[test]
    fn mark_after_clear() {
        for bits in 0..4u8 {
            let m = MarkValue::new(bits);
            let mut h = header();
            h.clear_object_mark();
            h.set_object_mark(m);
            assert!(h.is_object_live(m));
            assert!(!h.is_object_dead(m));
        }
    }

    #[test]
    fn flip_alternates() {
        let m = MarkValue::FIRST;
        assert_ne!(m.flip(), m);
        assert_eq!(m.flip().flip(), m);
        assert_ne!(m.flip(), MarkValue::CLEAR);
        assert_eq!(MarkValue::CLEAR.flip(), MarkValue::FIRST);
    }

    #[test]
    fn encode_decode() {
        let mut h = header();
        h.set_old_space();
        h.set_has_no_references();
        h.set_has_uninit(true);
        h.set_behaviour(ObjectReference::from_word(HEAP_START));
        let decoded = ObjectHeader::decode(&h.encode());
        assert_eq!(decoded, h);
        assert!(decoded.is_non_primitive());
    }

    #[test]
    fn dead_object_header() {
        let h = ObjectHeader::dead_object(MIN_OBJECT_SIZE);
        assert!(h.is_dead_object());
        assert!(!h.has_references());
        assert_eq!(h.body_words(), 0);
        assert_eq!(ObjectHeader::decode(&h.encode()), h);
    }

    #[test]
    fn flatten_resets_collector_state() {
        let mut h = header();
        h.set_old_space();
        h.set_has_uninit(true);
        let flat = h.for_flatten();
        assert!(!flat.is_old_space());
        assert!(!flat.has_uninit());
        assert_eq!(flat.mark(), MarkValue::CLEAR);
        assert_eq!(flat.type_code(), TypeCode::ARRAY);
    }
}
