use enum_map::Enum;
use strum_macros::{EnumIter, IntoStaticStr};

use crate::util::constants::*;
use crate::util::conversions::is_valid_object_size;
use crate::util::header::ObjectHeader;
use crate::util::Address;

/// The segment set a segment currently belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Enum, EnumIter, IntoStaticStr)]
pub enum SegmentKind {
    Normal,
    Large,
    Old,
}

impl SegmentKind {
    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// A contiguous run of words, subdivided into size-prefixed objects and dead blocks.
///
/// Objects are laid out back to back: the object following the one at `a` starts at
/// `a + size(a)`. A well-formed segment is exactly covered by its objects.
#[derive(Debug)]
pub struct Segment {
    start: Address,
    words: Box<[usize]>,
    kind: SegmentKind,
}

impl Segment {
    /// A segment of `bytes` bytes covered by a single dead block.
    pub fn new(start: Address, bytes: usize, kind: SegmentKind) -> Self {
        debug_assert!(is_valid_object_size(bytes));
        let mut segment = Segment {
            start,
            words: vec![0; bytes >> LOG_BYTES_IN_WORD].into_boxed_slice(),
            kind,
        };
        segment.write_header(start, &ObjectHeader::dead_object(bytes));
        segment
    }

    /// A segment holding pre-built contents, such as a restored image.
    pub fn from_words(start: Address, words: Vec<usize>, kind: SegmentKind) -> Self {
        Segment {
            start,
            words: words.into_boxed_slice(),
            kind,
        }
    }

    pub fn start(&self) -> Address {
        self.start
    }

    pub fn end(&self) -> Address {
        self.start + self.size()
    }

    pub fn size(&self) -> usize {
        self.words.len() << LOG_BYTES_IN_WORD
    }

    pub fn kind(&self) -> SegmentKind {
        self.kind
    }

    pub fn set_kind(&mut self, kind: SegmentKind) {
        self.kind = kind;
    }

    pub fn contains(&self, addr: Address) -> bool {
        addr >= self.start && addr < self.end()
    }

    fn index(&self, addr: Address) -> usize {
        debug_assert!(self.contains(addr), "{} outside segment {}", addr, self.start);
        (addr - self.start) >> LOG_BYTES_IN_WORD
    }

    pub fn words(&self) -> &[usize] {
        &self.words
    }

    pub fn load(&self, addr: Address) -> usize {
        self.words[self.index(addr)]
    }

    pub fn store(&mut self, addr: Address, value: usize) {
        let index = self.index(addr);
        self.words[index] = value;
    }

    /// `count` words starting at `addr`.
    pub fn slice(&self, addr: Address, count: usize) -> &[usize] {
        let index = self.index(addr);
        &self.words[index..index + count]
    }

    pub fn slice_mut(&mut self, addr: Address, count: usize) -> &mut [usize] {
        let index = self.index(addr);
        &mut self.words[index..index + count]
    }

    pub fn read_header(&self, addr: Address) -> ObjectHeader {
        ObjectHeader::decode(self.slice(addr, HEADER_WORDS))
    }

    pub fn write_header(&mut self, addr: Address, header: &ObjectHeader) {
        self.slice_mut(addr, HEADER_WORDS)
            .copy_from_slice(&header.encode());
    }

    /// Zero `bytes` bytes starting at `addr`.
    pub fn zero(&mut self, addr: Address, bytes: usize) {
        self.slice_mut(addr, bytes >> LOG_BYTES_IN_WORD).fill(0);
    }

    /// Is the whole segment a single dead block?
    pub fn is_empty(&self) -> bool {
        let header = self.read_header(self.start);
        header.is_dead_object() && header.size() == self.size()
    }

    /// Walk the objects of this segment in address order.
    pub fn objects(&self) -> SegmentWalker<'_> {
        SegmentWalker {
            segment: self,
            cursor: self.start,
        }
    }

    /// Does an object (live or dead) start at `addr`? Walks the segment from its start.
    pub fn is_object_start(&self, addr: Address) -> bool {
        self.objects()
            .map_while(|step| step.ok())
            .take_while(|(start, _)| *start <= addr)
            .any(|(start, _)| start == addr)
    }
}

/// A step of a segment walk that found a size which cannot be right.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BadObjectSize {
    pub at: Address,
    pub size: usize,
}

/// Iterator over `(start, header)` pairs. A malformed size ends the walk with an error item.
pub struct SegmentWalker<'a> {
    segment: &'a Segment,
    cursor: Address,
}

impl Iterator for SegmentWalker<'_> {
    type Item = Result<(Address, ObjectHeader), BadObjectSize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.segment.end() {
            return None;
        }
        let at = self.cursor;
        let remaining = self.segment.end() - at;
        if remaining < MIN_OBJECT_SIZE {
            self.cursor = self.segment.end();
            return Some(Err(BadObjectSize { at, size: remaining }));
        }
        let header = self.segment.read_header(at);
        let size = header.size();
        if !is_valid_object_size(size) || size > remaining {
            self.cursor = self.segment.end();
            return Some(Err(BadObjectSize { at, size }));
        }
        self.cursor = at + size;
        Some(Ok((at, header)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::header::MarkValue;
    use crate::vm::TypeCode;

    fn segment() -> Segment {
        Segment::new(Address::from_usize(HEAP_START), 4 * BYTES_IN_KBYTE, SegmentKind::Normal)
    }

    #[test]
    fn new_segment_is_one_dead_block() {
        let seg = segment();
        assert!(seg.is_empty());
        let objects: Vec<_> = seg.objects().collect();
        assert_eq!(objects.len(), 1);
        assert!(seg.is_object_start(seg.start()));
        assert!(!seg.is_object_start(seg.start() + BYTES_IN_GRAIN));
    }

    #[test]
    fn walk_objects() {
        let mut seg = segment();
        let start = seg.start();
        let first = ObjectHeader::init_header(64, MarkValue::FIRST, TypeCode::ARRAY);
        seg.write_header(start, &first);
        let rest = seg.size() - 64;
        seg.write_header(start + 64, &ObjectHeader::dead_object(rest));
        let starts: Vec<_> = seg.objects().map(|o| o.unwrap().0).collect();
        assert_eq!(starts, vec![start, start + 64]);
        assert!(seg.is_object_start(start + 64));
        assert!(!seg.is_empty());
    }

    #[test]
    fn walk_reports_bad_size() {
        let mut seg = segment();
        let start = seg.start();
        seg.store(start, 12);
        let items: Vec<_> = seg.objects().collect();
        assert_eq!(items, vec![Err(BadObjectSize { at: start, size: 12 })]);
    }
}
