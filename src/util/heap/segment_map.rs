use std::collections::BTreeMap;

use crate::util::constants::*;
use crate::util::header::ObjectHeader;
use crate::util::heap::pool::PoolManager;
use crate::util::heap::segment::{Segment, SegmentKind};
use crate::util::{Address, ObjectReference};

/// Every segment of one memory, indexed by start address.
///
/// This is the only way object storage is read or written: an address is resolved to the
/// segment that contains it, then to a word index inside that segment. Accesses to
/// addresses outside every segment are internal errors and panic; code that handles
/// untrusted references validates them first with [`SegmentMap::segment_of`].
pub struct SegmentMap {
    segments: BTreeMap<Address, Segment>,
    pools: PoolManager,
}

impl SegmentMap {
    pub fn new(max_heap_size: usize) -> Self {
        SegmentMap {
            segments: BTreeMap::new(),
            pools: PoolManager::new(max_heap_size),
        }
    }

    /// Create an empty segment. Returns `None` if the heap limit does not allow it.
    pub fn create_segment(&mut self, bytes: usize, kind: SegmentKind) -> Option<Address> {
        let start = self.pools.acquire(bytes)?;
        debug!(
            "Acquired {} segment {}..{} ({} bytes)",
            kind.name(),
            start,
            start + bytes,
            bytes
        );
        self.segments.insert(start, Segment::new(start, bytes, kind));
        Some(start)
    }

    /// Create a segment holding `words` verbatim.
    pub fn create_segment_from_words(
        &mut self,
        words: Vec<usize>,
        kind: SegmentKind,
    ) -> Option<Address> {
        let bytes = words.len() << LOG_BYTES_IN_WORD;
        let start = self.pools.acquire(bytes)?;
        debug!("Placed {} segment {}..{}", kind.name(), start, start + bytes);
        self.segments
            .insert(start, Segment::from_words(start, words, kind));
        Some(start)
    }

    /// Return a segment's memory to its pool.
    pub fn release_segment(&mut self, start: Address) {
        if let Some(segment) = self.segments.remove(&start) {
            debug!("Released {} segment {}", segment.kind().name(), start);
            self.pools.release(start, segment.size());
        }
    }

    /// The segment starting exactly at `start`.
    pub fn segment(&self, start: Address) -> Option<&Segment> {
        self.segments.get(&start)
    }

    pub fn segment_mut(&mut self, start: Address) -> Option<&mut Segment> {
        self.segments.get_mut(&start)
    }

    /// The segment containing `addr`.
    pub fn segment_of(&self, addr: Address) -> Option<&Segment> {
        self.segments
            .range(..=addr)
            .next_back()
            .map(|(_, s)| s)
            .filter(|s| s.contains(addr))
    }

    pub fn segment_of_mut(&mut self, addr: Address) -> Option<&mut Segment> {
        self.segments
            .range_mut(..=addr)
            .next_back()
            .map(|(_, s)| s)
            .filter(|s| s.contains(addr))
    }

    fn expect_segment(&self, addr: Address) -> &Segment {
        match self.segment_of(addr) {
            Some(segment) => segment,
            None => panic!("access to unmapped object memory at {}", addr),
        }
    }

    fn expect_segment_mut(&mut self, addr: Address) -> &mut Segment {
        match self.segment_of_mut(addr) {
            Some(segment) => segment,
            None => panic!("access to unmapped object memory at {}", addr),
        }
    }

    pub fn is_mapped(&self, addr: Address) -> bool {
        self.segment_of(addr).is_some()
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.values()
    }

    pub fn segments_of_kind(&self, kind: SegmentKind) -> impl Iterator<Item = &Segment> {
        self.segments.values().filter(move |s| s.kind() == kind)
    }

    pub fn set_segment_kind(&mut self, start: Address, kind: SegmentKind) {
        if let Some(segment) = self.segments.get_mut(&start) {
            segment.set_kind(kind);
        }
    }

    pub fn committed_bytes(&self) -> usize {
        self.pools.committed_bytes()
    }

    pub fn max_heap_size(&self) -> usize {
        self.pools.max_heap_size()
    }

    /* Word access */

    pub fn load_word(&self, addr: Address) -> usize {
        self.expect_segment(addr).load(addr)
    }

    pub fn store_word(&mut self, addr: Address, value: usize) {
        self.expect_segment_mut(addr).store(addr, value)
    }

    pub fn load_reference(&self, addr: Address) -> Option<ObjectReference> {
        ObjectReference::from_word(self.load_word(addr))
    }

    pub fn store_reference(&mut self, addr: Address, value: Option<ObjectReference>) {
        self.store_word(addr, ObjectReference::to_word(value))
    }

    /// `count` words starting at `addr`. The range must lie inside one segment.
    pub fn words(&self, addr: Address, count: usize) -> &[usize] {
        self.expect_segment(addr).slice(addr, count)
    }

    pub fn words_mut(&mut self, addr: Address, count: usize) -> &mut [usize] {
        self.expect_segment_mut(addr).slice_mut(addr, count)
    }

    /// Copy `bytes` bytes between two ranges, possibly in different segments.
    pub fn copy_bytes(&mut self, from: Address, to: Address, bytes: usize) {
        let count = bytes >> LOG_BYTES_IN_WORD;
        let buffer = self.words(from, count).to_vec();
        self.words_mut(to, count).copy_from_slice(&buffer);
    }

    pub fn zero_bytes(&mut self, addr: Address, bytes: usize) {
        self.expect_segment_mut(addr).zero(addr, bytes)
    }

    /* Headers */

    pub fn header(&self, object: ObjectReference) -> ObjectHeader {
        self.expect_segment(object.to_raw_address())
            .read_header(object.to_raw_address())
    }

    pub fn set_header(&mut self, object: ObjectReference, header: &ObjectHeader) {
        self.write_header_at(object.to_raw_address(), header)
    }

    pub fn write_header_at(&mut self, addr: Address, header: &ObjectHeader) {
        self.expect_segment_mut(addr).write_header(addr, header)
    }

    /// Read, modify and write back an object's header.
    pub fn update_header<F: FnOnce(&mut ObjectHeader)>(&mut self, object: ObjectReference, f: F) {
        let mut header = self.header(object);
        f(&mut header);
        self.set_header(object, &header);
    }

    /// Load body word `index` of `object`.
    pub fn body_word(&self, object: ObjectReference, index: usize) -> usize {
        self.load_word(object.body_word(index))
    }

    pub fn set_body_word(&mut self, object: ObjectReference, index: usize, value: usize) {
        self.store_word(object.body_word(index), value)
    }

    /// All body words of `object`.
    pub fn body(&self, object: ObjectReference) -> &[usize] {
        let header = self.header(object);
        self.words(object.body_word(0), header.body_words())
    }
}
