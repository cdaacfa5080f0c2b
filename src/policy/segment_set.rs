use crate::policy::dead_pool::DeadObjectPool;
use crate::util::constants::MIN_OBJECT_SIZE;
use crate::util::conversions::{grain_align_up, is_valid_object_size};
use crate::util::error::{ConsistencyError, OrphanKind};
use crate::util::header::{MarkValue, ObjectHeader};
use crate::util::heap::{SegmentKind, SegmentMap};
use crate::util::Address;

/// A block handed out by a segment set. `size` may exceed the request by less than
/// [`MIN_OBJECT_SIZE`]: such a tail is too small to be a dead block of its own.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub start: Address,
    pub size: usize,
}

/// What one sweep found.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub live_objects: usize,
    pub live_bytes: usize,
    pub reclaimed_objects: usize,
    pub free_bytes: usize,
}

/// Occupancy of a segment set.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SetStats {
    pub segments: usize,
    pub bytes: usize,
    pub live_objects: usize,
    pub live_bytes: usize,
    pub free_bytes: usize,
    /// Dead blocks on the free chains.
    pub free_blocks: usize,
    /// Size of the largest dead block, zero if there is none.
    pub largest_free_block: usize,
}

/// A group of segments sharing one allocation discipline and one set of free chains.
pub struct SegmentSet {
    kind: SegmentKind,
    segments: Vec<Address>,
    pool: DeadObjectPool,
    /// Preferred size of a new segment.
    segment_size: usize,
}

impl SegmentSet {
    pub fn new(kind: SegmentKind, segment_size: usize) -> Self {
        SegmentSet {
            kind,
            segments: vec![],
            pool: DeadObjectPool::new(),
            segment_size,
        }
    }

    pub fn kind(&self) -> SegmentKind {
        self.kind
    }

    pub fn segments(&self) -> &[Address] {
        &self.segments
    }

    pub fn free_bytes(&self) -> usize {
        self.pool.free_bytes()
    }

    pub fn contains(&self, storage: &SegmentMap, addr: Address) -> bool {
        storage
            .segment_of(addr)
            .is_some_and(|s| s.kind() == self.kind)
    }

    /// Take a block of at least `size` bytes from the free chains. Never collects and
    /// never grows the set.
    pub fn allocate(&mut self, storage: &mut SegmentMap, size: usize) -> Option<Block> {
        debug_assert!(size >= MIN_OBJECT_SIZE);
        let (start, block_size) = self.pool.take(size)?;
        let remainder = block_size - size;
        if remainder >= MIN_OBJECT_SIZE {
            let rest = start + size;
            storage.write_header_at(rest, &ObjectHeader::dead_object(remainder));
            self.pool.add(rest, remainder);
            Some(Block { start, size })
        } else {
            Some(Block {
                start,
                size: block_size,
            })
        }
    }

    /// Turn an unused block back into free space right away, without waiting for a sweep.
    pub fn free_block(&mut self, storage: &mut SegmentMap, block: Block) {
        storage.write_header_at(block.start, &ObjectHeader::dead_object(block.size));
        self.pool.add(block.start, block.size);
    }

    /// Give a dead block to a sibling set. The block stays in this set's segment, so this
    /// set's sweep reclaims it when it dies.
    pub fn donate_object(&mut self, storage: &mut SegmentMap, size: usize) -> Option<Block> {
        let block = self.allocate(storage, size)?;
        debug!(
            "{} set donated a {} byte block at {}",
            self.kind.name(),
            block.size,
            block.start
        );
        Some(block)
    }

    /// Give up a wholly empty segment of at least `size` bytes.
    pub fn donate_segment(&mut self, storage: &SegmentMap, size: usize) -> Option<Address> {
        let index = self.segments.iter().position(|start| {
            storage
                .segment(*start)
                .is_some_and(|s| s.is_empty() && s.size() >= size)
        })?;
        let start = self.segments.swap_remove(index);
        let seg_size = storage.segment(start).map_or(0, |s| s.size());
        let removed = self.pool.remove(start, seg_size);
        debug_assert!(removed);
        debug!(
            "{} set donated segment {} ({} bytes)",
            self.kind.name(),
            start,
            seg_size
        );
        Some(start)
    }

    /// Take ownership of an empty segment donated by a sibling.
    pub fn adopt_segment(&mut self, storage: &mut SegmentMap, start: Address) {
        storage.set_segment_kind(start, self.kind);
        if let Some(segment) = storage.segment(start) {
            debug_assert!(segment.is_empty());
            self.pool.add(start, segment.size());
            self.segments.push(start);
        }
    }

    /// Take ownership of a segment whose contents were placed by the caller.
    pub fn add_placed_segment(&mut self, storage: &mut SegmentMap, start: Address) {
        storage.set_segment_kind(start, self.kind);
        self.segments.push(start);
    }

    /// Grow the set by a segment big enough for a `size` byte object. Tries the preferred
    /// segment size first and falls back to the minimum size that fits the object.
    pub fn add_segment(&mut self, storage: &mut SegmentMap, size: usize) -> bool {
        let minimum = grain_align_up(size);
        let preferred = minimum.max(self.segment_size);
        let start = storage
            .create_segment(preferred, self.kind)
            .or_else(|| {
                if preferred > minimum {
                    debug!(
                        "{} segment of {} bytes unavailable, retrying with {}",
                        self.kind.name(),
                        preferred,
                        minimum
                    );
                    storage.create_segment(minimum, self.kind)
                } else {
                    None
                }
            });
        match start {
            Some(start) => {
                let bytes = storage.segment(start).map_or(0, |s| s.size());
                self.pool.add(start, bytes);
                self.segments.push(start);
                true
            }
            None => false,
        }
    }

    /// Reclaim every object whose mark is not `mark`. Adjacent dead space is merged into
    /// one dead block, and the free chains are rebuilt from scratch.
    pub fn sweep(
        &mut self,
        storage: &mut SegmentMap,
        mark: MarkValue,
    ) -> Result<SweepSummary, ConsistencyError> {
        let mut summary = SweepSummary::default();
        self.pool.clear();
        for &start in &self.segments {
            let Some(segment) = storage.segment_mut(start) else {
                continue;
            };
            let end = segment.end();
            let mut cursor = start;
            let mut run: Option<Address> = None;
            while cursor < end {
                let header = segment.read_header(cursor);
                let size = header.size();
                if !is_valid_object_size(size) || size > end - cursor {
                    return Err(ConsistencyError {
                        reference: cursor,
                        kind: OrphanKind::MalformedSegment { at: cursor, size },
                        ancestry: vec![],
                    });
                }
                if header.is_dead_object() || header.is_object_dead(mark) {
                    if !header.is_dead_object() {
                        summary.reclaimed_objects += 1;
                    }
                    run.get_or_insert(cursor);
                } else {
                    if let Some(run_start) = run.take() {
                        let bytes = cursor - run_start;
                        segment.write_header(run_start, &ObjectHeader::dead_object(bytes));
                        self.pool.add(run_start, bytes);
                    }
                    summary.live_objects += 1;
                    summary.live_bytes += size;
                }
                cursor += size;
            }
            if let Some(run_start) = run {
                let bytes = end - run_start;
                segment.write_header(run_start, &ObjectHeader::dead_object(bytes));
                self.pool.add(run_start, bytes);
            }
        }
        summary.free_bytes = self.pool.free_bytes();
        Ok(summary)
    }

    /// Count objects and free space by walking every segment.
    pub fn census(&self, storage: &SegmentMap) -> SetStats {
        let mut stats = SetStats {
            free_blocks: self.pool.blocks(),
            largest_free_block: self.pool.largest_block().unwrap_or(0),
            ..Default::default()
        };
        for segment in self.segments.iter().filter_map(|s| storage.segment(*s)) {
            stats.segments += 1;
            stats.bytes += segment.size();
            for (_, header) in segment.objects().map_while(|o| o.ok()) {
                if header.is_dead_object() {
                    stats.free_bytes += header.size();
                } else {
                    stats.live_objects += 1;
                    stats.live_bytes += header.size();
                }
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::constants::*;
    use crate::vm::TypeCode;

    fn setup() -> (SegmentMap, SegmentSet) {
        (
            SegmentMap::new(BYTES_IN_MBYTE),
            SegmentSet::new(SegmentKind::Normal, 4 * BYTES_IN_KBYTE),
        )
    }

    fn place(storage: &mut SegmentMap, block: Block, mark: MarkValue) {
        storage.write_header_at(
            block.start,
            &ObjectHeader::init_header(block.size, mark, TypeCode::BYTES),
        );
    }

    #[test]
    fn allocate_splits_blocks() {
        let (mut storage, mut set) = setup();
        assert!(set.allocate(&mut storage, 64).is_none());
        assert!(set.add_segment(&mut storage, 64));
        let a = set.allocate(&mut storage, 64).unwrap();
        let b = set.allocate(&mut storage, 64).unwrap();
        assert_eq!(b.start, a.start + 64);
        assert_eq!(set.free_bytes(), 4 * BYTES_IN_KBYTE - 128);
    }

    #[test]
    fn small_tail_stays_with_the_block() {
        let (mut storage, mut set) = setup();
        let start = storage.create_segment(4 * BYTES_IN_KBYTE, SegmentKind::Normal).unwrap();
        set.add_placed_segment(&mut storage, start);
        // A dead block only 8 bytes larger than the request.
        storage.write_header_at(start, &ObjectHeader::dead_object(MIN_OBJECT_SIZE + 8));
        set.pool.add(start, MIN_OBJECT_SIZE + 8);
        let block = set.allocate(&mut storage, MIN_OBJECT_SIZE).unwrap();
        assert_eq!(block.size, MIN_OBJECT_SIZE + 8);
    }

    #[test]
    fn sweep_reclaims_and_coalesces() {
        let (mut storage, mut set) = setup();
        set.add_segment(&mut storage, 64);
        let live = MarkValue::FIRST;
        let blocks: Vec<Block> = (0..4).map(|_| set.allocate(&mut storage, 64).unwrap()).collect();
        for (i, block) in blocks.iter().enumerate() {
            // Objects 1 and 2 are garbage.
            let mark = if i == 1 || i == 2 { live.flip() } else { live };
            place(&mut storage, *block, mark);
        }
        let summary = set.sweep(&mut storage, live).unwrap();
        assert_eq!(summary.live_objects, 2);
        assert_eq!(summary.reclaimed_objects, 2);
        let merged = storage
            .segment_of(blocks[1].start)
            .unwrap()
            .read_header(blocks[1].start);
        assert!(merged.is_dead_object());
        assert_eq!(merged.size(), 128);
        let stats = set.census(&storage);
        assert_eq!(stats.live_objects, 2);
        assert_eq!(stats.free_bytes, 4 * BYTES_IN_KBYTE - 128);
        assert_eq!(stats.free_blocks, 2);
        assert_eq!(stats.largest_free_block, 4 * BYTES_IN_KBYTE - 256);
    }

    #[test]
    fn sweep_detects_malformed_segment() {
        let (mut storage, mut set) = setup();
        set.add_segment(&mut storage, 64);
        let start = set.segments()[0];
        storage.store_word(start, 12);
        let err = set.sweep(&mut storage, MarkValue::FIRST).unwrap_err();
        assert!(matches!(err.kind, OrphanKind::MalformedSegment { .. }));
    }

    #[test]
    fn donate_empty_segment() {
        let (mut storage, mut set) = setup();
        set.add_segment(&mut storage, 64);
        let mut large = SegmentSet::new(SegmentKind::Large, 8 * BYTES_IN_KBYTE);
        let start = set.donate_segment(&storage, 1024).unwrap();
        assert!(set.segments().is_empty());
        assert_eq!(set.free_bytes(), 0);
        large.adopt_segment(&mut storage, start);
        assert_eq!(storage.segment(start).unwrap().kind(), SegmentKind::Large);
        let block = large.allocate(&mut storage, 1024).unwrap();
        assert_eq!(block.start, start);
        // A segment with a live object is not donated.
        place(&mut storage, block, MarkValue::FIRST);
        assert!(large.donate_segment(&storage, 64).is_none());
    }

    #[test]
    fn donate_object_from_sibling() {
        let (mut storage, mut set) = setup();
        set.add_segment(&mut storage, 64);
        let block = set.donate_object(&mut storage, 512).unwrap();
        assert_eq!(storage.segment_of(block.start).unwrap().kind(), SegmentKind::Normal);
        assert_eq!(set.free_bytes(), 4 * BYTES_IN_KBYTE - 512);
    }
}
