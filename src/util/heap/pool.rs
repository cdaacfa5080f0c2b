//! Pools hand out address ranges for segments.
//!
//! A pool is a reservation of [`POOL_SIZE`] bytes of object-memory address space (larger for
//! a single oversized segment). Segments are carved from the pool's free ranges first-fit;
//! a released segment's range goes back to its pool and is merged with its neighbours.
//! Committed bytes are bounded by the maximum heap size.

use std::ops::Range;

use crate::util::constants::*;
use crate::util::conversions::raw_align_up;
use crate::util::heap::ByteAccounting;
use crate::util::Address;

struct Pool {
    range: Range<Address>,
    /// Free sub-ranges, sorted by address, never adjacent.
    free: Vec<Range<Address>>,
}

impl Pool {
    fn new(start: Address, size: usize) -> Self {
        let range = start..start + size;
        Pool {
            free: vec![range.clone()],
            range,
        }
    }

    fn take(&mut self, bytes: usize) -> Option<Address> {
        let index = self.free.iter().position(|r| r.end - r.start >= bytes)?;
        let start = self.free[index].start;
        self.free[index].start = start + bytes;
        if self.free[index].is_empty() {
            self.free.remove(index);
        }
        Some(start)
    }

    fn give_back(&mut self, start: Address, bytes: usize) {
        let end = start + bytes;
        let index = self.free.partition_point(|r| r.start < start);
        self.free.insert(index, start..end);
        // Merge with the following range, then with the preceding one.
        if index + 1 < self.free.len() && self.free[index + 1].start == end {
            let next = self.free.remove(index + 1);
            self.free[index].end = next.end;
        }
        if index > 0 && self.free[index - 1].end == start {
            let this = self.free.remove(index);
            self.free[index - 1].end = this.end;
        }
    }

    fn contains(&self, addr: Address) -> bool {
        self.range.contains(&addr)
    }
}

/// All pools of one memory.
pub struct PoolManager {
    pools: Vec<Pool>,
    /// Where the next pool's reservation starts.
    next_pool: Address,
    max_heap_size: usize,
    accounting: ByteAccounting,
}

impl PoolManager {
    pub fn new(max_heap_size: usize) -> Self {
        PoolManager {
            pools: vec![],
            next_pool: Address::from_usize(HEAP_START),
            max_heap_size,
            accounting: ByteAccounting::new(),
        }
    }

    /// Find address space for a segment of `bytes` bytes. Returns `None` if committing it
    /// would exceed the maximum heap size.
    pub fn acquire(&mut self, bytes: usize) -> Option<Address> {
        debug_assert!(bytes > 0 && bytes % BYTES_IN_GRAIN == 0);
        let committed = self.accounting.get_committed_bytes().checked_add(bytes)?;
        if committed > self.max_heap_size {
            return None;
        }
        let start = match self.pools.iter_mut().find_map(|p| p.take(bytes)) {
            Some(start) => start,
            None => {
                let size = raw_align_up(bytes, POOL_SIZE);
                let start = self.next_pool;
                self.next_pool = start + size;
                debug!("Reserved pool {}..{}", start, start + size);
                self.accounting.reserve(size);
                let mut pool = Pool::new(start, size);
                let taken = pool.take(bytes);
                debug_assert_eq!(taken, Some(start));
                self.pools.push(pool);
                start
            }
        };
        self.accounting.commit(bytes);
        Some(start)
    }

    /// Return a segment's range to its pool.
    pub fn release(&mut self, start: Address, bytes: usize) {
        if let Some(pool) = self.pools.iter_mut().find(|p| p.contains(start)) {
            pool.give_back(start, bytes);
            self.accounting.release(bytes);
        } else {
            debug_assert!(false, "released range {} belongs to no pool", start);
        }
    }

    pub fn committed_bytes(&self) -> usize {
        self.accounting.get_committed_bytes()
    }

    pub fn reserved_bytes(&self) -> usize {
        self.accounting.get_reserved_bytes()
    }

    pub fn max_heap_size(&self) -> usize {
        self.max_heap_size
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_within_one_pool() {
        let mut pools = PoolManager::new(16 * BYTES_IN_MBYTE);
        let a = pools.acquire(64 * BYTES_IN_KBYTE).unwrap();
        let b = pools.acquire(64 * BYTES_IN_KBYTE).unwrap();
        assert_eq!(a, Address::from_usize(HEAP_START));
        assert_eq!(b, a + 64 * BYTES_IN_KBYTE);
        assert_eq!(pools.pool_count(), 1);
        assert_eq!(pools.committed_bytes(), 128 * BYTES_IN_KBYTE);
    }

    #[test]
    fn released_range_is_reused() {
        let mut pools = PoolManager::new(16 * BYTES_IN_MBYTE);
        let a = pools.acquire(64 * BYTES_IN_KBYTE).unwrap();
        let _b = pools.acquire(64 * BYTES_IN_KBYTE).unwrap();
        pools.release(a, 64 * BYTES_IN_KBYTE);
        assert_eq!(pools.acquire(32 * BYTES_IN_KBYTE), Some(a));
    }

    #[test]
    fn oversized_segment_gets_own_pool() {
        let mut pools = PoolManager::new(64 * BYTES_IN_MBYTE);
        let _small = pools.acquire(64 * BYTES_IN_KBYTE).unwrap();
        let big = pools.acquire(POOL_SIZE + BYTES_IN_GRAIN).unwrap();
        assert_eq!(big, Address::from_usize(HEAP_START + POOL_SIZE));
        assert_eq!(pools.pool_count(), 2);
        assert_eq!(pools.reserved_bytes(), 3 * POOL_SIZE);
    }

    #[test]
    fn respects_max_heap_size() {
        let mut pools = PoolManager::new(128 * BYTES_IN_KBYTE);
        assert!(pools.acquire(64 * BYTES_IN_KBYTE).is_some());
        assert!(pools.acquire(64 * BYTES_IN_KBYTE).is_some());
        assert!(pools.acquire(BYTES_IN_GRAIN * 4).is_none());
    }
}
