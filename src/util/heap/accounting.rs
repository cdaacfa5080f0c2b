use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

/// Byte-level accounting of segment memory.
/// Pools use this to track how much address space is reserved and how much of it is
/// committed to segments.
pub struct ByteAccounting {
    /// Address space reserved by pools. Reserved space is not yet backed by any segment.
    reserved: AtomicUsize,
    /// Bytes currently backing segments.
    committed: AtomicUsize,
}

impl ByteAccounting {
    pub fn new() -> Self {
        Self {
            reserved: AtomicUsize::new(0),
            committed: AtomicUsize::new(0),
        }
    }

    /// Inform of reserving a new range of address space.
    pub fn reserve(&self, bytes: usize) {
        self.reserved.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Inform of committing bytes of reserved space to a segment.
    pub fn commit(&self, bytes: usize) {
        self.committed.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Inform of a segment being returned to its pool.
    pub fn release(&self, bytes: usize) {
        let _prev_committed = self.committed.fetch_sub(bytes, Ordering::Relaxed);
        debug_assert!(_prev_committed >= bytes);
    }

    pub fn get_reserved_bytes(&self) -> usize {
        self.reserved.load(Ordering::Relaxed)
    }

    pub fn get_committed_bytes(&self) -> usize {
        self.committed.load(Ordering::Relaxed)
    }
}

impl Default for ByteAccounting {
    fn default() -> Self {
        Self::new()
    }
}
