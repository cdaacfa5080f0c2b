/// CollectionTrigger decides when a failed allocation should collect before the heap grows.
/// All the decisions about allocation volume and heap limit should be resolved here.
pub struct CollectionTrigger {
    /// Bytes allocated since the last collection finished.
    bytes_since_gc: usize,
    /// Allocation volume after which an allocation failure collects first.
    threshold: usize,
    /// Number of completed collections.
    collections: usize,
}

impl CollectionTrigger {
    pub fn new(threshold: usize) -> Self {
        CollectionTrigger {
            bytes_since_gc: 0,
            threshold,
            collections: 0,
        }
    }

    /// This method is called by the allocation path for every object it hands out.
    pub fn on_allocation(&mut self, bytes: usize) {
        self.bytes_since_gc = self.bytes_since_gc.saturating_add(bytes);
    }

    /// Inform the trigger that a collection ends.
    pub fn on_gc_end(&mut self) {
        self.bytes_since_gc = 0;
        self.collections += 1;
    }

    /// Should an allocation failure collect before asking for more memory?
    pub fn is_gc_required(&self) -> bool {
        self.bytes_since_gc >= self.threshold
    }

    pub fn bytes_since_gc(&self) -> usize {
        self.bytes_since_gc
    }

    pub fn collections(&self) -> usize {
        self.collections
    }
}
