//! Identity-keyed hash buckets used by the memory manager itself.
//!
//! These tables are deliberately independent of the object heap: their storage is a
//! fixed-size array owned by the bucket, so using one never allocates an object and can
//! never trigger a collection. The array is split in two halves. The low half holds the
//! primary slots, addressed by the identity hash of the key. The high half is the overflow
//! area: colliding entries are placed there (the next free slot is searched from the top
//! down) and chained from their primary slot.
//!
//! A bucket never resizes itself. Once [`Bucket::is_full`] is true, `put` of a new key
//! fails and the caller is expected to allocate a larger bucket and [`Bucket::merge`] into
//! it. [`GrowableBucket`] packages that protocol.

use crate::util::constants::{DEFAULT_BUCKET_SIZE, LOG_BYTES_IN_GRAIN};
use crate::util::ObjectReference;

const NO_MORE: usize = usize::MAX;

#[derive(Copy, Clone, Debug)]
struct Entry<V> {
    key: ObjectReference,
    value: V,
    next: usize,
}

/// A fixed-capacity identity hash table. `MapBucket` stores integers (reference counts,
/// buffer offsets); `PointerBucket` stores object references.
#[derive(Clone, Debug)]
pub struct Bucket<V: Copy> {
    entries: Vec<Option<Entry<V>>>,
    /// Number of primary slots; also the maximum number of items.
    bucket_size: usize,
    item_count: usize,
    /// Where the next overflow search starts.
    free: usize,
}

pub type MapBucket = Bucket<usize>;
pub type PointerBucket = Bucket<ObjectReference>;

impl<V: Copy> Bucket<V> {
    pub fn new(capacity: usize) -> Self {
        let bucket_size = capacity.max(1);
        let total = bucket_size * 2;
        Bucket {
            entries: vec![None; total],
            bucket_size,
            item_count: 0,
            free: total - 1,
        }
    }

    fn hash(&self, key: ObjectReference) -> usize {
        (key.value() >> LOG_BYTES_IN_GRAIN) % self.bucket_size
    }

    /// Maximum number of items this bucket can hold.
    pub fn capacity(&self) -> usize {
        self.bucket_size
    }

    /// Size of the backing array (primary plus overflow slots).
    pub fn total_size(&self) -> usize {
        self.entries.len()
    }

    pub fn items(&self) -> usize {
        self.item_count
    }

    pub fn is_empty(&self) -> bool {
        self.item_count == 0
    }

    pub fn is_full(&self) -> bool {
        self.item_count >= self.bucket_size
    }

    /// Find the slot holding `key`, together with the slot that chains to it.
    fn locate(&self, key: ObjectReference) -> Option<(Option<usize>, usize)> {
        let mut prev = None;
        let mut index = self.hash(key);
        loop {
            let entry = self.entries[index].as_ref()?;
            if entry.key == key {
                return Some((prev, index));
            }
            if entry.next == NO_MORE {
                return None;
            }
            prev = Some(index);
            index = entry.next;
        }
    }

    /// Find a free overflow slot, scanning down from the last position and wrapping once.
    fn find_free(&mut self) -> usize {
        let top = self.entries.len() - 1;
        let mut index = self.free;
        for _ in self.bucket_size..=top {
            if index < self.bucket_size {
                index = top;
            }
            if self.entries[index].is_none() {
                self.free = if index == self.bucket_size { top } else { index - 1 };
                return index;
            }
            index -= 1;
        }
        // The overflow area has as many slots as the bucket has items, so a non-full
        // bucket always has room.
        unreachable!("bucket overflow area exhausted with {} items", self.item_count)
    }

    /// Insert or update `key`. Returns false, leaving the bucket untouched, if the key is
    /// new and the bucket is full.
    pub fn put(&mut self, value: V, key: ObjectReference) -> bool {
        if let Some((_, index)) = self.locate(key) {
            if let Some(entry) = self.entries[index].as_mut() {
                entry.value = value;
            }
            return true;
        }
        if self.is_full() {
            return false;
        }
        let primary = self.hash(key);
        match self.entries[primary] {
            None => {
                self.entries[primary] = Some(Entry {
                    key,
                    value,
                    next: NO_MORE,
                });
            }
            Some(head) => {
                let slot = self.find_free();
                self.entries[slot] = Some(Entry {
                    key,
                    value,
                    next: head.next,
                });
                if let Some(head) = self.entries[primary].as_mut() {
                    head.next = slot;
                }
            }
        }
        self.item_count += 1;
        true
    }

    pub fn get(&self, key: ObjectReference) -> Option<V> {
        self.locate(key)
            .and_then(|(_, index)| self.entries[index].map(|e| e.value))
    }

    pub fn has_index(&self, key: ObjectReference) -> bool {
        self.locate(key).is_some()
    }

    pub fn remove(&mut self, key: ObjectReference) -> Option<V> {
        let (prev, index) = self.locate(key)?;
        let removed = self.entries[index]?;
        match prev {
            None => {
                // A primary slot: pull the next overflow entry forward so the chain keeps
                // its head. Each overflow slot is linked from exactly one place.
                if removed.next == NO_MORE {
                    self.entries[index] = None;
                } else {
                    self.entries[index] = self.entries[removed.next];
                    self.entries[removed.next] = None;
                }
            }
            Some(prev) => {
                if let Some(p) = self.entries[prev].as_mut() {
                    p.next = removed.next;
                }
                self.entries[index] = None;
            }
        }
        self.item_count -= 1;
        Some(removed.value)
    }

    pub fn clear(&mut self) {
        self.entries.iter_mut().for_each(|e| *e = None);
        self.item_count = 0;
        self.free = self.entries.len() - 1;
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectReference, V)> + '_ {
        self.entries.iter().flatten().map(|e| (e.key, e.value))
    }

    pub fn keys(&self) -> Vec<ObjectReference> {
        self.iter().map(|(k, _)| k).collect()
    }

    /// Re-insert every entry of this bucket into `other`. Returns false if `other` filled
    /// up before all entries were copied.
    pub fn merge(&self, other: &mut Bucket<V>) -> bool {
        self.iter().all(|(key, value)| other.put(value, key))
    }
}

impl Bucket<usize> {
    /// Add one to the count for `key`, inserting it with a count of one.
    pub fn increment(&mut self, key: ObjectReference) -> bool {
        let count = self.get(key).unwrap_or(0);
        self.put(count + 1, key)
    }

    /// Subtract one from the count for `key`. The entry is removed when the count reaches zero.
    pub fn decrement(&mut self, key: ObjectReference) {
        match self.get(key) {
            Some(count) if count > 1 => {
                self.put(count - 1, key);
            }
            Some(_) => {
                self.remove(key);
            }
            None => {}
        }
    }
}

/// A bucket that doubles into a fresh bucket whenever it fills up.
#[derive(Clone, Debug)]
pub struct GrowableBucket<V: Copy> {
    bucket: Bucket<V>,
}

impl<V: Copy> GrowableBucket<V> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUCKET_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        GrowableBucket {
            bucket: Bucket::new(capacity),
        }
    }

    fn grow(&mut self) {
        let mut larger = Bucket::new(self.bucket.capacity() * 2);
        let merged = self.bucket.merge(&mut larger);
        debug_assert!(merged);
        trace!("Bucket grown to {} entries", larger.capacity());
        self.bucket = larger;
    }

    pub fn put(&mut self, value: V, key: ObjectReference) {
        if !self.bucket.put(value, key) {
            self.grow();
            let inserted = self.bucket.put(value, key);
            debug_assert!(inserted);
        }
    }

    pub fn get(&self, key: ObjectReference) -> Option<V> {
        self.bucket.get(key)
    }

    pub fn has_index(&self, key: ObjectReference) -> bool {
        self.bucket.has_index(key)
    }

    pub fn remove(&mut self, key: ObjectReference) -> Option<V> {
        self.bucket.remove(key)
    }

    pub fn items(&self) -> usize {
        self.bucket.items()
    }

    pub fn is_empty(&self) -> bool {
        self.bucket.is_empty()
    }

    pub fn clear(&mut self) {
        self.bucket.clear()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectReference, V)> + '_ {
        self.bucket.iter()
    }

    pub fn keys(&self) -> Vec<ObjectReference> {
        self.bucket.keys()
    }
}

impl GrowableBucket<usize> {
    pub fn increment(&mut self, key: ObjectReference) {
        if !self.bucket.increment(key) {
            self.grow();
            let inserted = self.bucket.increment(key);
            debug_assert!(inserted);
        }
    }

    pub fn decrement(&mut self, key: ObjectReference) {
        self.bucket.decrement(key)
    }
}

impl<V: Copy> Default for GrowableBucket<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::constants::{BYTES_IN_GRAIN, HEAP_START};
    use rand::seq::SliceRandom;

    fn key(i: usize) -> ObjectReference {
        ObjectReference::from_word(HEAP_START + i * BYTES_IN_GRAIN).unwrap()
    }

    #[test]
    fn put_get_remove() {
        let mut bucket = MapBucket::new(8);
        for i in 0..8 {
            assert!(bucket.put(i * 10, key(i)));
        }
        for i in 0..8 {
            assert_eq!(bucket.get(key(i)), Some(i * 10));
        }
        assert_eq!(bucket.remove(key(3)), Some(30));
        assert_eq!(bucket.get(key(3)), None);
        assert!(!bucket.has_index(key(3)));
        assert_eq!(bucket.items(), 7);
        assert_eq!(bucket.remove(key(3)), None);
    }

    #[test]
    fn update_existing_key() {
        let mut bucket = MapBucket::new(2);
        assert!(bucket.put(1, key(1)));
        assert!(bucket.put(2, key(1)));
        assert_eq!(bucket.items(), 1);
        assert_eq!(bucket.get(key(1)), Some(2));
    }

    #[test]
    fn full_bucket_rejects_new_keys() {
        let mut bucket = MapBucket::new(10);
        for i in 0..10 {
            assert!(bucket.put(i, key(i * 7)));
        }
        assert!(bucket.is_full());
        let before: Vec<_> = bucket.iter().collect();
        assert!(!bucket.put(99, key(1000)));
        assert_eq!(bucket.items(), 10);
        assert_eq!(bucket.get(key(1000)), None);
        let after: Vec<_> = bucket.iter().collect();
        assert_eq!(before.len(), after.len());
        // Existing keys can still be updated.
        assert!(bucket.put(42, key(0)));
        assert_eq!(bucket.get(key(0)), Some(42));
    }

    #[test]
    fn colliding_keys_chain_and_remove() {
        // With 4 primary slots, keys i, i+4, i+8 ... share a chain.
        let mut bucket = MapBucket::new(4);
        let colliding = [key(1), key(5), key(9), key(13)];
        for (i, k) in colliding.iter().enumerate() {
            assert!(bucket.put(i, *k));
        }
        // Remove the chain head, then a middle entry.
        assert_eq!(bucket.remove(colliding[0]), Some(0));
        assert_eq!(bucket.remove(colliding[2]), Some(2));
        assert_eq!(bucket.get(colliding[1]), Some(1));
        assert_eq!(bucket.get(colliding[3]), Some(3));
        // Freed slots are reused.
        assert!(bucket.put(7, key(17)));
        assert!(bucket.put(8, key(21)));
        assert!(bucket.is_full());
        assert_eq!(bucket.get(key(17)), Some(7));
        assert_eq!(bucket.get(key(21)), Some(8));
    }

    #[test]
    fn increment_and_decrement() {
        let mut bucket = MapBucket::new(4);
        assert!(bucket.increment(key(1)));
        assert!(bucket.increment(key(1)));
        assert_eq!(bucket.get(key(1)), Some(2));
        bucket.decrement(key(1));
        assert_eq!(bucket.get(key(1)), Some(1));
        bucket.decrement(key(1));
        assert!(!bucket.has_index(key(1)));
        bucket.decrement(key(1));
        assert!(bucket.is_empty());
    }

    #[test]
    fn merge_into_larger_bucket() {
        let mut small = PointerBucket::new(6);
        for i in 0..6 {
            assert!(small.put(key(i + 100), key(i)));
        }
        let mut large = PointerBucket::new(12);
        assert!(small.merge(&mut large));
        assert_eq!(large.items(), 6);
        for i in 0..6 {
            assert_eq!(large.get(key(i)), Some(key(i + 100)));
        }
        let mut keys = large.keys();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 6);
    }

    #[test]
    fn merge_into_smaller_bucket_fails() {
        let mut bucket = MapBucket::new(4);
        for i in 0..4 {
            bucket.put(i, key(i));
        }
        let mut tiny = MapBucket::new(2);
        assert!(!bucket.merge(&mut tiny));
    }

    #[test]
    fn random_operations_match_model() {
        let mut rng = rand::rng();
        let mut keys: Vec<usize> = (0..64).collect();
        keys.shuffle(&mut rng);
        let mut bucket = MapBucket::new(64);
        let mut model = std::collections::HashMap::new();
        for (n, k) in keys.iter().enumerate() {
            bucket.put(n, key(*k));
            model.insert(*k, n);
            if n % 3 == 0 {
                let victim = keys[n / 2];
                assert_eq!(bucket.remove(key(victim)), model.remove(&victim));
            }
        }
        assert_eq!(bucket.items(), model.len());
        for (k, v) in model {
            assert_eq!(bucket.get(key(k)), Some(v));
        }
    }

    #[test]
    fn growable_bucket_grows() {
        let mut bucket = GrowableBucket::<usize>::with_capacity(2);
        for i in 0..50 {
            bucket.put(i, key(i));
        }
        assert_eq!(bucket.items(), 50);
        for i in 0..50 {
            assert_eq!(bucket.get(key(i)), Some(i));
        }
        bucket.increment(key(1000));
        assert_eq!(bucket.get(key(1000)), Some(1));
    }
}
