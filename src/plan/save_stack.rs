//! Short-term protection for objects that are not yet anchored anywhere.

use crate::util::bucket::GrowableBucket;
use crate::util::ObjectReference;

/// A bounded ring of recently allocated objects.
///
/// Every new object is pushed here. A collection marks whatever is on the stack and then
/// empties it, so each entry survives exactly one collection. Pushing onto a full stack
/// overwrites the oldest entry.
pub struct SaveStack {
    entries: Vec<Option<ObjectReference>>,
    /// Next position to write.
    top: usize,
}

impl SaveStack {
    pub fn new(size: usize) -> Self {
        SaveStack {
            entries: vec![None; size.max(1)],
            top: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    fn before(&self, index: usize) -> usize {
        if index == 0 {
            self.entries.len() - 1
        } else {
            index - 1
        }
    }

    pub fn push(&mut self, object: ObjectReference) {
        if let Some(old) = self.entries[self.top] {
            debug!("Save stack full, {} pushed through by {}", old, object);
        }
        self.entries[self.top] = Some(object);
        self.top = (self.top + 1) % self.entries.len();
    }

    /// Stop protecting `object`. The most recent entry is checked first; the whole stack is
    /// searched only if `search_whole` is set. Returns whether the object was found.
    pub fn remove(&mut self, object: ObjectReference, search_whole: bool) -> bool {
        let last = self.before(self.top);
        if self.entries[last] == Some(object) {
            self.entries[last] = None;
            self.top = last;
            return true;
        }
        if search_whole {
            // Newest to oldest.
            let mut index = last;
            for _ in 1..self.entries.len() {
                index = self.before(index);
                if self.entries[index] == Some(object) {
                    self.entries[index] = None;
                    return true;
                }
            }
        }
        false
    }

    /// Grow the stack to at least `size` entries, keeping every entry.
    pub fn extend(&mut self, size: usize) {
        if size <= self.entries.len() {
            return;
        }
        let mut entries = self.oldest_first();
        let kept = entries.len();
        entries.resize(size, None);
        self.entries = entries;
        self.top = kept;
        debug!("Save stack extended to {} entries", size);
    }

    fn oldest_first(&self) -> Vec<Option<ObjectReference>> {
        let (newer, older) = self.entries.split_at(self.top);
        older
            .iter()
            .chain(newer.iter())
            .filter(|e| e.is_some())
            .copied()
            .collect()
    }

    /// Empty the stack, returning its entries oldest first.
    pub fn take_all(&mut self) -> Vec<ObjectReference> {
        let entries = self.oldest_first().into_iter().flatten().collect();
        self.entries.fill(None);
        self.top = 0;
        entries
    }

    pub fn contains(&self, object: ObjectReference) -> bool {
        self.entries.contains(&Some(object))
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Counted, explicit holds. An object stays alive while its hold count is positive.
#[derive(Default)]
pub struct SaveTable {
    holds: GrowableBucket<usize>,
}

impl SaveTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hold(&mut self, object: ObjectReference) {
        self.holds.increment(object)
    }

    /// Drop one hold. Returns false if the object was not held.
    pub fn release(&mut self, object: ObjectReference) -> bool {
        let held = self.holds.has_index(object);
        self.holds.decrement(object);
        held
    }

    pub fn is_held(&self, object: ObjectReference) -> bool {
        self.holds.has_index(object)
    }

    pub fn held(&self) -> Vec<ObjectReference> {
        self.holds.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::constants::{BYTES_IN_GRAIN, HEAP_START};

    fn obj(i: usize) -> ObjectReference {
        ObjectReference::from_word(HEAP_START + i * 4 * BYTES_IN_GRAIN).unwrap()
    }

    #[test]
    fn remove_checks_top_first() {
        let mut stack = SaveStack::new(4);
        stack.push(obj(1));
        stack.push(obj(2));
        assert!(stack.remove(obj(2), false));
        assert!(!stack.remove(obj(2), false));
        assert!(!stack.remove(obj(3), true));
        // obj(1) is now on top again.
        assert!(stack.remove(obj(1), false));
        assert!(stack.is_empty());
    }

    #[test]
    fn remove_searching_whole_stack() {
        let mut stack = SaveStack::new(4);
        for i in 1..=3 {
            stack.push(obj(i));
        }
        assert!(!stack.remove(obj(1), false));
        assert!(stack.remove(obj(1), true));
        assert_eq!(stack.take_all(), vec![obj(2), obj(3)]);
    }

    #[test]
    fn full_stack_pushes_through() {
        let mut stack = SaveStack::new(3);
        for i in 1..=5 {
            stack.push(obj(i));
        }
        assert_eq!(stack.len(), 3);
        assert!(!stack.contains(obj(1)));
        assert!(!stack.contains(obj(2)));
        assert_eq!(stack.take_all(), vec![obj(3), obj(4), obj(5)]);
        assert!(stack.is_empty());
    }

    #[test]
    fn extend_keeps_entries() {
        let mut stack = SaveStack::new(2);
        stack.push(obj(1));
        stack.push(obj(2));
        stack.extend(4);
        stack.push(obj(3));
        stack.push(obj(4));
        assert_eq!(stack.capacity(), 4);
        assert_eq!(stack.take_all(), vec![obj(1), obj(2), obj(3), obj(4)]);
    }

    #[test]
    fn holds_are_counted() {
        let mut table = SaveTable::new();
        table.hold(obj(1));
        table.hold(obj(1));
        assert!(table.release(obj(1)));
        assert!(table.is_held(obj(1)));
        assert!(table.release(obj(1)));
        assert!(!table.is_held(obj(1)));
        assert!(!table.release(obj(1)));
    }
}
