/// The explicit work list of an iterative depth-first traversal.
///
/// Each independent traversal starts by pushing a sentinel (`None`) and runs until the
/// sentinel is popped again, so traversals can nest without a separate counter. The stack
/// grows by doubling when a push finds it full; [`LiveStack::reset`] returns it to its
/// initial size once the traversal is over.
pub struct LiveStack<T: Copy> {
    entries: Vec<Option<T>>,
    top: usize,
    initial_size: usize,
}

impl<T: Copy> LiveStack<T> {
    pub fn new(initial_size: usize) -> Self {
        let initial_size = initial_size.max(2);
        LiveStack {
            entries: vec![None; initial_size],
            top: 0,
            initial_size,
        }
    }

    pub fn push(&mut self, entry: Option<T>) {
        self.check_room();
        self.entries[self.top] = entry;
        self.top += 1;
    }

    pub fn push_sentinel(&mut self) {
        self.push(None)
    }

    /// Pop the next entry. Returns `None` for the sentinel, and also for an empty stack.
    pub fn pop(&mut self) -> Option<T> {
        if self.top == 0 {
            return None;
        }
        self.top -= 1;
        self.entries[self.top].take()
    }

    /// Make sure one more entry fits.
    pub fn check_room(&mut self) {
        if self.top == self.entries.len() {
            self.grow_to_double();
        }
    }

    fn grow_to_double(&mut self) {
        let size = self.entries.len() * 2;
        debug!("Live stack grown to {} entries", size);
        self.entries.resize(size, None);
    }

    /// Drop every entry and shrink back to the initial size.
    pub fn reset(&mut self) {
        self.top = 0;
        self.entries.truncate(self.initial_size);
        self.entries.shrink_to(self.initial_size);
        self.entries.fill(None);
    }

    pub fn is_empty(&self) -> bool {
        self.top == 0
    }

    pub fn len(&self) -> usize {
        self.top
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Entries from the bottom of the stack to the top, sentinels included.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = Option<T>> + '_ {
        self.entries[..self.top].iter().copied()
    }
}
