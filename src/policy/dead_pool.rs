use std::collections::BTreeMap;

use crate::util::Address;

/// The free chains of one segment set: dead blocks grouped by exact size.
///
/// Lookup is best fit: the smallest block at least as large as the request. Blocks of the
/// same size are handed out most recently freed first.
#[derive(Default, Debug)]
pub struct DeadObjectPool {
    chains: BTreeMap<usize, Vec<Address>>,
    free_bytes: usize,
    blocks: usize,
}

impl DeadObjectPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dead block. Its header must already describe it as dead.
    pub fn add(&mut self, start: Address, size: usize) {
        self.chains.entry(size).or_default().push(start);
        self.free_bytes += size;
        self.blocks += 1;
    }

    /// Remove the smallest block of at least `size` bytes.
    pub fn take(&mut self, size: usize) -> Option<(Address, usize)> {
        let (&block_size, chain) = self.chains.range_mut(size..).next()?;
        let start = chain.pop()?;
        if chain.is_empty() {
            self.chains.remove(&block_size);
        }
        self.free_bytes -= block_size;
        self.blocks -= 1;
        Some((start, block_size))
    }

    /// Remove a specific block. Returns false if it is not in the pool.
    pub fn remove(&mut self, start: Address, size: usize) -> bool {
        let Some(chain) = self.chains.get_mut(&size) else {
            return false;
        };
        let Some(index) = chain.iter().position(|a| *a == start) else {
            return false;
        };
        chain.swap_remove(index);
        if chain.is_empty() {
            self.chains.remove(&size);
        }
        self.free_bytes -= size;
        self.blocks -= 1;
        true
    }

    pub fn clear(&mut self) {
        self.chains.clear();
        self.free_bytes = 0;
        self.blocks = 0;
    }

    pub fn free_bytes(&self) -> usize {
        self.free_bytes
    }

    pub fn blocks(&self) -> usize {
        self.blocks
    }

    pub fn largest_block(&self) -> Option<usize> {
        self.chains.keys().next_back().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: usize) -> Address {
        Address::from_usize(0x1000_0000 + n * 8)
    }

    #[test]
    fn best_fit() {
        let mut pool = DeadObjectPool::new();
        pool.add(addr(0), 64);
        pool.add(addr(100), 32);
        pool.add(addr(200), 256);
        assert_eq!(pool.take(40), Some((addr(0), 64)));
        assert_eq!(pool.take(24), Some((addr(100), 32)));
        assert_eq!(pool.take(300), None);
        assert_eq!(pool.free_bytes(), 256);
        assert_eq!(pool.largest_block(), Some(256));
    }

    #[test]
    fn remove_specific_block() {
        let mut pool = DeadObjectPool::new();
        pool.add(addr(0), 64);
        pool.add(addr(50), 64);
        assert!(pool.remove(addr(0), 64));
        assert!(!pool.remove(addr(0), 64));
        assert_eq!(pool.blocks(), 1);
        assert_eq!(pool.take(64), Some((addr(50), 64)));
        assert_eq!(pool.free_bytes(), 0);
    }
}
