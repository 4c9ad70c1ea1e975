use crate::intset::{IntSet, MutableIntSet, SortedIntSet};
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard};

const BITS_PER_WORD: usize = 64;

/// A grow-only bit set safe for concurrent insertion.
///
/// Bits inside the allocated words are set with a single `fetch_or` under the shared lock;
/// only growing the word vector takes the exclusive lock. Best suited to small, dense key
/// ranges such as method or object ids.
pub struct ConcurrentBitVectorIntSet {
    words: RwLock<Vec<AtomicU64>>,
    len: AtomicUsize,
    upper: AtomicU64,
}

impl Default for ConcurrentBitVectorIntSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ConcurrentBitVectorIntSet {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Pre-size the set so keys below `bits` never trigger a resize.
    pub fn with_capacity(bits: usize) -> Self {
        let words = bits.div_ceil(BITS_PER_WORD);
        Self {
            words: RwLock::new((0..words).map(|_| AtomicU64::new(0)).collect()),
            len: AtomicUsize::new(0),
            upper: AtomicU64::new(0),
        }
    }

    #[inline]
    fn word_and_mask(i: u32) -> (usize, u64) {
        let i = i as usize;
        (i / BITS_PER_WORD, 1u64 << (i % BITS_PER_WORD))
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<AtomicU64>> {
        self.words.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl IntSet for ConcurrentBitVectorIntSet {
    fn contains(&self, i: u32) -> bool {
        let (word, mask) = Self::word_and_mask(i);
        self.read()
            .get(word)
            .is_some_and(|w| w.load(Ordering::Acquire) & mask != 0)
    }

    fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    fn max(&self) -> Option<u32> {
        match self.upper.load(Ordering::Acquire) {
            0 => None,
            u => Some((u - 1) as u32),
        }
    }

    fn snapshot(&self) -> SortedIntSet {
        let words = self.read();
        let mut out = Vec::with_capacity(self.len());
        for (idx, word) in words.iter().enumerate() {
            let mut bits = word.load(Ordering::Acquire);
            while bits != 0 {
                let bit = bits.trailing_zeros() as usize;
                out.push((idx * BITS_PER_WORD + bit) as u32);
                bits &= bits - 1;
            }
        }
        SortedIntSet::from_unsorted(out)
    }
}

impl MutableIntSet for ConcurrentBitVectorIntSet {
    fn add(&self, i: u32) -> bool {
        let (word, mask) = Self::word_and_mask(i);
        loop {
            {
                let words = self.read();
                if let Some(w) = words.get(word) {
                    let prev = w.fetch_or(mask, Ordering::AcqRel);
                    if prev & mask != 0 {
                        return false;
                    }
                    self.len.fetch_add(1, Ordering::AcqRel);
                    self.upper.fetch_max(i as u64 + 1, Ordering::AcqRel);
                    return true;
                }
            }
            let mut words = self.words.write().unwrap_or_else(|e| e.into_inner());
            if word >= words.len() {
                let target = (word + 1).max(words.len() * 2);
                words.resize_with(target, || AtomicU64::new(0));
            }
        }
    }
}

impl Debug for ConcurrentBitVectorIntSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.snapshot().iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits() {
        let set = ConcurrentBitVectorIntSet::with_capacity(10);
        assert!(set.add(0));
        assert!(set.add(63));
        assert!(set.add(64));
        assert!(set.add(1000));
        assert!(!set.add(63));
        assert!(set.contains(1000));
        assert!(!set.contains(999));
        assert!(!set.contains(100_000));
        assert_eq!(set.len(), 4);
        assert_eq!(set.max(), Some(1000));
        assert_eq!(
            set.snapshot().iter().collect::<Vec<_>>(),
            vec![0, 63, 64, 1000]
        );
    }
}
