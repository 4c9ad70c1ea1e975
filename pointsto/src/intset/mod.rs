//! Integer sets backing points-to sets, subscriber indices and other large, grow-only
//! collections.
//!
//! The concurrent variants only ever grow: there is no `remove`. Once [`MutableIntSet::add`]
//! returns `true` on any thread, every later [`IntSet::contains`] on any thread observes the
//! element, and every snapshot taken afterwards includes it.

mod bitvector;
mod monotonic;
mod sorted;

pub use bitvector::ConcurrentBitVectorIntSet;
pub use monotonic::ConcurrentMonotonicIntSet;
pub use sorted::SortedIntSet;

use serde::{Deserialize, Serialize};

/// Read access shared by every integer set.
pub trait IntSet {
    fn contains(&self, i: u32) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The largest element, if any.
    fn max(&self) -> Option<u32>;

    /// The elements in ascending order. For concurrent sets this contains at least every
    /// element whose `add` completed before the call, and possibly some added during it.
    fn snapshot(&self) -> SortedIntSet;
}

/// Thread-safe, grow-only insertion.
pub trait MutableIntSet: IntSet + Send + Sync {
    /// Insert `i`, returning `true` iff it was not already present.
    fn add(&self, i: u32) -> bool;

    /// Insert every element of `other`, returning the ones that were new.
    fn add_all<S: IntSet + ?Sized>(&self, other: &S) -> SortedIntSet
    where
        Self: Sized,
    {
        other
            .snapshot()
            .iter()
            .filter(|i| self.add(*i))
            .collect()
    }
}

/// Which concurrent representation backs a points-to set.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntSetKind {
    /// [`ConcurrentMonotonicIntSet`]: memory proportional to the number of elements
    #[default]
    Hashed,
    /// [`ConcurrentBitVectorIntSet`]: memory proportional to the largest element
    BitVector,
}

/// A concurrent set whose representation was picked at runtime.
#[derive(Debug)]
pub enum SharedIntSet {
    Hashed(ConcurrentMonotonicIntSet),
    BitVector(ConcurrentBitVectorIntSet),
}

impl SharedIntSet {
    pub fn new(kind: IntSetKind) -> Self {
        match kind {
            IntSetKind::Hashed => SharedIntSet::Hashed(ConcurrentMonotonicIntSet::new()),
            IntSetKind::BitVector => SharedIntSet::BitVector(ConcurrentBitVectorIntSet::new()),
        }
    }
}

impl IntSet for SharedIntSet {
    fn contains(&self, i: u32) -> bool {
        match self {
            SharedIntSet::Hashed(s) => s.contains(i),
            SharedIntSet::BitVector(s) => s.contains(i),
        }
    }

    fn len(&self) -> usize {
        match self {
            SharedIntSet::Hashed(s) => s.len(),
            SharedIntSet::BitVector(s) => s.len(),
        }
    }

    fn max(&self) -> Option<u32> {
        match self {
            SharedIntSet::Hashed(s) => s.max(),
            SharedIntSet::BitVector(s) => s.max(),
        }
    }

    fn snapshot(&self) -> SortedIntSet {
        match self {
            SharedIntSet::Hashed(s) => s.snapshot(),
            SharedIntSet::BitVector(s) => s.snapshot(),
        }
    }
}

impl MutableIntSet for SharedIntSet {
    fn add(&self, i: u32) -> bool {
        match self {
            SharedIntSet::Hashed(s) => s.add(i),
            SharedIntSet::BitVector(s) => s.add(i),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    fn exercise_concurrent_adds<S: MutableIntSet>(set: &S) {
        // four overlapping passes over the same key range
        let added: usize = (0..4u32)
            .into_par_iter()
            .map(|pass| {
                (0..5000u32)
                    .map(|k| (k * 7 + pass * 13) % 6000)
                    .filter(|k| set.add(*k))
                    .count()
            })
            .sum();
        let mut expected: Vec<u32> = (0..4u32)
            .flat_map(|pass| (0..5000u32).map(move |k| (k * 7 + pass * 13) % 6000))
            .collect();
        expected.sort_unstable();
        expected.dedup();
        assert_eq!(added, expected.len());
        assert_eq!(set.len(), expected.len());
        assert_eq!(set.snapshot().iter().collect::<Vec<_>>(), expected);
        assert_eq!(set.max(), expected.last().copied());
        for k in &expected {
            assert!(set.contains(*k));
        }
    }

    #[test]
    fn test_concurrent_hashed() {
        exercise_concurrent_adds(&SharedIntSet::new(IntSetKind::Hashed));
    }

    #[test]
    fn test_concurrent_bit_vector() {
        exercise_concurrent_adds(&SharedIntSet::new(IntSetKind::BitVector));
    }

    #[test]
    fn test_add_all_reports_new_elements() {
        let set = ConcurrentMonotonicIntSet::new();
        set.add(3);
        let other: SortedIntSet = [1u32, 3, 5].into_iter().collect();
        let added = set.add_all(&other);
        assert_eq!(added.iter().collect::<Vec<_>>(), vec![1, 5]);
        assert!(set.add_all(&other).is_empty());
    }
}
