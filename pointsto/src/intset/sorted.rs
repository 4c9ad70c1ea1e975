use crate::intset::IntSet;
use sorted_vec::SortedSet;
use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};

/// An immutable-by-default, ascending set of integers.
///
/// Used for snapshots of concurrent sets and for the per-node contents of a
/// [`GraphDelta`](crate::graph::GraphDelta).
#[derive(Clone)]
pub struct SortedIntSet(SortedSet<u32>);

impl SortedIntSet {
    pub fn new() -> Self {
        Self(SortedSet::new())
    }

    pub fn singleton(i: u32) -> Self {
        Self(SortedSet::from_unsorted(vec![i]))
    }

    pub fn from_unsorted(v: Vec<u32>) -> Self {
        Self(SortedSet::from_unsorted(v))
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }

    pub fn as_slice(&self) -> &[u32] {
        self.0.as_slice()
    }

    /// Linear merge of two ascending sequences.
    pub fn union(&self, other: &SortedIntSet) -> SortedIntSet {
        let (a, b) = (self.as_slice(), other.as_slice());
        if b.is_empty() {
            return self.clone();
        }
        if a.is_empty() {
            return other.clone();
        }
        let mut out = Vec::with_capacity(a.len() + b.len());
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            match a[i].cmp(&b[j]) {
                std::cmp::Ordering::Less => {
                    out.push(a[i]);
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    out.push(b[j]);
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    out.push(a[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        out.extend_from_slice(&a[i..]);
        out.extend_from_slice(&b[j..]);
        // already sorted and deduplicated; from_unsorted is linear on sorted input
        Self(SortedSet::from_unsorted(out))
    }

    pub fn insert(&mut self, i: u32) -> bool {
        if self.contains(i) {
            return false;
        }
        *self = self.union(&SortedIntSet::singleton(i));
        true
    }

    pub fn is_subset(&self, other: &SortedIntSet) -> bool {
        self.len() <= other.len() && self.iter().all(|i| other.contains(i))
    }

    /// Elements of `self` that `keep` accepts.
    pub fn filter<F: FnMut(u32) -> bool>(&self, mut keep: F) -> SortedIntSet {
        self.iter().filter(|i| keep(*i)).collect()
    }
}

impl Default for SortedIntSet {
    fn default() -> Self {
        Self::new()
    }
}

impl IntSet for SortedIntSet {
    fn contains(&self, i: u32) -> bool {
        self.as_slice().binary_search(&i).is_ok()
    }

    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn max(&self) -> Option<u32> {
        self.as_slice().last().copied()
    }

    fn snapshot(&self) -> SortedIntSet {
        self.clone()
    }
}

impl FromIterator<u32> for SortedIntSet {
    fn from_iter<T: IntoIterator<Item = u32>>(iter: T) -> Self {
        Self::from_unsorted(iter.into_iter().collect())
    }
}

impl PartialEq for SortedIntSet {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for SortedIntSet {}

impl Hash for SortedIntSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_slice().hash(state)
    }
}

impl Debug for SortedIntSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_and_subset() {
        let a = SortedIntSet::from_unsorted(vec![5, 1, 3, 3]);
        let b = SortedIntSet::from_unsorted(vec![2, 3, 9]);
        assert_eq!(a.len(), 3);
        let u = a.union(&b);
        assert_eq!(u.iter().collect::<Vec<_>>(), vec![1, 2, 3, 5, 9]);
        assert!(a.is_subset(&u));
        assert!(!u.is_subset(&a));
        assert_eq!(u.max(), Some(9));
    }

    #[test]
    fn test_insert() {
        let mut s = SortedIntSet::new();
        assert!(s.insert(4));
        assert!(s.insert(2));
        assert!(!s.insert(4));
        assert_eq!(s.iter().collect::<Vec<_>>(), vec![2, 4]);
    }
}
