use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::hash::Hash;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

struct Slots<K, V> {
    ids: HashMap<K, u32>,
    entries: Vec<(K, V)>,
}

/// A concurrent, session-owned interning table handing out dense `u32` ids.
///
/// Each key is interned once and keeps its id for the life of the table. Every entry may
/// carry a payload `V` created alongside it (for graph nodes: their points-to set). Lookups
/// of known keys only take the shared lock.
pub struct Interner<K, V = ()> {
    slots: RwLock<Slots<K, V>>,
}

impl<K, V> Default for Interner<K, V> {
    fn default() -> Self {
        Self {
            slots: RwLock::new(Slots {
                ids: HashMap::new(),
                entries: Vec::new(),
            }),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Interner<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Slots<K, V>> {
        self.slots.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Slots<K, V>> {
        self.slots.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Intern `key`, building its payload with `make` if it is new. Returns the id and whether
    /// this call created it.
    pub fn intern_with<F: FnOnce() -> V>(&self, key: K, make: F) -> (u32, bool) {
        if let Some(id) = self.read().ids.get(&key) {
            return (*id, false);
        }
        let mut slots = self.write();
        if let Some(id) = slots.ids.get(&key) {
            return (*id, false);
        }
        let id = slots.entries.len() as u32;
        slots.ids.insert(key.clone(), id);
        slots.entries.push((key, make()));
        (id, true)
    }

    pub fn lookup(&self, key: &K) -> Option<u32> {
        self.read().ids.get(key).copied()
    }

    /// The key interned under `id`. Ids are only minted by this table, so an unknown id is a
    /// caller bug.
    pub fn key(&self, id: u32) -> K {
        self.read().entries[id as usize].0.clone()
    }

    pub fn payload(&self, id: u32) -> V {
        self.read().entries[id as usize].1.clone()
    }

    pub fn entry(&self, id: u32) -> (K, V) {
        self.read().entries[id as usize].clone()
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A copy of every entry in id order.
    pub fn entries(&self) -> Vec<(K, V)> {
        self.read().entries.clone()
    }
}

impl<K: Eq + Hash + Clone> Interner<K, ()> {
    pub fn intern(&self, key: K) -> (u32, bool) {
        self.intern_with(key, || ())
    }
}

impl<K, V> Debug for Interner<K, V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let len = self
            .slots
            .read()
            .map(|s| s.entries.len())
            .unwrap_or_default();
        f.debug_struct("Interner").field("len", &len).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn test_ids_are_dense_and_stable() {
        let interner: Interner<String> = Interner::new();
        assert_eq!(interner.intern("a".to_string()), (0, true));
        assert_eq!(interner.intern("b".to_string()), (1, true));
        assert_eq!(interner.intern("a".to_string()), (0, false));
        assert_eq!(interner.key(1), "b");
        assert_eq!(interner.lookup(&"c".to_string()), None);
    }

    #[test]
    fn test_concurrent_interning() {
        let interner: Interner<u64, u64> = Interner::new();
        let created: usize = (0..8u64)
            .into_par_iter()
            .map(|_| {
                (0..500u64)
                    .filter(|k| interner.intern_with(*k, || k * 2).1)
                    .count()
            })
            .sum();
        assert_eq!(created, 500);
        for (k, v) in interner.entries() {
            assert_eq!(v, k * 2);
        }
    }
}
