use crate::intset::{IntSet, MutableIntSet, SortedIntSet};
use std::fmt::{Debug, Formatter};
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64, AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

const SEGMENT_BITS: u32 = 4;
const SEGMENTS: usize = 1 << SEGMENT_BITS;
const INITIAL_BUCKETS: usize = 4;
/// A bucket chain at least this long triggers a resize of its segment.
const RESIZE_THRESHOLD: usize = 8;

/// A list cell. `next` is written once, before the cell is published, and never again.
struct Entry {
    key: u32,
    next: *mut Entry,
}

struct Table {
    buckets: Box<[AtomicPtr<Entry>]>,
}

impl Table {
    fn with_buckets(n: usize) -> Self {
        Self {
            buckets: (0..n).map(|_| AtomicPtr::new(ptr::null_mut())).collect(),
        }
    }

    fn bucket(&self, hash: u32) -> &AtomicPtr<Entry> {
        &self.buckets[hash as usize & (self.buckets.len() - 1)]
    }
}

/// A table replaced by a resize, with the cells the resize copied instead of reusing. Both
/// stay allocated until the set is dropped, since a reader may still be walking them.
struct Retired {
    table: *mut Table,
    copied: Vec<*mut Entry>,
}

struct Segment {
    table: AtomicPtr<Table>,
    /// Shared by inserters, exclusive while resizing. Readers never take it.
    resize: RwLock<Vec<Retired>>,
}

impl Segment {
    fn new() -> Self {
        Self {
            table: AtomicPtr::new(Box::into_raw(Box::new(Table::with_buckets(INITIAL_BUCKETS)))),
            resize: RwLock::new(Vec::new()),
        }
    }

    fn current(&self) -> &Table {
        // SAFETY: published tables are only freed by `Drop`, which requires exclusive access
        unsafe { &*self.table.load(Ordering::Acquire) }
    }

    fn insert_permit(&self) -> RwLockReadGuard<'_, Vec<Retired>> {
        // a poisoned segment still holds a consistent table: every publication is one store
        self.resize.read().unwrap_or_else(|e| e.into_inner())
    }

    fn resize_permit(&self) -> RwLockWriteGuard<'_, Vec<Retired>> {
        self.resize.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn hash(key: u32) -> u32 {
    let h = key.wrapping_mul(0x9E37_79B9);
    h ^ (h >> 16)
}

fn segment_of(h: u32) -> usize {
    (h >> (32 - SEGMENT_BITS)) as usize
}

/// Walk a chain looking for `key`. Returns whether it was found and how many cells were
/// visited.
///
/// # Safety
/// `head` must have been loaded from a bucket of a table of this set.
unsafe fn scan(head: *mut Entry, key: u32) -> (bool, usize) {
    let mut cur = head;
    let mut len = 0;
    while !cur.is_null() {
        // SAFETY: cells are only freed by `Drop`, which requires exclusive access to the set
        let entry = unsafe { &*cur };
        if entry.key == key {
            return (true, len);
        }
        len += 1;
        cur = entry.next;
    }
    (false, len)
}

/// A sharded, grow-only hash set of `u32`.
///
/// Keys hash to one of sixteen segments. Each segment publishes a power-of-two array of bucket
/// chains through an atomic pointer. Cells are immutable once published. Readers load the
/// current array and walk it without taking any lock. Inserting takes the segment's shared
/// permit and splices a new cell in front of the bucket head with a compare-and-swap, so
/// inserts into one segment run concurrently with each other and with readers. The exclusive
/// permit is only taken when a chain grows past [`RESIZE_THRESHOLD`]. The resize builds a
/// doubled array that reuses the longest tail of every chain whose cells all land in the same
/// new bucket, copies the cells in front of it, and then swaps the new array in. Replaced
/// arrays and cells are freed when the set is dropped.
pub struct ConcurrentMonotonicIntSet {
    segments: Box<[Segment]>,
    len: AtomicUsize,
    /// One past the largest element, zero while empty
    upper: AtomicU64,
}

// SAFETY: the raw pointers held in `Retired` and `Entry` name heap cells owned by the set,
// which are immutable once published and freed only by `Drop`.
unsafe impl Send for ConcurrentMonotonicIntSet {}
unsafe impl Sync for ConcurrentMonotonicIntSet {}

impl Default for ConcurrentMonotonicIntSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ConcurrentMonotonicIntSet {
    pub fn new() -> Self {
        Self {
            segments: (0..SEGMENTS).map(|_| Segment::new()).collect(),
            len: AtomicUsize::new(0),
            upper: AtomicU64::new(0),
        }
    }

    /// Double the bucket array of `segment`, unless somebody else already resized it away
    /// from `observed` buckets.
    fn grow(segment: &Segment, observed: usize) {
        let mut retired = segment.resize_permit();
        let old_ptr = segment.table.load(Ordering::Acquire);
        // SAFETY: the exclusive permit keeps this the current table until we replace it
        let old = unsafe { &*old_ptr };
        if old.buckets.len() != observed {
            return;
        }
        let grown = Table::with_buckets(observed * 2);
        let mask = grown.buckets.len() - 1;
        let index = |e: *mut Entry| {
            // SAFETY: cells alive until drop
            hash(unsafe { (*e).key }) as usize & mask
        };
        let mut copied = Vec::new();
        for bucket in old.buckets.iter() {
            let head = bucket.load(Ordering::Acquire);
            if head.is_null() {
                continue;
            }
            // every cell from `last_run` on maps to `last_idx` and is shared as is
            let mut last_run = head;
            let mut last_idx = index(head);
            // SAFETY: as above
            let mut p = unsafe { (*head).next };
            while !p.is_null() {
                let idx = index(p);
                if idx != last_idx {
                    last_idx = idx;
                    last_run = p;
                }
                p = unsafe { (*p).next };
            }
            // a doubled array sends each old bucket to two new ones no other bucket uses
            grown.buckets[last_idx].store(last_run, Ordering::Relaxed);
            let mut p = head;
            while p != last_run {
                // SAFETY: as above
                let entry = unsafe { &*p };
                let slot = &grown.buckets[index(p)];
                let copy = Box::new(Entry {
                    key: entry.key,
                    next: slot.load(Ordering::Relaxed),
                });
                slot.store(Box::into_raw(copy), Ordering::Relaxed);
                copied.push(p);
                p = entry.next;
            }
        }
        segment
            .table
            .store(Box::into_raw(Box::new(grown)), Ordering::Release);
        retired.push(Retired {
            table: old_ptr,
            copied,
        });
    }

    pub fn iter(&self) -> std::vec::IntoIter<u32> {
        self.snapshot().iter().collect::<Vec<_>>().into_iter()
    }
}

impl IntSet for ConcurrentMonotonicIntSet {
    fn contains(&self, key: u32) -> bool {
        let h = hash(key);
        let head = self.segments[segment_of(h)]
            .current()
            .bucket(h)
            .load(Ordering::Acquire);
        // SAFETY: loaded from a table of this set
        unsafe { scan(head, key) }.0
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
        let mut keys = Vec::with_capacity(self.len());
        for segment in self.segments.iter() {
            for bucket in segment.current().buckets.iter() {
                let mut cur = bucket.load(Ordering::Acquire);
                while !cur.is_null() {
                    // SAFETY: cells alive until drop
                    let entry = unsafe { &*cur };
                    keys.push(entry.key);
                    cur = entry.next;
                }
            }
        }
        SortedIntSet::from_unsorted(keys)
    }
}

impl MutableIntSet for ConcurrentMonotonicIntSet {
    fn add(&self, key: u32) -> bool {
        let h = hash(key);
        let segment = &self.segments[segment_of(h)];
        let mut spare: Option<Box<Entry>> = None;
        loop {
            let permit = segment.insert_permit();
            // no resize can publish a new table while the permit is held
            let table = segment.current();
            let bucket = table.bucket(h);
            let head = bucket.load(Ordering::Acquire);
            // SAFETY: loaded from a table of this set
            let (found, chain) = unsafe { scan(head, key) };
            if found {
                return false;
            }
            if chain >= RESIZE_THRESHOLD {
                let observed = table.buckets.len();
                drop(permit);
                Self::grow(segment, observed);
                continue;
            }
            let mut entry = spare.take().unwrap_or_else(|| {
                Box::new(Entry {
                    key,
                    next: ptr::null_mut(),
                })
            });
            entry.next = head;
            let raw = Box::into_raw(entry);
            match bucket.compare_exchange(head, raw, Ordering::SeqCst, Ordering::Acquire) {
                Ok(_) => {
                    self.len.fetch_add(1, Ordering::AcqRel);
                    self.upper.fetch_max(key as u64 + 1, Ordering::AcqRel);
                    return true;
                }
                Err(_) => {
                    // SAFETY: the cell was never published
                    spare = Some(unsafe { Box::from_raw(raw) });
                }
            }
        }
    }
}

impl Drop for ConcurrentMonotonicIntSet {
    fn drop(&mut self) {
        for segment in self.segments.iter_mut() {
            // SAFETY: exclusive access; every live cell sits in exactly one chain of the
            // current table, and every other cell was recorded once as copied
            unsafe {
                let table = Box::from_raw(*segment.table.get_mut());
                for bucket in table.buckets.iter() {
                    let mut cur = bucket.load(Ordering::Relaxed);
                    while !cur.is_null() {
                        let entry = Box::from_raw(cur);
                        cur = entry.next;
                    }
                }
                let retired = segment.resize.get_mut().unwrap_or_else(|e| e.into_inner());
                for old in retired.drain(..) {
                    drop(Box::from_raw(old.table));
                    for cell in old.copied {
                        drop(Box::from_raw(cell));
                    }
                }
            }
        }
    }
}

impl Debug for ConcurrentMonotonicIntSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.snapshot().iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_contains() {
        let set = ConcurrentMonotonicIntSet::new();
        assert!(set.is_empty());
        assert_eq!(set.max(), None);
        assert!(set.add(10));
        assert!(!set.add(10));
        assert!(set.add(3));
        assert!(set.contains(10));
        assert!(set.contains(3));
        assert!(!set.contains(4));
        assert_eq!(set.len(), 2);
        assert_eq!(set.max(), Some(10));
    }

    #[test]
    fn test_resizing_keeps_every_key() {
        let set = ConcurrentMonotonicIntSet::new();
        // enough keys to force several rounds of bucket doubling in every segment
        for k in (0..20_000u32).rev() {
            assert!(set.add(k * 3));
        }
        for k in 0..20_000u32 {
            assert!(set.contains(k * 3));
            assert!(!set.contains(k * 3 + 1));
        }
        let snap = set.snapshot();
        assert_eq!(snap.len(), 20_000);
        assert!(snap.as_slice().windows(2).all(|w| w[0] < w[1]));
        assert_eq!(set.iter().next(), Some(0));
    }

    #[test]
    fn test_contains_observed_across_threads() {
        let set = ConcurrentMonotonicIntSet::new();
        std::thread::scope(|s| {
            for t in 0..4u32 {
                let set = &set;
                s.spawn(move || {
                    for k in 0..2000u32 {
                        if set.add(k * 4 + t) {
                            assert!(set.contains(k * 4 + t));
                        }
                    }
                });
            }
        });
        assert_eq!(set.len(), 8000);
    }

    #[test]
    fn test_readers_see_every_earlier_key_during_resizes() {
        let set = ConcurrentMonotonicIntSet::new();
        let written = AtomicUsize::new(0);
        std::thread::scope(|s| {
            let (set, written) = (&set, &written);
            s.spawn(move || {
                // enough keys to resize every segment several times while the readers run
                for k in 0..30_000u32 {
                    set.add(k << 8);
                    written.store(k as usize + 1, Ordering::Release);
                }
            });
            for _ in 0..3 {
                s.spawn(move || {
                    loop {
                        let done = written.load(Ordering::Acquire);
                        let snap = set.snapshot();
                        assert!(snap.len() >= done);
                        for k in 0..done as u32 {
                            assert!(set.contains(k << 8));
                        }
                        if done == 30_000 {
                            break;
                        }
                    }
                });
            }
        });
        assert_eq!(set.len(), 30_000);
    }
}
