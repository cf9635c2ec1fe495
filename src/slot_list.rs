//! Thread-safe slot chain with expiration.
//!
//! One `SlotList` is one shard of [`crate::map::ExpiringMap`], and also a
//! usable container on its own when keys are already 64-bit fingerprints.
//! Entries live in a doubly-linked chain of fixed-width [slots](crate::slot)
//! guarded by a reader-writer lock; insertion always targets the head slot,
//! and a slot whose last entry is removed is unlinked immediately, so
//! traversal cost follows the live population rather than the historical
//! peak.
//!
//! Duplicate keys are allowed. Callers disambiguate and observe values
//! through predicates invoked under the lock; references must not be kept
//! past the call. Lookup may refresh the entry's access time while holding
//! only the shared lock; the access time is an atomic whose exact value
//! only influences when an entry expires.

use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use lock_api::RawRwLock;

use crate::clock;
use crate::rwlock::RawRwSpinLock;
use crate::slot::Slot;

struct Chain<V> {
    head: *mut Slot<V>,
}

unsafe impl<V: Send> Send for Chain<V> {}
unsafe impl<V: Send + Sync> Sync for Chain<V> {}

impl<V> Chain<V> {
    const fn new() -> Self {
        Self {
            head: ptr::null_mut(),
        }
    }

    fn push_front(&mut self) -> &mut Slot<V> {
        let mut slot = Box::new(Slot::new());
        slot.next = self.head;
        let raw = Box::into_raw(slot);
        if !self.head.is_null() {
            unsafe { (*self.head).prev = raw };
        }
        self.head = raw;
        unsafe { &mut *raw }
    }

    /// Detach `slot` from the chain and reclaim it.
    ///
    /// `slot` must be a live chain member allocated by [`push_front`](Self::push_front).
    unsafe fn unlink(&mut self, slot: *mut Slot<V>) -> Box<Slot<V>> {
        let s = &mut *slot;
        if !s.next.is_null() {
            (*s.next).prev = s.prev;
        }
        if !s.prev.is_null() {
            (*s.prev).next = s.next;
        }
        if self.head == slot {
            self.head = s.next;
        }
        Box::from_raw(slot)
    }

    fn insert(&mut self, key: u64, value: V, life_time: u32, now: u32) {
        if !self.head.is_null() {
            let head = unsafe { &mut *self.head };
            if !head.is_full() {
                head.add(key, value, life_time, now);
                return;
            }
        }
        self.push_front().add(key, value, life_time, now);
    }

    fn find<F>(&self, key: u64, extend: bool, now: u32, pred: &mut F) -> bool
    where
        F: FnMut(&V) -> bool,
    {
        let mut cur = self.head;
        while !cur.is_null() {
            let slot = unsafe { &*cur };
            if slot.find(key, extend, now, pred) {
                return true;
            }
            cur = slot.next;
        }
        false
    }

    fn find_mut<F>(&mut self, key: u64, extend: bool, now: u32, pred: &mut F) -> bool
    where
        F: FnMut(&mut V) -> bool,
    {
        let mut cur = self.head;
        while !cur.is_null() {
            let slot = unsafe { &mut *cur };
            if slot.find_mut(key, extend, now, pred) {
                return true;
            }
            cur = slot.next;
        }
        false
    }

    fn remove<F>(&mut self, key: u64, pred: &mut F) -> bool
    where
        F: FnMut(&V) -> bool,
    {
        let mut cur = self.head;
        while !cur.is_null() {
            let slot = unsafe { &mut *cur };
            if slot.remove(key, pred) {
                if slot.is_empty() {
                    drop(unsafe { self.unlink(cur) });
                }
                return true;
            }
            cur = slot.next;
        }
        false
    }

    fn expire<F>(&mut self, ctime: u32, pred: &mut F) -> usize
    where
        F: FnMut(&V) -> bool,
    {
        let mut evicted = 0;
        let mut cur = self.head;
        while !cur.is_null() {
            let slot = unsafe { &mut *cur };
            evicted += slot.expire_check(ctime, pred);
            let next = slot.next;
            if slot.is_empty() {
                drop(unsafe { self.unlink(cur) });
            }
            cur = next;
        }
        evicted
    }

    fn for_each<F>(&self, func: &mut F) -> usize
    where
        F: FnMut(&V),
    {
        let mut visited = 0;
        let mut cur = self.head;
        while !cur.is_null() {
            let slot = unsafe { &*cur };
            visited += slot.for_each(func);
            cur = slot.next;
        }
        visited
    }

    fn flush<F>(&mut self, func: &mut F)
    where
        F: FnMut(&mut V),
    {
        let mut cur = self.head;
        self.head = ptr::null_mut();
        while !cur.is_null() {
            let mut slot = unsafe { Box::from_raw(cur) };
            cur = slot.next;
            slot.drain(func);
        }
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        let mut slots = 0;
        let mut cur = self.head;
        while !cur.is_null() {
            slots += 1;
            cur = unsafe { (*cur).next };
        }
        slots
    }

    #[cfg(test)]
    fn occupied(&self) -> usize {
        let mut entries = 0;
        let mut cur = self.head;
        while !cur.is_null() {
            let slot = unsafe { &*cur };
            entries += slot.len();
            cur = slot.next;
        }
        entries
    }
}

impl<V> Drop for Chain<V> {
    fn drop(&mut self) {
        let mut cur = self.head;
        self.head = ptr::null_mut();
        while !cur.is_null() {
            let slot = unsafe { Box::from_raw(cur) };
            cur = slot.next;
        }
    }
}

/// A slot chain with per-entry TTL, keyed by 64-bit fingerprints.
///
/// `R` selects the lock implementation; the default is the crate's
/// strong-writer [`RawRwSpinLock`].
pub struct SlotList<V, R: RawRwLock = RawRwSpinLock> {
    chain: lock_api::RwLock<R, Chain<V>>,
    count: AtomicUsize,
    extend_on_access: bool,
}

impl<V> SlotList<V> {
    /// Create an empty list with the crate's strong-writer spinlock.
    ///
    /// With `extend_on_access` set, every successful lookup refreshes the
    /// entry's access time, so TTL is measured since last access rather
    /// than since insertion.
    #[must_use]
    pub const fn new(extend_on_access: bool) -> Self {
        Self::with_lock(extend_on_access)
    }
}

impl<V, R: RawRwLock> SlotList<V, R> {
    /// Create an empty list guarded by lock implementation `R`.
    #[must_use]
    pub const fn with_lock(extend_on_access: bool) -> Self {
        Self {
            chain: lock_api::RwLock::new(Chain::new()),
            count: AtomicUsize::new(0),
            extend_on_access,
        }
    }

    /// Insert an entry with a lifetime of `life_time` seconds.
    ///
    /// Duplicates are permitted; this never fails short of allocation
    /// failure.
    pub fn add(&self, key: u64, value: V, life_time: u32) -> bool {
        let now = clock::seconds() as u32;
        let mut chain = self.chain.write();
        chain.insert(key, value, life_time, now);
        self.count.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Remove the first entry with this key.
    pub fn remove(&self, key: u64) -> bool {
        self.remove_if(key, |_| true)
    }

    /// Remove the first entry with this key accepted by the predicate.
    ///
    /// The predicate returning `false` skips the candidate.
    pub fn remove_if<F>(&self, key: u64, mut pred: F) -> bool
    where
        F: FnMut(&V) -> bool,
    {
        let mut chain = self.chain.write();
        if chain.remove(key, &mut pred) {
            self.count.fetch_sub(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Check for an entry with this key, under the shared lock.
    pub fn contains(&self, key: u64) -> bool {
        self.find(key, |_| true)
    }

    /// Look up an entry under the shared lock, observing the value
    /// read-only through the predicate.
    pub fn find<F>(&self, key: u64, mut pred: F) -> bool
    where
        F: FnMut(&V) -> bool,
    {
        let now = clock::seconds() as u32;
        let chain = self.chain.read();
        chain.find(key, self.extend_on_access, now, &mut pred)
    }

    /// Look up an entry under the exclusive lock, giving the predicate
    /// mutable access to the value.
    pub fn find_mut<F>(&self, key: u64, mut pred: F) -> bool
    where
        F: FnMut(&mut V) -> bool,
    {
        let now = clock::seconds() as u32;
        let mut chain = self.chain.write();
        chain.find_mut(key, self.extend_on_access, now, &mut pred)
    }

    /// Visit every live entry under the shared lock; returns the number
    /// visited.
    pub fn for_each<F>(&self, mut func: F) -> usize
    where
        F: FnMut(&V),
    {
        let chain = self.chain.read();
        chain.for_each(&mut func)
    }

    /// Evict expired entries as of `ctime` (0 means "read the coarse
    /// clock"); returns the eviction count.
    ///
    /// Sweeping is low priority: if the lock is contended this returns 0
    /// without blocking.
    pub fn expire_check(&self, ctime: u32) -> usize {
        self.expire_check_if(ctime, |_| true)
    }

    /// Like [`expire_check`](Self::expire_check); the predicate returning
    /// `false` keeps the entry alive.
    pub fn expire_check_if<F>(&self, ctime: u32, mut pred: F) -> usize
    where
        F: FnMut(&V) -> bool,
    {
        let Some(mut chain) = self.chain.try_write() else {
            return 0;
        };

        let ctime = if ctime == 0 {
            clock::seconds() as u32
        } else {
            ctime
        };

        let evicted = chain.expire(ctime, &mut pred);
        if evicted > 0 {
            self.count.fetch_sub(evicted, Ordering::Relaxed);
        }
        evicted
    }

    /// Drop every entry and slot.
    pub fn flush(&self) {
        self.flush_with(|_| {});
    }

    /// Drain every entry through `func`, then drop it.
    pub fn flush_with<F>(&self, mut func: F)
    where
        F: FnMut(&mut V),
    {
        let mut chain = self.chain.write();
        chain.flush(&mut func);
        self.count.store(0, Ordering::Relaxed);
    }

    /// Allocate the first slot up front so the first insertion skips it.
    pub fn pre_load(&self) {
        let mut chain = self.chain.write();
        if chain.head.is_null() {
            chain.push_front();
        }
    }

    /// Last-published entry count; may be stale during concurrent
    /// mutation.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    /// Whether the list currently publishes a count of zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub(crate) fn slot_count(&self) -> usize {
        self.chain.read().slot_count()
    }

    #[cfg(test)]
    pub(crate) fn occupied(&self) -> usize {
        self.chain.read().occupied()
    }
}

impl<V, R: RawRwLock> Default for SlotList<V, R> {
    fn default() -> Self {
        Self::with_lock(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::SLOT_CAPACITY;
    use std::sync::Arc;
    use std::thread;

    #[derive(Clone)]
    struct TestObject {
        p1: u64,
        p2: String,
    }

    fn obj(i: u64) -> TestObject {
        TestObject {
            p1: i,
            p2: "hello".to_string(),
        }
    }

    fn fill(list: &SlotList<TestObject>, count: u64) {
        for i in 0..count {
            assert!(list.add(i, obj(i), 10));
        }
    }

    #[test]
    fn test_add_find_remove() {
        let list = SlotList::new(true);
        fill(&list, 100);

        for i in 0..100 {
            assert!(list.find(i, |o| o.p1 == i));
            assert!(list.find_mut(i, |_| true));
        }
        assert_eq!(list.len(), 100);
        assert_eq!(list.for_each(|_| {}), 100);

        for i in 0..100 {
            assert!(list.remove(i));
        }
        assert_eq!(list.len(), 0);

        for i in 0..100 {
            assert!(!list.remove(i));
        }
    }

    #[test]
    fn test_selective_remove() {
        let list = SlotList::new(true);
        fill(&list, 100);

        assert!(list.remove(10));
        assert!(list.remove(40));
        assert!(list.remove(50));
        assert!(!list.contains(50));
        assert_eq!(list.len(), 97);
        assert_eq!(list.for_each(|_| {}), 97);

        list.flush();
        assert_eq!(list.len(), 0);
        assert_eq!(list.for_each(|_| {}), 0);
    }

    #[test]
    fn test_remove_range_spanning_slots() {
        let list = SlotList::new(true);
        fill(&list, 100);

        for i in 16..32 {
            assert!(list.remove(i));
        }
        assert_eq!(list.for_each(|_| {}), 84);
    }

    #[test]
    fn test_expire_check() {
        let list = SlotList::new(true);
        fill(&list, 100);

        let now = clock::seconds() as u32;
        assert_eq!(list.expire_check(now + 11), 100);
        assert_eq!(list.len(), 0);
        assert_eq!(list.for_each(|_| {}), 0);
    }

    #[test]
    fn test_expire_keeps_fresh_entries() {
        let list = SlotList::new(true);

        list.add(1, obj(1), 5);
        list.add(2, obj(2), 1000);

        let now = clock::seconds() as u32;
        assert_eq!(list.expire_check(now + 11), 1);
        assert!(!list.contains(1));
        assert!(list.contains(2));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_expire_predicate_keeps() {
        let list = SlotList::new(true);
        fill(&list, 10);

        let now = clock::seconds() as u32;
        // Keep even p1, evict odd.
        assert_eq!(list.expire_check_if(now + 11, |o| o.p1 % 2 == 1), 5);
        assert_eq!(list.len(), 5);
        assert!(list.contains(0));
        assert!(!list.contains(1));
    }

    #[test]
    fn test_duplicate_keys() {
        let list = SlotList::new(true);

        list.add(7, obj(1), 10);
        list.add(7, obj(2), 10);

        assert!(list.find(7, |o| o.p1 == 1));
        assert!(list.find(7, |o| o.p1 == 2));
        assert!(list.remove_if(7, |o| o.p1 == 2));
        assert!(!list.find(7, |o| o.p1 == 2));
        assert!(list.find(7, |o| o.p1 == 1));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_find_mut_updates_value() {
        let list = SlotList::new(true);
        list.add(1, obj(1), 10);

        assert!(list.find_mut(1, |o| {
            o.p2 = "changed".to_string();
            true
        }));
        assert!(list.find(1, |o| o.p2 == "changed"));
    }

    #[test]
    fn test_empty_slot_unlinked() {
        let list = SlotList::new(true);
        fill(&list, 100);
        assert_eq!(list.slot_count(), 2);

        // Entries past the first 64 live in the prepended head slot.
        for i in SLOT_CAPACITY as u64..100 {
            assert!(list.remove(i));
        }
        assert_eq!(list.slot_count(), 1);
        assert!(list.contains(5));
    }

    #[test]
    fn test_pre_load() {
        let list: SlotList<TestObject> = SlotList::new(true);
        assert_eq!(list.slot_count(), 0);

        list.pre_load();
        assert_eq!(list.slot_count(), 1);
        list.pre_load();
        assert_eq!(list.slot_count(), 1);

        list.add(1, obj(1), 10);
        assert_eq!(list.slot_count(), 1);
    }

    #[test]
    fn test_count_matches_occupancy() {
        let list = SlotList::new(true);
        fill(&list, 200);
        for i in (0..200).step_by(3) {
            list.remove(i);
        }
        assert_eq!(list.len(), list.occupied());
    }

    #[test]
    fn test_flush_with_drains_values() {
        let list = SlotList::new(true);
        fill(&list, 50);

        let mut drained = 0;
        list.flush_with(|_| drained += 1);
        assert_eq!(drained, 50);
        assert_eq!(list.len(), 0);

        // Idempotent.
        list.flush();
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn test_concurrent_adders() {
        let list = Arc::new(SlotList::new(true));
        let mut threads = Vec::new();

        for t in 0..4u64 {
            let list = Arc::clone(&list);
            threads.push(thread::spawn(move || {
                for i in 0..5000 {
                    list.add(t * 5000 + i, obj(i), 10);
                }
            }));
        }
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(list.len(), 20_000);
        for key in 0..20_000 {
            assert!(list.contains(key));
        }
    }
}
