//! Sharded map with per-entry TTL.
//!
//! [`ExpiringMap`] hashes each key to a 64-bit fingerprint and forwards the
//! operation to one of a large array of independently locked
//! [`SlotList`] shards. With short per-shard critical sections and far more
//! shards than concurrently active operations, lock contention drops to
//! noise; the price is one lock object per shard, paid up front.
//!
//! Expired entries are reclaimed incrementally: every call to
//! [`ExpiringMap::expire_check`] sweeps exactly one shard, chosen by a
//! rolling cursor, and never blocks. Any driver works: a timer thread, a
//! request handler doing piggy-back work via
//! [`ExpiringMap::add_and_check`], or a test cycling the cursor. The
//! reclamation cost spreads across callers instead of a dedicated sweeper
//! stopping the world.

use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};

use lock_api::RawRwLock;

use crate::clock;
use crate::hash::BuildFastHasher;
use crate::rwlock::RawRwSpinLock;
use crate::slot_list::SlotList;

/// Construction parameters for [`ExpiringMap`].
#[derive(Clone, Debug)]
pub struct MapConfig {
    /// Number of shards. More shards mean less contention and more memory;
    /// must be non-zero.
    pub shards: u32,
    /// Measure TTL from the last successful lookup instead of insertion.
    pub extend_on_access: bool,
    /// Allocate one empty slot per shard up front, trading memory for
    /// insertion speed.
    pub preload: bool,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            shards: 256_000,
            extend_on_access: true,
            preload: true,
        }
    }
}

/// A sharded, thread-safe, in-memory map with per-entry TTL.
///
/// Designed for workloads where insertions, lookups and deletions vastly
/// outnumber reads of the entries themselves: session stores, rate-limit
/// counters, negative DNS caches. Values are never returned; callers
/// observe them through predicates invoked under the shard lock (see the
/// find and remove families), which keeps lock scopes tight and prevents
/// references from escaping.
///
/// `S` picks the hasher, `R` the per-shard lock. The defaults are the
/// crate's fasthash adapter and strong-writer spinlock;
/// `parking_lot::RawRwLock` is the supported OS-assisted alternative.
pub struct ExpiringMap<K, V, S = BuildFastHasher, R = RawRwSpinLock>
where
    R: RawRwLock,
{
    shards: Box<[SlotList<V, R>]>,
    cursor: AtomicUsize,
    count: AtomicUsize,
    hash_builder: S,
    _key: PhantomData<fn(K)>,
}

/// [`ExpiringMap`] backed by the OS-assisted `parking_lot` lock instead of
/// the crate's spinlock.
pub type OsExpiringMap<K, V> = ExpiringMap<K, V, BuildFastHasher, parking_lot::RawRwLock>;

impl<K, V> ExpiringMap<K, V> {
    /// Create a map with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MapConfig::default())
    }
}

impl<K, V> Default for ExpiringMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S, R> ExpiringMap<K, V, S, R>
where
    S: BuildHasher + Default,
    R: RawRwLock,
{
    /// Create a map from `config` with a default-constructed hasher.
    ///
    /// # Panics
    ///
    /// Panics if `config.shards` is zero.
    #[must_use]
    pub fn with_config(config: MapConfig) -> Self {
        Self::with_hasher(config, S::default())
    }
}

impl<K, V, S, R> ExpiringMap<K, V, S, R>
where
    S: BuildHasher,
    R: RawRwLock,
{
    /// Create a map from `config` with an explicit hasher.
    ///
    /// # Panics
    ///
    /// Panics if `config.shards` is zero.
    #[must_use]
    pub fn with_hasher(config: MapConfig, hash_builder: S) -> Self {
        assert!(config.shards > 0, "shard count must be non-zero");

        // Warm the timer.
        clock::seconds();

        let shards: Vec<SlotList<V, R>> = (0..config.shards)
            .map(|_| SlotList::with_lock(config.extend_on_access))
            .collect();
        if config.preload {
            for shard in &shards {
                shard.pre_load();
            }
        }
        log::debug!(
            "expiring map created: shards={} extend_on_access={} preload={}",
            config.shards,
            config.extend_on_access,
            config.preload
        );

        Self {
            shards: shards.into_boxed_slice(),
            cursor: AtomicUsize::new(0),
            count: AtomicUsize::new(0),
            hash_builder,
            _key: PhantomData,
        }
    }

    /// Number of shards.
    #[must_use]
    pub fn shard_count(&self) -> u32 {
        self.shards.len() as u32
    }

    /// Total entry count; eventually consistent under concurrent mutation.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    /// Whether the map currently publishes a count of zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evict expired entries from the shard under the sweep cursor,
    /// advancing the cursor; `now == 0` reads the coarse clock.
    ///
    /// Non-blocking: returns 0 when the shard's lock is contended. Call
    /// repeatedly to spread reclamation over the whole map.
    pub fn expire_check(&self, now: u32) -> usize {
        self.expire_check_if(now, |_| true)
    }

    /// Like [`expire_check`](Self::expire_check); the predicate returning
    /// `false` keeps the entry alive.
    pub fn expire_check_if<F>(&self, now: u32, pred: F) -> usize
    where
        F: FnMut(&V) -> bool,
    {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.shards.len();
        let now = if now == 0 {
            clock::seconds() as u32
        } else {
            now
        };

        let evicted = self.shards[index].expire_check_if(now, pred);
        if evicted > 0 {
            self.count.fetch_sub(evicted, Ordering::Relaxed);
        }
        evicted
    }

    /// Visit every live entry, shard by shard; returns the number visited.
    ///
    /// Not atomic across shards: concurrent mutations may be partially
    /// observed.
    pub fn for_each<F>(&self, mut func: F) -> usize
    where
        F: FnMut(&V),
    {
        self.shards.iter().map(|s| s.for_each(&mut func)).sum()
    }

    /// Drop every entry in the map.
    pub fn flush(&self) {
        self.flush_with(|_| {});
    }

    /// Drain every entry through `func`, then drop it.
    pub fn flush_with<F>(&self, mut func: F)
    where
        F: FnMut(&mut V),
    {
        self.count.store(0, Ordering::Relaxed);
        for shard in self.shards.iter() {
            shard.flush_with(&mut func);
        }
    }

    #[cfg(test)]
    fn occupied(&self) -> usize {
        self.shards.iter().map(|s| s.occupied()).sum()
    }
}

impl<K, V, S, R> ExpiringMap<K, V, S, R>
where
    K: Hash,
    S: BuildHasher,
    R: RawRwLock,
{
    #[inline]
    fn fingerprint(&self, key: &K) -> u64 {
        self.hash_builder.hash_one(key)
    }

    #[inline]
    fn shard(&self, fingerprint: u64) -> &SlotList<V, R> {
        &self.shards[(fingerprint % self.shards.len() as u64) as usize]
    }

    /// Insert an entry with a lifetime of `ttl` seconds.
    ///
    /// Duplicate keys are permitted; this never fails short of allocation
    /// failure.
    pub fn add(&self, key: &K, value: V, ttl: u32) -> bool {
        let fingerprint = self.fingerprint(key);
        if self.shard(fingerprint).add(fingerprint, value, ttl) {
            self.count.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Run one expiration step, then insert.
    ///
    /// Lets busy writers reclaim expired entries as a side effect of their
    /// own traffic.
    pub fn add_and_check(&self, key: &K, value: V, ttl: u32) -> bool {
        self.expire_check(0);
        self.add(key, value, ttl)
    }

    /// Remove the first entry with this key.
    pub fn remove(&self, key: &K) -> bool {
        self.remove_if(key, |_| true)
    }

    /// Remove the first entry with this key accepted by the predicate.
    ///
    /// The predicate returning `false` skips the candidate.
    pub fn remove_if<F>(&self, key: &K, pred: F) -> bool
    where
        F: FnMut(&V) -> bool,
    {
        let fingerprint = self.fingerprint(key);
        if self.shard(fingerprint).remove_if(fingerprint, pred) {
            self.count.fetch_sub(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Check for an entry with this key, under the shard's shared lock.
    pub fn contains(&self, key: &K) -> bool {
        self.find(key, |_| true)
    }

    /// Look up an entry under the shard's shared lock, observing the value
    /// read-only through the predicate. Returns whether a match was found.
    pub fn find<F>(&self, key: &K, pred: F) -> bool
    where
        F: FnMut(&V) -> bool,
    {
        let fingerprint = self.fingerprint(key);
        self.shard(fingerprint).find(fingerprint, pred)
    }

    /// Look up an entry under the shard's exclusive lock, giving the
    /// predicate mutable access to the value.
    pub fn find_mut<F>(&self, key: &K, pred: F) -> bool
    where
        F: FnMut(&mut V) -> bool,
    {
        let fingerprint = self.fingerprint(key);
        self.shard(fingerprint).find_mut(fingerprint, pred)
    }
}
