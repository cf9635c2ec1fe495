//! Reader-writer spinlock with writer preference.
//!
//! Two fields make up the lock: an atomic reader count and an inner
//! exclusive [`RawSpinLock`] held by writers. In the strong-writer variant
//! (the default) a writer takes the inner lock *first* and then waits for
//! the reader count to drain; new readers observe the held inner lock and
//! back off immediately, so a writer waits at most for the readers that
//! arrived before it. The weak variant retries a full try-lock instead and
//! can starve under heavy read traffic.
//!
//! The raw lock implements [`lock_api::RawRwLock`]; use the [`RwSpinLock`]
//! and [`WeakRwSpinLock`] aliases for guard-based access, or plug any other
//! `RawRwLock` implementation (such as `parking_lot::RawRwLock`) into the
//! structures in this crate that are generic over their lock.

use std::sync::atomic::{fence, AtomicI32, Ordering};

use lock_api::RawRwLock as _;

use crate::backoff::Backoff;
use crate::spinlock::RawSpinLock;

/// A raw reader-writer spinlock.
///
/// `STRONG_WRITER` selects the writer-preference discipline described in
/// the module docs.
pub struct RawRwSpinLock<const STRONG_WRITER: bool = true> {
    readers: AtomicI32,
    wlock: RawSpinLock,
}

impl<const STRONG_WRITER: bool> RawRwSpinLock<STRONG_WRITER> {
    /// Create a new unlocked reader-writer spinlock.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            readers: AtomicI32::new(0),
            wlock: RawSpinLock::new(),
        }
    }

    /// Get the current reader count.
    #[inline]
    #[must_use]
    pub fn reader_count(&self) -> i32 {
        self.readers.load(Ordering::Relaxed)
    }

    /// Check if a writer currently holds the lock.
    #[inline]
    #[must_use]
    pub fn writer_held(&self) -> bool {
        self.wlock.locked()
    }

    // Writer preference: land on the inner lock first so new readers bounce,
    // then wait for the ones already inside to drain.
    #[inline]
    fn lock_exclusive_strong(&self) {
        let mut backoff = Backoff::new();
        self.wlock.lock();
        fence(Ordering::SeqCst);
        while self.readers.load(Ordering::Acquire) != 0 {
            backoff.spin();
        }
    }
}

impl<const STRONG_WRITER: bool> Default for RawRwSpinLock<STRONG_WRITER> {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl<const STRONG_WRITER: bool> lock_api::RawRwLock for RawRwSpinLock<STRONG_WRITER> {
    const INIT: Self = Self::new();

    type GuardMarker = lock_api::GuardNoSend;

    #[inline]
    fn lock_shared(&self) {
        let mut backoff = Backoff::new();
        while !self.try_lock_shared() {
            backoff.spin();
        }
    }

    #[inline]
    fn try_lock_shared(&self) -> bool {
        if self.wlock.locked() {
            return false;
        }

        self.readers.fetch_add(1, Ordering::Relaxed);
        // The fence pairs with the one in the exclusive paths: either this
        // reader sees the writer's inner lock, or the writer sees the
        // incremented reader count. Both proceeding is impossible.
        fence(Ordering::SeqCst);
        if self.wlock.locked() {
            self.readers.fetch_sub(1, Ordering::Relaxed);
            return false;
        }
        true
    }

    #[inline]
    unsafe fn unlock_shared(&self) {
        self.readers.fetch_sub(1, Ordering::Release);
    }

    #[inline]
    fn lock_exclusive(&self) {
        if STRONG_WRITER {
            self.lock_exclusive_strong();
        } else {
            let mut backoff = Backoff::new();
            while !self.try_lock_exclusive() {
                backoff.spin();
            }
        }
    }

    /// Always weak: fails without side effects when readers are present or
    /// another writer holds the inner lock.
    #[inline]
    fn try_lock_exclusive(&self) -> bool {
        if self.readers.load(Ordering::Relaxed) != 0 {
            return false;
        }

        if !self.wlock.try_lock() {
            return false;
        }

        fence(Ordering::SeqCst);
        if self.readers.load(Ordering::Acquire) != 0 {
            self.wlock.unlock();
            return false;
        }
        true
    }

    #[inline]
    unsafe fn unlock_exclusive(&self) {
        self.wlock.unlock();
    }

    #[inline]
    fn is_locked(&self) -> bool {
        self.wlock.locked() || self.readers.load(Ordering::Relaxed) != 0
    }
}

/// A reader-writer spinlock with writer preference, protecting `T`.
pub type RwSpinLock<T> = lock_api::RwLock<RawRwSpinLock, T>;

/// A reader-writer spinlock without writer preference, protecting `T`.
///
/// Starves writers under continuous read traffic; use only where readers
/// are known to be sparse.
pub type WeakRwSpinLock<T> = lock_api::RwLock<RawRwSpinLock<false>, T>;

/// RAII shared guard for [`RwSpinLock`].
pub type RwSpinLockReadGuard<'a, T> = lock_api::RwLockReadGuard<'a, RawRwSpinLock, T>;

/// RAII exclusive guard for [`RwSpinLock`].
pub type RwSpinLockWriteGuard<'a, T> = lock_api::RwLockWriteGuard<'a, RawRwSpinLock, T>;
