//! Exclusive spinlock with sleep escalation.
//!
//! A single-word test-and-set lock driven by the [`Backoff`] wait policy:
//! in low contention it acts as a plain spinlock, in high contention it
//! behaves like a sleeping mutex. The raw lock implements
//! [`lock_api::RawMutex`], so it can be used either bare (as the writer
//! lock inside [`crate::rwlock`]) or wrapped with RAII guards via
//! [`SpinLock`].

use std::sync::atomic::{AtomicBool, Ordering};

use crate::backoff::Backoff;

/// A raw test-and-set spinlock.
///
/// Holds no data; pair it with [`SpinLock`] for guard-based access.
pub struct RawSpinLock {
    locked: AtomicBool,
}

impl RawSpinLock {
    /// Create a new unlocked spinlock.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    /// Acquire the lock, spinning if necessary.
    #[inline]
    pub fn lock(&self) {
        let mut backoff = Backoff::new();
        while !self.try_lock() {
            backoff.spin();
        }
    }

    /// Try to acquire the lock without spinning.
    #[inline]
    pub fn try_lock(&self) -> bool {
        if self.locked() {
            return false;
        }
        !self.locked.swap(true, Ordering::Acquire)
    }

    /// Release the lock.
    ///
    /// Calling this without holding the lock breaks mutual exclusion for
    /// the next holders.
    #[inline]
    pub fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    /// Get the lock status.
    ///
    /// Acquire ordering: observing `false` here synchronises with the
    /// previous holder's release.
    #[inline]
    #[must_use]
    pub fn locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }
}

impl Default for RawSpinLock {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl lock_api::RawMutex for RawSpinLock {
    const INIT: Self = Self::new();

    type GuardMarker = lock_api::GuardNoSend;

    #[inline]
    fn lock(&self) {
        Self::lock(self);
    }

    #[inline]
    fn try_lock(&self) -> bool {
        Self::try_lock(self)
    }

    #[inline]
    unsafe fn unlock(&self) {
        Self::unlock(self);
    }

    #[inline]
    fn is_locked(&self) -> bool {
        self.locked()
    }
}

/// A spinlock protecting data of type `T`, with RAII guards.
pub type SpinLock<T> = lock_api::Mutex<RawSpinLock, T>;

/// RAII guard for [`SpinLock`].
pub type SpinLockGuard<'a, T> = lock_api::MutexGuard<'a, RawSpinLock, T>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_new() {
        let lock = RawSpinLock::new();
        assert!(!lock.locked());
    }

    #[test]
    fn test_lock_unlock() {
        let lock = RawSpinLock::new();

        lock.lock();
        assert!(lock.locked());

        lock.unlock();
        assert!(!lock.locked());
    }

    #[test]
    fn test_try_lock_while_held() {
        let lock = RawSpinLock::new();

        assert!(lock.try_lock());
        assert!(!lock.try_lock());

        lock.unlock();
        assert!(lock.try_lock());
        lock.unlock();
    }

    #[test]
    fn test_guarded_counter() {
        let counter = Arc::new(SpinLock::new(0u64));
        let mut threads = Vec::new();

        for _ in 0..4 {
            let counter = Arc::clone(&counter);
            threads.push(thread::spawn(move || {
                for _ in 0..10_000 {
                    *counter.lock() += 1;
                }
            }));
        }
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(*counter.lock(), 40_000);
    }
}
