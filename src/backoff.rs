//! Bounded spinning with sleep escalation for contention management.
//!
//! This module provides the wait policy shared by the crate's spinlocks.
//! Each round of waiting issues a CPU pause hint; after a bounded number of
//! unsuccessful rounds the thread yields to the OS with a nanosecond sleep
//! and starts over. Under light contention a lock built on this policy
//! behaves like a pure spinlock; under heavy contention it degrades into a
//! sleeping mutex whose latency is governed by the OS scheduler and timer.
//!
//! # Example
//!
//! ```
//! use expmap::backoff::Backoff;
//!
//! let mut backoff = Backoff::new();
//!
//! loop {
//!     if try_acquire_lock() {
//!         break;
//!     }
//!     backoff.spin();
//! }
//! # fn try_acquire_lock() -> bool { true }
//! ```

use std::hint;
use std::thread;
use std::time::Duration;

/// Default number of spin rounds before yielding to the OS.
const DEFAULT_SPIN_LIMIT: u32 = 10;

/// Spin-then-sleep backoff state.
#[derive(Debug, Clone)]
pub struct Backoff {
    spins: u32,
    limit: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

impl Backoff {
    /// Create a new backoff state with the default spin limit.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            spins: 0,
            limit: DEFAULT_SPIN_LIMIT,
        }
    }

    /// Create a new backoff state with a custom spin limit.
    ///
    /// A limit of 0 disables the sleep escalation entirely, producing a
    /// pure busy-wait.
    #[inline]
    #[must_use]
    pub const fn with_limit(limit: u32) -> Self {
        Self { spins: 0, limit }
    }

    /// Reset the spin counter.
    #[inline]
    pub fn reset(&mut self) {
        self.spins = 0;
    }

    /// Perform one round of waiting.
    ///
    /// Issues a pause hint; once the spin limit is reached, sleeps for a
    /// nanosecond and resets the counter.
    #[inline]
    pub fn spin(&mut self) {
        hint::spin_loop();

        if self.limit != 0 {
            self.spins += 1;
            if self.spins >= self.limit {
                thread::sleep(Duration::from_nanos(1));
                self.spins = 0;
            }
        }
    }

    /// Get the number of spin rounds since the last reset or sleep.
    #[inline]
    #[must_use]
    pub fn spins(&self) -> u32 {
        self.spins
    }
}
