//! # expmap
//!
//! A sharded, thread-safe, in-memory map with per-entry TTL, and the small
//! kit of concurrency primitives it is built from.
//!
//! The flagship structure is [`map::ExpiringMap`]: keys hash to one of a
//! large array of independently locked shards, each shard is a chain of
//! 64-entry bitmap slots, and expired entries are reclaimed incrementally
//! by a rolling, non-blocking sweep. It is designed for workloads where
//! insertions, lookups and deletions vastly outnumber reads of the entries
//! themselves: session stores, rate-limit counters, negative DNS caches,
//! short-lived result caches.
//!
//! ## Module Organization
//!
//! ### Foundation
//! - [`clock`] - Process-wide coarse clock (no syscalls on hot paths)
//! - [`backoff`] - Bounded spinning with sleep escalation
//! - [`defer`] - Scoped cleanup guard
//!
//! ### Locks
//! - [`spinlock`] - Exclusive spinlock
//! - [`rwlock`] - Reader-writer spinlock with writer preference
//!
//! ### Counters and Hashing
//! - [`counter`] - Sharded counter for write-heavy statistics
//! - [`hash`] - Fasthash key adapter and integer mixer
//!
//! ### Data Structures
//! - [`slot_list`] - Slot chain with expiration (one shard)
//! - [`map`] - The sharded expiring map
//!
//! ## Example
//!
//! ```
//! use expmap::map::{ExpiringMap, MapConfig};
//!
//! let sessions: ExpiringMap<String, u32> = ExpiringMap::with_config(MapConfig {
//!     shards: 1024,
//!     extend_on_access: true,
//!     preload: false,
//! });
//!
//! sessions.add(&"user-1".to_string(), 7, 30);
//! assert!(sessions.find(&"user-1".to_string(), |v| *v == 7));
//! assert!(sessions.remove(&"user-1".to_string()));
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// =============================================================================
// Foundation
// =============================================================================

/// Process-wide coarse clock.
pub mod clock;

/// Bounded spinning with sleep escalation.
pub mod backoff;

/// Scoped cleanup guard.
pub mod defer;

// =============================================================================
// Locks
// =============================================================================

/// Exclusive spinlock.
pub mod spinlock;

/// Reader-writer spinlock with writer preference.
pub mod rwlock;

// =============================================================================
// Counters and Hashing
// =============================================================================

/// Sharded counter for write-heavy statistics.
pub mod counter;

/// Key hashing for the sharded map.
pub mod hash;

// =============================================================================
// Data Structures
// =============================================================================

mod slot;

/// Slot chain with expiration.
pub mod slot_list;

/// Sharded map with per-entry TTL.
pub mod map;

pub use crate::map::{ExpiringMap, MapConfig, OsExpiringMap};
pub use crate::rwlock::{RawRwSpinLock, RwSpinLock, WeakRwSpinLock};
pub use crate::slot_list::SlotList;
pub use crate::spinlock::{RawSpinLock, SpinLock};
