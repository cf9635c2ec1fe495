//! Process-wide coarse clock.
//!
//! TTL checks on the map's hot paths need the current time on every call;
//! asking the OS each time would dominate the cost of the operation. This
//! module instead publishes wall-clock seconds and milliseconds into
//! process-wide atomics and keeps them fresh with a single detached updater
//! thread that re-samples roughly once per millisecond. Readers pay two
//! relaxed atomic loads at most.
//!
//! Published values are monotonically non-decreasing once the updater has
//! run. Accuracy is bounded by the update period; that is sufficient for
//! TTLs measured in seconds.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Once;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

static SECONDS: AtomicU64 = AtomicU64::new(0);
static MILLIS: AtomicU64 = AtomicU64::new(0);
static RUNNING: AtomicBool = AtomicBool::new(false);
static INIT: Once = Once::new();

/// Update period of the background sampler.
const UPDATE_INTERVAL: Duration = Duration::from_millis(1);

/// Last published wall-clock time in whole seconds since the Unix epoch.
///
/// The first call bootstraps the updater; subsequent calls never touch the
/// OS clock.
#[inline]
pub fn seconds() -> u64 {
    if !RUNNING.load(Ordering::Relaxed) {
        bootstrap();
    }
    SECONDS.load(Ordering::Relaxed)
}

/// Last published wall-clock time in milliseconds since the Unix epoch.
#[inline]
pub fn millis() -> u64 {
    if !RUNNING.load(Ordering::Relaxed) {
        bootstrap();
    }
    MILLIS.load(Ordering::Relaxed)
}

#[cold]
fn bootstrap() {
    INIT.call_once(|| {
        refresh();

        let spawned = thread::Builder::new()
            .name("expmap-clock".into())
            .spawn(|| loop {
                thread::sleep(UPDATE_INTERVAL);
                refresh();
            });

        match spawned {
            Ok(_) => {
                RUNNING.store(true, Ordering::Relaxed);
                log::debug!("coarse clock updater started");
            }
            Err(e) => {
                log::warn!("coarse clock updater not started, falling back to direct reads: {e}");
            }
        }
    });

    // No updater: every read degrades to a direct system-clock sample.
    if !RUNNING.load(Ordering::Relaxed) {
        refresh();
    }
}

fn refresh() {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();

    // fetch_max keeps readers monotonic even if the wall clock steps back.
    SECONDS.fetch_max(now.as_secs(), Ordering::Relaxed);
    MILLIS.fetch_max(now.as_millis() as u64, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_published() {
        assert!(seconds() > 0);
    }

    #[test]
    fn test_millis_consistent_with_seconds() {
        let ms = millis();
        let s = seconds();

        // Same epoch, coarser unit; allow one update period of skew.
        assert!(ms / 1000 >= s.saturating_sub(1));
    }

    #[test]
    fn test_monotonic_non_decreasing() {
        let mut last = millis();
        for _ in 0..100 {
            let now = millis();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn test_updater_advances() {
        let start = millis();
        thread::sleep(Duration::from_millis(50));
        assert!(millis() > start);
    }
}
