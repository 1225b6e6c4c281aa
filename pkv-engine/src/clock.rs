//! # Clock Source
//!
//! Provide process-wide, lock-free readers of the current wall-clock time in
//! nanoseconds and whole seconds. Every write, lookup, and evictor probe
//! consults the clock, so the read path is a single relaxed atomic load; a
//! background ticker refreshes the cells once per millisecond.
//!
//! ## Design Principles
//! 1. **Branch-Free Reads**: Readers never take a lock or a syscall.
//! 2. **Shared Cells**: One ticker feeds every bucket via two atomics.
//! 3. **Coarse Is Enough**: Deadlines are stored at second granularity, so a
//!    millisecond-stale reading is invisible to expiration checks.
//! 4. **Tolerate Skew**: Small backward jumps of the system clock read as
//!    "not expired"; nothing in the engine assumes strict monotonicity.

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;

/// How often the background ticker refreshes the cells.
const REFRESH_INTERVAL: Duration = Duration::from_millis(1);

struct Clock {
    nanos: AtomicI64,
    seconds: AtomicU32,
}

static CLOCK: Lazy<Arc<Clock>> = Lazy::new(Clock::start);

impl Clock {
    /// Creates the shared clock and spawns the detached refresher thread.
    fn start() -> Arc<Clock> {
        let clock = Arc::new(Clock {
            nanos: AtomicI64::new(0),
            seconds: AtomicU32::new(0),
        });
        clock.refresh();

        let ticker = Arc::clone(&clock);
        std::thread::spawn(move || loop {
            std::thread::sleep(REFRESH_INTERVAL);
            ticker.refresh();
        });

        clock
    }

    fn refresh(&self) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        self.nanos.store(now.as_nanos() as i64, Ordering::Relaxed);
        self.seconds.store(now.as_secs() as u32, Ordering::Relaxed);
    }
}

/// Returns the cached Unix time in nanoseconds.
#[inline]
pub fn now_nanos() -> i64 {
    CLOCK.nanos.load(Ordering::Relaxed)
}

/// Returns the cached Unix time in whole seconds.
#[inline]
pub fn now_seconds() -> u32 {
    CLOCK.seconds.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readers_track_the_system_clock() {
        let system = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        let seconds = now_seconds() as u64;
        assert!(seconds.abs_diff(system.as_secs()) <= 1);

        let nanos = now_nanos();
        assert!(nanos > 0);
        assert!((nanos / 1_000_000_000) as u64 >= system.as_secs() - 1);
    }

    #[test]
    fn readers_are_non_decreasing_across_ticks() {
        let first = now_nanos();
        std::thread::sleep(Duration::from_millis(5));
        let second = now_nanos();
        assert!(second >= first);
        assert!(now_seconds() as u64 >= (first / 1_000_000_000) as u64);
    }
}
