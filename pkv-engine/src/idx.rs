//! # Index Entry
//!
//! Pack a log offset and an expiration deadline into eight bytes. The
//! deadline is stored in whole seconds so it fits a `u32`; nanosecond inputs
//! are rounded down at construction and widened back on the way out.
//!
//! A stored deadline of zero means "never expires". Callers that need a real
//! deadline inside the first second of the Unix epoch are out of luck, which
//! is the intended trade for the 32-bit field.

use crate::clock;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Location and deadline of one log entry: `(start offset, ttl seconds)`.
///
/// `ttl == 0` encodes "no expiration". A non-zero value is an absolute
/// wall-clock deadline in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Idx {
    start: u32,
    ttl: u32,
}

impl Idx {
    /// Creates an index entry for a log offset and an absolute deadline in
    /// nanoseconds (`0` for no expiration).
    ///
    /// # Panics
    /// Panics when `start` does not fit a `u32`, when `ttl_nanos` is
    /// negative, or when the deadline in seconds does not fit a `u32`.
    pub fn new(start: usize, ttl_nanos: i64) -> Self {
        assert!(start <= u32::MAX as usize, "log offset overflows u32");
        assert!(ttl_nanos >= 0, "expiration deadline is negative");
        let seconds = ttl_nanos / NANOS_PER_SEC;
        assert!(seconds <= u32::MAX as i64, "deadline seconds overflow u32");

        Idx {
            start: start as u32,
            ttl: seconds as u32,
        }
    }

    /// Byte offset of the entry's first header byte in the log.
    #[inline]
    pub fn start(&self) -> usize {
        self.start as usize
    }

    /// Deadline in whole seconds, `0` when the entry never expires.
    #[inline]
    pub fn ttl_seconds(&self) -> u32 {
        self.ttl
    }

    /// Deadline widened back to nanoseconds, `0` when the entry never expires.
    #[inline]
    pub fn ttl_nanos(&self) -> i64 {
        self.ttl as i64 * NANOS_PER_SEC
    }

    /// Returns true once the stored deadline lies in the past.
    ///
    /// A deadline equal to the current second is still live, so a clock cell
    /// lagging slightly behind the system clock never expires entries early.
    #[inline]
    pub fn expired(&self) -> bool {
        self.ttl != 0 && self.ttl < clock::now_seconds()
    }

    /// Returns a copy pointing at a new log offset, keeping the deadline.
    ///
    /// Compaction uses this when it moves an entry into a fresh buffer.
    pub fn with_start(self, start: usize) -> Self {
        assert!(start <= u32::MAX as usize, "log offset overflows u32");
        Idx {
            start: start as u32,
            ttl: self.ttl,
        }
    }

    /// Returns a copy with a new deadline, keeping the log offset.
    pub fn with_ttl(self, ttl_nanos: i64) -> Self {
        Idx::new(self.start as usize, ttl_nanos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_ttl_means_no_expiration() {
        let idx = Idx::new(17, 0);
        assert_eq!(idx.start(), 17);
        assert_eq!(idx.ttl_seconds(), 0);
        assert_eq!(idx.ttl_nanos(), 0);
        assert!(!idx.expired());
    }

    #[test]
    fn nanosecond_deadlines_round_down_to_seconds() {
        let idx = Idx::new(0, 5 * NANOS_PER_SEC + 999_999_999);
        assert_eq!(idx.ttl_seconds(), 5);
        assert_eq!(idx.ttl_nanos(), 5 * NANOS_PER_SEC);
    }

    #[test]
    fn past_deadlines_read_as_expired() {
        let past = (clock::now_seconds() as i64 - 10) * NANOS_PER_SEC;
        assert!(Idx::new(0, past).expired());

        let future = (clock::now_seconds() as i64 + 60) * NANOS_PER_SEC;
        assert!(!Idx::new(0, future).expired());
    }

    #[test]
    fn the_current_second_is_still_live() {
        let now = clock::now_seconds() as i64 * NANOS_PER_SEC;
        assert!(!Idx::new(0, now).expired());
    }

    #[test]
    fn with_start_and_with_ttl_preserve_the_other_field() {
        let idx = Idx::new(100, 7 * NANOS_PER_SEC);
        let moved = idx.with_start(9_000);
        assert_eq!(moved.start(), 9_000);
        assert_eq!(moved.ttl_seconds(), 7);

        let renewed = idx.with_ttl(90 * NANOS_PER_SEC);
        assert_eq!(renewed.start(), 100);
        assert_eq!(renewed.ttl_seconds(), 90);
    }

    #[test]
    #[should_panic(expected = "negative")]
    fn negative_deadlines_panic() {
        let _ = Idx::new(0, -1);
    }

    #[test]
    #[should_panic(expected = "overflows u32")]
    fn oversized_offsets_panic() {
        let _ = Idx::new(u32::MAX as usize + 1, 0);
    }

    #[test]
    #[should_panic(expected = "overflow u32")]
    fn oversized_deadlines_panic() {
        let _ = Idx::new(0, i64::MAX);
    }
}
