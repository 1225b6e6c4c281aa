//! # Cache Statistics
//!
//! Purpose: Expose a flat counter snapshot aggregated across all buckets so
//! drivers can render telemetry without extra parsing or allocations.
//!
//! ## Design Principles
//! 1. **Plain Counters**: Every field is a `u64` gauge or counter; snapshots
//!    are `Copy` and cheap to pass around.
//! 2. **Point-In-Time**: A snapshot is taken bucket by bucket, so fields are
//!    individually accurate but not mutually atomic.

use std::fmt;

/// Snapshot of cache-wide counters at a point in time.
///
/// Gauges (`len`, `conflict`, `alloc`, `unused`) reflect current state;
/// the remaining fields are monotonic counters since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of indexed entries (primary index plus conflict map).
    pub len: u64,
    /// Number of entries currently held in conflict maps.
    pub conflict: u64,
    /// Total bytes written to bucket logs and not yet compacted away.
    pub alloc: u64,
    /// Bytes in the logs no longer referenced by any live index entry.
    pub unused: u64,
    /// Completed log compactions.
    pub migrations: u64,
    /// Entries reclaimed because their deadline passed.
    pub evictions: u64,
    /// Entries examined by evictor sweeps.
    pub probes: u64,
}

impl CacheStats {
    /// Fraction of log bytes that are dead weight, `0.0` when the logs are empty.
    pub fn unused_ratio(&self) -> f64 {
        if self.alloc == 0 {
            return 0.0;
        }
        self.unused as f64 / self.alloc as f64
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "len={} conflict={} alloc={}B unused={}B ({:.1}%) migrations={} evictions={} probes={}",
            self.len,
            self.conflict,
            self.alloc,
            self.unused,
            self.unused_ratio() * 100.0,
            self.migrations,
            self.evictions,
            self.probes,
        )
    }
}
