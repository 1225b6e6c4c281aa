//! # Cache Options
//!
//! Construction-time knobs for the cache. Every field has a default aimed at
//! gigabyte-scale working sets; `validate` rejects the combinations the
//! engine cannot run with.

use std::fmt;
use std::sync::Arc;

use xxhash_rust::xxh3::xxh3_64;

use pkv_common::{PkvError, PkvResult};

/// Fingerprint hash override.
///
/// Tests substitute a degenerate hash here to force conflict-map traffic.
pub type HashFn = Arc<dyn Fn(&[u8]) -> u64 + Send + Sync>;

/// Callback fired with `(key, value)` when an entry is evicted or removed.
///
/// Runs under the owning bucket's write lock; it must not call back into the
/// cache.
pub type RemoveCallback = Arc<dyn Fn(&[u8], &[u8]) + Send + Sync>;

/// Cache configuration.
///
/// Plain public fields; construct with a struct literal over `..Default::default()`.
#[derive(Clone)]
pub struct Options {
    /// Number of buckets; must be a positive power of two.
    pub shard_count: usize,
    /// Initial capacity hint for each bucket's primary index.
    pub index_size: usize,
    /// Initial capacity hint for each bucket's log, in bytes.
    pub buffer_size: usize,
    /// Writes between evictor sweeps on a bucket.
    pub evict_interval: u32,
    /// Consecutive live entries that terminate a sweep.
    pub max_fail_count: u32,
    /// Skip evictor sweeps entirely (compaction checks still run).
    pub disable_evict: bool,
    /// Fraction of dead log bytes that triggers compaction, in `(0.0, 1.0]`.
    pub migrate_ratio: f64,
    /// Minimum absolute dead bytes before compaction is considered.
    pub migrate_delta: usize,
    /// Fingerprint hash for the primary index.
    pub hash_fn: HashFn,
    /// Optional eviction/removal callback.
    pub on_remove: Option<RemoveCallback>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            shard_count: 1024,
            index_size: 1024,
            buffer_size: 64 * 1024,
            evict_interval: 5,
            max_fail_count: 3,
            disable_evict: false,
            migrate_ratio: 0.5,
            migrate_delta: 4 * 1024,
            hash_fn: Arc::new(xxh3_64),
            on_remove: None,
        }
    }
}

impl Options {
    /// Rejects option combinations the engine cannot run with.
    pub fn validate(&self) -> PkvResult<()> {
        if self.shard_count == 0 || !self.shard_count.is_power_of_two() {
            return Err(PkvError::InvalidShardCount(self.shard_count));
        }
        if !(self.migrate_ratio > 0.0 && self.migrate_ratio <= 1.0) {
            return Err(PkvError::InvalidMigrateRatio(self.migrate_ratio));
        }
        if self.evict_interval == 0 {
            return Err(PkvError::InvalidEvictInterval);
        }
        Ok(())
    }
}

// Hand-written because the function fields have no Debug form.
impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("shard_count", &self.shard_count)
            .field("index_size", &self.index_size)
            .field("buffer_size", &self.buffer_size)
            .field("evict_interval", &self.evict_interval)
            .field("max_fail_count", &self.max_fail_count)
            .field("disable_evict", &self.disable_evict)
            .field("migrate_ratio", &self.migrate_ratio)
            .field("migrate_delta", &self.migrate_delta)
            .field("on_remove", &self.on_remove.is_some())
            .finish()
    }
}
