//! # Cache Facade
//!
//! A fixed array of buckets behind per-bucket reader/writer locks. Every
//! public operation hashes the key twice: a process-local shard hash picks
//! the bucket, and the fingerprint hash forms the primary-index key inside
//! it. Keeping the two hashes independent avoids correlated collisions
//! between shard selection and indexing.
//!
//! ## Design Principles
//! 1. **Sharded Locks**: Buckets never share a lock; operations on distinct
//!    buckets scale with core count.
//! 2. **Copy Under The Guard**: `get` clones the value while the read lock is
//!    still held, so no borrow can outlive the lock.
//! 3. **One Bucket Per Call**: No operation holds two bucket locks at once;
//!    `scan` and `migrate` walk buckets strictly one at a time.

use std::hash::{BuildHasher, Hasher};
use std::sync::Arc;
use std::time::Duration;

use ahash::RandomState;
use parking_lot::RwLock;

use pkv_common::{CacheStats, PkvResult};

use crate::bucket::{Bucket, BucketConfig};
use crate::clock;
use crate::options::{HashFn, Options};
use crate::pool::BufferPool;

/// Sharded, expiration-aware byte cache.
///
/// Thread-safe; share it behind an `Arc` and call from any thread.
pub struct Cache {
    buckets: Vec<RwLock<Bucket>>,
    shard_mask: usize,
    shard_state: RandomState,
    hash_fn: HashFn,
}

impl Cache {
    /// Builds a cache from the provided options.
    ///
    /// Fails when the options are invalid (zero or non-power-of-two shard
    /// count, out-of-range compaction ratio, zero evict interval).
    pub fn new(options: Options) -> PkvResult<Self> {
        options.validate()?;

        let pool = Arc::new(BufferPool::new());
        let config = Arc::new(BucketConfig {
            index_size: options.index_size,
            buffer_size: options.buffer_size,
            evict_interval: options.evict_interval,
            max_fail_count: options.max_fail_count,
            disable_evict: options.disable_evict,
            migrate_ratio: options.migrate_ratio,
            migrate_delta: options.migrate_delta,
            hash_fn: options.hash_fn.clone(),
            on_remove: options.on_remove.clone(),
            pool,
        });

        // Index maps across buckets share one seed; the shard hash below is
        // seeded separately so the two stay uncorrelated.
        let map_state = RandomState::new();
        let mut buckets = Vec::with_capacity(options.shard_count);
        for _ in 0..options.shard_count {
            buckets.push(RwLock::new(Bucket::new(
                Arc::clone(&config),
                map_state.clone(),
            )));
        }

        Ok(Cache {
            buckets,
            shard_mask: options.shard_count - 1,
            shard_state: RandomState::new(),
            hash_fn: options.hash_fn,
        })
    }

    /// Stores a key/value pair with no expiration.
    pub fn set(&self, key: &[u8], val: &[u8]) {
        self.set_tx(key, val, 0);
    }

    /// Stores a key/value pair expiring `ttl` from now.
    pub fn set_ex(&self, key: &[u8], val: &[u8], ttl: Duration) {
        self.set_tx(key, val, clock::now_nanos() + ttl.as_nanos() as i64);
    }

    /// Stores a key/value pair with an absolute deadline in Unix nanoseconds
    /// (`0` for no expiration).
    ///
    /// # Panics
    /// Panics when the deadline is negative or does not fit the index
    /// encoding; both are caller contract violations.
    pub fn set_tx(&self, key: &[u8], val: &[u8], deadline_nanos: i64) {
        let fp = (self.hash_fn)(key);
        let mut bucket = self.buckets[self.shard_index(key)].write();
        bucket.set(key, fp, val, deadline_nanos);
    }

    /// Looks up a key, returning a copy of the value and its deadline in
    /// nanoseconds (`0` when the entry never expires).
    pub fn get(&self, key: &[u8]) -> Option<(Vec<u8>, i64)> {
        let fp = (self.hash_fn)(key);
        let bucket = self.buckets[self.shard_index(key)].read();
        bucket.get(key, fp).map(|(val, ttl)| (val.to_vec(), ttl))
    }

    /// Replaces the deadline of an existing live entry.
    ///
    /// Returns true iff such an entry existed.
    pub fn set_ttl(&self, key: &[u8], deadline_nanos: i64) -> bool {
        let fp = (self.hash_fn)(key);
        let mut bucket = self.buckets[self.shard_index(key)].write();
        bucket.set_ttl(key, fp, deadline_nanos)
    }

    /// Deletes a key. Returns true iff a live entry was removed.
    pub fn remove(&self, key: &[u8]) -> bool {
        let fp = (self.hash_fn)(key);
        let mut bucket = self.buckets[self.shard_index(key)].write();
        bucket.remove(key, fp)
    }

    /// Visits every live entry as `(key, value, ttl_nanos)` until the
    /// visitor returns false.
    ///
    /// Buckets are visited sequentially under their read locks; the visitor
    /// must not call back into the cache.
    pub fn scan<F>(&self, mut visitor: F)
    where
        F: FnMut(&[u8], &[u8], i64) -> bool,
    {
        for bucket in &self.buckets {
            if !bucket.read().scan(&mut visitor) {
                return;
            }
        }
    }

    /// Forces a compaction of every bucket, one write lock at a time.
    pub fn migrate(&self) {
        for bucket in &self.buckets {
            bucket.write().migrate();
        }
    }

    /// Returns counters aggregated across all buckets.
    pub fn stat(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        for bucket in &self.buckets {
            bucket.read().stats_into(&mut stats);
        }
        stats
    }

    /// Hashes a key to its owning bucket with the shard hash.
    fn shard_index(&self, key: &[u8]) -> usize {
        let mut hasher = self.shard_state.build_hasher();
        hasher.write(key);
        (hasher.finish() as usize) & self.shard_mask
    }
}
