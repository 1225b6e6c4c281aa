//! # Bucket Storage Engine
//!
//! One shard of the cache. All live entries sit in a single packed byte log;
//! a primary index maps a 64-bit key fingerprint to a log offset and
//! deadline, and a small conflict map resolves full-key collisions on the
//! fingerprint. Dead bytes accumulate in place and are reclaimed only by
//! compaction into a fresh buffer from the shared pool.
//!
//! ## Design Principles
//!
//! 1. **Packed Log**: Keys and values are copied into one growable byte
//!    buffer; the hot path allocates nothing per entry.
//! 2. **Append-Only Writes**: Overwrites append a new record and account the
//!    old region as unused instead of rewriting in place.
//! 3. **Amortized Expiration**: A bounded probabilistic sweep runs every few
//!    writes, so no single operation pays an O(n) reclamation cost.
//! 4. **Threshold Compaction**: The log is rebuilt once dead bytes pass both
//!    an absolute and a relative threshold, and conflict entries are promoted
//!    back into the primary index whenever their fingerprint slot has freed.
//!
//! ## Structure Overview
//!
//! ```text
//! Bucket
//!   ├── data: Vec<u8>                      uvarint(klen) uvarint(vlen) key val ...
//!   ├── index: HashMap<u64, Idx>           fingerprint -> (start, ttl)
//!   ├── conflict: HashMap<Box<[u8]>, Idx>  full key -> (start, ttl)
//!   ├── stats: BucketStats                 unused / migrations / evictions / probes
//!   └── sweep_ticks                        writes since the last evictor run
//! ```

use std::sync::Arc;

use ahash::RandomState;
use hashbrown::hash_map::Entry;
use hashbrown::HashMap;
use tracing::{debug, trace};

use pkv_common::CacheStats;

use crate::idx::Idx;
use crate::options::{HashFn, RemoveCallback};
use crate::pool::BufferPool;

/// Shared per-cache configuration handed to every bucket.
pub(crate) struct BucketConfig {
    pub index_size: usize,
    pub buffer_size: usize,
    pub evict_interval: u32,
    pub max_fail_count: u32,
    pub disable_evict: bool,
    pub migrate_ratio: f64,
    pub migrate_delta: usize,
    pub hash_fn: HashFn,
    pub on_remove: Option<RemoveCallback>,
    pub pool: Arc<BufferPool>,
}

/// Per-bucket counters; gauges are derived from the maps on demand.
#[derive(Debug, Default)]
struct BucketStats {
    /// Log bytes no longer referenced by any live index entry.
    unused: usize,
    /// Completed compactions.
    migrations: u64,
    /// Entries reclaimed because their deadline passed.
    evictions: u64,
    /// Entries examined by evictor sweeps.
    probes: u64,
}

/// One shard: packed log, fingerprint index, conflict map, counters.
///
/// The facade wraps each bucket in a reader/writer lock; nothing in here
/// synchronizes on its own.
pub(crate) struct Bucket {
    data: Vec<u8>,
    index: HashMap<u64, Idx, RandomState>,
    conflict: HashMap<Box<[u8]>, Idx, RandomState>,
    stats: BucketStats,
    sweep_ticks: u32,
    config: Arc<BucketConfig>,
}

impl Bucket {
    /// Creates an empty bucket with a pool-backed log buffer.
    pub fn new(config: Arc<BucketConfig>, hash_state: RandomState) -> Self {
        let data = config.pool.get(config.buffer_size);
        Bucket {
            data,
            index: HashMap::with_capacity_and_hasher(config.index_size, hash_state.clone()),
            conflict: HashMap::with_hasher(hash_state),
            stats: BucketStats::default(),
            sweep_ticks: 0,
            config,
        }
    }

    /// Looks up a key and returns a borrowed value plus its deadline in
    /// nanoseconds (`0` when the entry never expires).
    ///
    /// The conflict map wins over the primary index. On the primary path the
    /// decoded key bytes are compared against the caller's key, so a foreign
    /// entry sharing the fingerprint reads as a miss rather than a wrong hit.
    pub fn get(&self, key: &[u8], fp: u64) -> Option<(&[u8], i64)> {
        if !self.conflict.is_empty() {
            if let Some(idx) = self.conflict.get(key) {
                if idx.expired() {
                    return None;
                }
                let (_, val, _) = decode_entry(&self.data, idx.start());
                return Some((val, idx.ttl_nanos()));
            }
        }

        let idx = match self.index.get(&fp) {
            Some(&idx) => idx,
            None => return None,
        };
        if idx.expired() {
            return None;
        }
        let (stored, val, _) = decode_entry(&self.data, idx.start());
        if stored != key {
            return None;
        }
        Some((val, idx.ttl_nanos()))
    }

    /// Inserts or replaces a key with an absolute deadline in nanoseconds
    /// (`0` for no expiration).
    ///
    /// Every call ticks the evictor first, then appends the new record and
    /// repoints whichever map owns the key. A live fingerprint collision
    /// sends the new key to the conflict map and leaves the primary index
    /// untouched.
    pub fn set(&mut self, key: &[u8], fp: u64, val: &[u8], ttl_nanos: i64) {
        self.tick();

        // Keys already routed to the conflict map stay there until compaction.
        if let Some(old) = self.conflict.get(key).copied() {
            self.stats.unused += entry_len(&self.data, old.start());
            let start = append_entry(&mut self.data, key, val);
            if let Some(slot) = self.conflict.get_mut(key) {
                *slot = Idx::new(start, ttl_nanos);
            }
            return;
        }

        if let Some(old) = self.index.get(&fp).copied() {
            let (stored, _, old_len) = decode_entry(&self.data, old.start());
            let same_key = stored == key;
            let expired = old.expired();

            if !expired && !same_key {
                // Fingerprint collision with a live foreign key.
                let start = append_entry(&mut self.data, key, val);
                self.conflict.insert(key.into(), Idx::new(start, ttl_nanos));
                return;
            }

            self.stats.unused += old_len;
            if expired {
                self.stats.evictions += 1;
                self.notify_remove(old.start());
            }
            let start = append_entry(&mut self.data, key, val);
            self.index.insert(fp, Idx::new(start, ttl_nanos));
            return;
        }

        let start = append_entry(&mut self.data, key, val);
        self.index.insert(fp, Idx::new(start, ttl_nanos));
    }

    /// Deletes a key. Returns true iff a live entry was removed.
    ///
    /// An expired occupant is deleted as well (its bytes become unused) but
    /// reads as a miss to the caller.
    pub fn remove(&mut self, key: &[u8], fp: u64) -> bool {
        if !self.conflict.is_empty() {
            if let Some(idx) = self.conflict.remove(key) {
                self.stats.unused += entry_len(&self.data, idx.start());
                if idx.expired() {
                    self.stats.evictions += 1;
                    self.notify_remove(idx.start());
                    return false;
                }
                self.notify_remove(idx.start());
                return true;
            }
        }

        let idx = match self.index.get(&fp) {
            Some(&idx) => idx,
            None => return false,
        };
        let (stored, _, len) = decode_entry(&self.data, idx.start());
        if stored != key {
            return false;
        }

        self.index.remove(&fp);
        self.stats.unused += len;
        if idx.expired() {
            self.stats.evictions += 1;
            self.notify_remove(idx.start());
            return false;
        }
        self.notify_remove(idx.start());
        true
    }

    /// Replaces the deadline of a live entry without touching the log.
    ///
    /// Returns true iff a live entry owned by `key` existed.
    pub fn set_ttl(&mut self, key: &[u8], fp: u64, ttl_nanos: i64) -> bool {
        if !self.conflict.is_empty() {
            if let Some(idx) = self.conflict.get_mut(key) {
                if idx.expired() {
                    return false;
                }
                *idx = idx.with_ttl(ttl_nanos);
                return true;
            }
        }

        let idx = match self.index.get(&fp) {
            Some(&idx) => idx,
            None => return false,
        };
        if idx.expired() {
            return false;
        }
        let (stored, _, _) = decode_entry(&self.data, idx.start());
        if stored != key {
            return false;
        }
        self.index.insert(fp, idx.with_ttl(ttl_nanos));
        true
    }

    /// Visits every live entry as `(key, value, ttl_nanos)`.
    ///
    /// Returns false iff the visitor stopped the scan early. Order is
    /// whatever the maps yield.
    pub fn scan<F>(&self, visitor: &mut F) -> bool
    where
        F: FnMut(&[u8], &[u8], i64) -> bool,
    {
        for (key, idx) in self.conflict.iter() {
            if idx.expired() {
                continue;
            }
            let (_, val, _) = decode_entry(&self.data, idx.start());
            if !visitor(key, val, idx.ttl_nanos()) {
                return false;
            }
        }

        for idx in self.index.values() {
            if idx.expired() {
                continue;
            }
            let (key, val, _) = decode_entry(&self.data, idx.start());
            if !visitor(key, val, idx.ttl_nanos()) {
                return false;
            }
        }

        true
    }

    /// Rebuilds the log in a fresh pool buffer, dropping every dead region.
    ///
    /// Expired entries are removed from both maps. Surviving conflict-map
    /// entries are rehashed; whenever a fingerprint slot has freed up, the
    /// entry is promoted into the primary index, so the conflict map shrinks
    /// toward empty over time.
    pub fn migrate(&mut self) {
        let mut fresh = self
            .config
            .pool
            .get(self.data.len().max(self.config.buffer_size));

        let data = &self.data;
        let stats = &mut self.stats;
        let on_remove = self.config.on_remove.clone();
        self.index.retain(|_, idx| {
            if idx.expired() {
                stats.evictions += 1;
                if let Some(callback) = &on_remove {
                    let (key, val, _) = decode_entry(data, idx.start());
                    callback(key, val);
                }
                return false;
            }
            let len = entry_len(data, idx.start());
            let start = fresh.len();
            fresh.extend_from_slice(&data[idx.start()..idx.start() + len]);
            *idx = idx.with_start(start);
            true
        });

        let entries: Vec<(Box<[u8]>, Idx)> = self.conflict.drain().collect();
        for (key, idx) in entries {
            if idx.expired() {
                self.stats.evictions += 1;
                self.notify_remove(idx.start());
                continue;
            }
            let len = entry_len(&self.data, idx.start());
            let start = fresh.len();
            fresh.extend_from_slice(&self.data[idx.start()..idx.start() + len]);
            let moved = idx.with_start(start);

            match self.index.entry((self.config.hash_fn)(&key)) {
                // The colliding occupant is gone; take over the slot.
                Entry::Vacant(slot) => {
                    slot.insert(moved);
                }
                Entry::Occupied(_) => {
                    self.conflict.insert(key, moved);
                }
            }
        }

        let old = std::mem::replace(&mut self.data, fresh);
        self.config.pool.put(old);
        self.stats.unused = 0;
        self.stats.migrations += 1;
        debug!(
            live = self.index.len() + self.conflict.len(),
            conflict = self.conflict.len(),
            bytes = self.data.len(),
            "bucket log migrated"
        );
    }

    /// Adds this bucket's gauges and counters into an aggregate snapshot.
    pub fn stats_into(&self, out: &mut CacheStats) {
        out.len += (self.index.len() + self.conflict.len()) as u64;
        out.conflict += self.conflict.len() as u64;
        out.alloc += self.data.len() as u64;
        out.unused += self.stats.unused as u64;
        out.migrations += self.stats.migrations;
        out.evictions += self.stats.evictions;
        out.probes += self.stats.probes;
    }

    /// Counts one write; every `evict_interval`-th write runs the evictor
    /// sweep (unless disabled) and then the compaction check.
    fn tick(&mut self) {
        self.sweep_ticks += 1;
        if self.sweep_ticks < self.config.evict_interval {
            return;
        }
        self.sweep_ticks = 0;

        if !self.config.disable_evict {
            self.evict_expired();
        }
        self.compact_if_needed();
    }

    /// Bounded probabilistic sweep over the conflict map, then the index.
    ///
    /// Walks entries in map order, dropping expired ones; a run of more than
    /// `max_fail_count` consecutive live entries ends the sweep, which keeps
    /// the amortized cost per write O(1).
    fn evict_expired(&mut self) {
        let mut failed = 0u32;
        let mut removed = 0u64;

        if !self.conflict.is_empty() {
            let mut dead: Vec<Box<[u8]>> = Vec::new();
            for (key, idx) in self.conflict.iter() {
                self.stats.probes += 1;
                if idx.expired() {
                    dead.push(key.clone());
                    failed = 0;
                } else {
                    failed += 1;
                    if failed > self.config.max_fail_count {
                        break;
                    }
                }
            }
            for key in dead {
                if let Some(idx) = self.conflict.remove(&key) {
                    self.stats.unused += entry_len(&self.data, idx.start());
                    self.stats.evictions += 1;
                    removed += 1;
                    self.notify_remove(idx.start());
                }
            }
        }

        if failed <= self.config.max_fail_count {
            let mut dead: Vec<u64> = Vec::new();
            for (&fp, idx) in self.index.iter() {
                self.stats.probes += 1;
                if idx.expired() {
                    dead.push(fp);
                    failed = 0;
                } else {
                    failed += 1;
                    if failed > self.config.max_fail_count {
                        break;
                    }
                }
            }
            for fp in dead {
                if let Some(idx) = self.index.remove(&fp) {
                    self.stats.unused += entry_len(&self.data, idx.start());
                    self.stats.evictions += 1;
                    removed += 1;
                    self.notify_remove(idx.start());
                }
            }
        }

        if removed > 0 {
            trace!(removed, "evictor sweep reclaimed expired entries");
        }
    }

    /// Compacts once dead bytes pass both configured thresholds.
    fn compact_if_needed(&mut self) {
        let len = self.data.len();
        if len == 0 || self.stats.unused < self.config.migrate_delta {
            return;
        }
        if (self.stats.unused as f64) / (len as f64) < self.config.migrate_ratio {
            return;
        }
        self.migrate();
    }

    /// Fires the removal callback with the entry stored at `start`.
    fn notify_remove(&self, start: usize) {
        if let Some(callback) = &self.config.on_remove {
            let (key, val, _) = decode_entry(&self.data, start);
            callback(key, val);
        }
    }
}

/// Appends `uvarint(klen) || uvarint(vlen) || key || val` and returns the
/// record's starting offset.
fn append_entry(data: &mut Vec<u8>, key: &[u8], val: &[u8]) -> usize {
    let start = data.len();
    let mut header = unsigned_varint::encode::usize_buffer();
    data.extend_from_slice(unsigned_varint::encode::usize(key.len(), &mut header));
    data.extend_from_slice(unsigned_varint::encode::usize(val.len(), &mut header));
    data.extend_from_slice(key);
    data.extend_from_slice(val);
    start
}

/// Decodes the record at `start` into `(key, value, encoded length)`.
///
/// Offsets come from the index maps, so a malformed record here means the
/// log and index disagree; that coherence is load-bearing and violations
/// abort.
fn decode_entry(data: &[u8], start: usize) -> (&[u8], &[u8], usize) {
    let (klen, rest) = unsigned_varint::decode::usize(&data[start..]).expect("entry header");
    let (vlen, rest) = unsigned_varint::decode::usize(rest).expect("entry header");
    let header_len = data.len() - start - rest.len();
    let key = &rest[..klen];
    let val = &rest[klen..klen + vlen];
    (key, val, header_len + klen + vlen)
}

/// Encoded length of the record at `start`.
fn entry_len(data: &[u8], start: usize) -> usize {
    decode_entry(data, start).2
}
