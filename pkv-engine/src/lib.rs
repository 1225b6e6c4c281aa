//! # PackKV Engine
//!
//! Sharded, expiration-aware in-memory byte cache. Keys and values are
//! arbitrary byte strings; each bucket keeps its entries in one packed log
//! indexed by a 64-bit key fingerprint, evicts expired entries amortized
//! across writes, and compacts the log once dead bytes pass a threshold.
//!
//! ## Usage
//!
//! ```
//! use pkv_engine::{Cache, Options};
//!
//! let cache = Cache::new(Options::default()).expect("valid options");
//! cache.set(b"alpha", b"value");
//! assert_eq!(cache.get(b"alpha"), Some((b"value".to_vec(), 0)));
//!
//! cache.remove(b"alpha");
//! assert_eq!(cache.get(b"alpha"), None);
//! ```
//!
//! ## Structure Overview
//!
//! ```text
//! Cache
//!   └── buckets: Vec<RwLock<Bucket>>      shard hash picks one
//!         └── Bucket
//!               ├── data (packed log)     pool-backed byte buffer
//!               ├── index                 fingerprint -> Idx(start, ttl)
//!               └── conflict              full key -> Idx, collision spillover
//! clock: lock-free wall-clock cells, refreshed by a background ticker
//! ```

mod bucket;
mod cache;
pub mod clock;
mod idx;
mod options;
mod pool;

pub use cache::Cache;
pub use idx::Idx;
pub use options::{HashFn, Options, RemoveCallback};
pub use pool::BufferPool;

// Re-export the shared leaf types so callers need only this crate.
pub use pkv_common::{CacheStats, PkvError, PkvResult};
