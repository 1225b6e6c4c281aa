//! # Error Types
//!
//! Purpose: Report configuration mistakes at cache construction time.
//!
//! ## Design Principles
//! 1. **Construction-Only Failures**: The engine has no I/O, so the only
//!    recoverable errors are bad options rejected before any bucket exists.
//! 2. **Misses Are Not Errors**: Lookups of absent or expired keys return
//!    `Option`/`bool`, never an error value.
//! 3. **Contract Violations Panic**: Offset overflow and negative deadlines
//!    are programmer errors and abort at the call site instead.

use thiserror::Error;

/// Result alias used across the PackKV crates.
pub type PkvResult<T> = Result<T, PkvError>;

/// Errors detectable when a cache is constructed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PkvError {
    /// The shard count was zero or not a power of two.
    #[error("shard count must be a positive power of two, got {0}")]
    InvalidShardCount(usize),

    /// The compaction ratio was outside `(0.0, 1.0]`.
    #[error("migrate ratio must be within (0.0, 1.0], got {0}")]
    InvalidMigrateRatio(f64),

    /// The evictor interval was zero.
    #[error("evict interval must be positive")]
    InvalidEvictInterval,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_bad_value() {
        let err = PkvError::InvalidShardCount(3);
        assert_eq!(
            err.to_string(),
            "shard count must be a positive power of two, got 3"
        );

        let err = PkvError::InvalidMigrateRatio(1.5);
        assert!(err.to_string().contains("1.5"));
    }
}
