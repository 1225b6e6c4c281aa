// pkv-common - Shared types for PackKV
//
// This crate defines the error and statistics types shared between the
// engine and its drivers.

pub mod error;
pub mod stats;

// Re-export for convenience
pub use error::{PkvError, PkvResult};
pub use stats::CacheStats;
