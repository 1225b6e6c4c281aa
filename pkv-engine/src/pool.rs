//! # Buffer Pool
//!
//! Purpose: Recycle the large byte buffers that back bucket logs so that
//! compactions trade buffers instead of hitting the allocator.
//!
//! ## Design Principles
//! 1. **Size Classes**: Power-of-two classes from 4 KiB to 32 MiB keep the
//!    free lists small and make class selection a shift.
//! 2. **Bounded Idle Set**: Each class keeps at most a handful of buffers;
//!    the rest are dropped rather than hoarded.
//! 3. **Minimal Locking**: One mutex per class, held only to move a buffer.
//! 4. **Graceful Overflow**: Requests past the largest class fall back to a
//!    plain allocation; correctness never depends on reuse.

use parking_lot::Mutex;

/// Smallest class is 4 KiB.
const MIN_CLASS_SHIFT: u32 = 12;
/// Largest class is 32 MiB.
const MAX_CLASS_SHIFT: u32 = 25;
const CLASS_COUNT: usize = (MAX_CLASS_SHIFT - MIN_CLASS_SHIFT + 1) as usize;

/// Idle buffers retained per class.
const MAX_IDLE_PER_CLASS: usize = 8;

/// Size-classed pool of reusable byte buffers.
///
/// Shared across all buckets of a cache; thread-safe.
pub struct BufferPool {
    classes: Vec<Mutex<Vec<Vec<u8>>>>,
}

impl BufferPool {
    /// Creates an empty pool with all size classes present.
    pub fn new() -> Self {
        BufferPool {
            classes: (0..CLASS_COUNT).map(|_| Mutex::new(Vec::new())).collect(),
        }
    }

    /// Returns an empty buffer with `capacity >= min_size`.
    ///
    /// Pops a recycled buffer from the matching class when one is idle,
    /// otherwise allocates a fresh buffer of the class size. Requests larger
    /// than the biggest class are allocated directly and never recycled.
    pub fn get(&self, min_size: usize) -> Vec<u8> {
        let (class, size) = match class_for(min_size) {
            Some(found) => found,
            None => return Vec::with_capacity(min_size),
        };

        let mut idle = self.classes[class].lock();
        match idle.pop() {
            Some(buf) => buf,
            None => Vec::with_capacity(size),
        }
    }

    /// Returns a buffer to the pool for reuse.
    ///
    /// Buffers whose capacity no longer matches a class (for example after an
    /// in-place growth) and buffers beyond the per-class idle cap are dropped.
    pub fn put(&self, mut buf: Vec<u8>) {
        let capacity = buf.capacity();
        if !capacity.is_power_of_two() {
            return;
        }
        let shift = capacity.trailing_zeros();
        if !(MIN_CLASS_SHIFT..=MAX_CLASS_SHIFT).contains(&shift) {
            return;
        }

        let mut idle = self.classes[(shift - MIN_CLASS_SHIFT) as usize].lock();
        if idle.len() < MAX_IDLE_PER_CLASS {
            buf.clear();
            idle.push(buf);
        }
    }
}

/// Maps a minimum size to `(class index, class capacity)`.
fn class_for(min_size: usize) -> Option<(usize, usize)> {
    let size = min_size.max(1 << MIN_CLASS_SHIFT).next_power_of_two();
    let shift = size.trailing_zeros();
    if shift > MAX_CLASS_SHIFT {
        return None;
    }
    Some(((shift - MIN_CLASS_SHIFT) as usize, size))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_rounds_up_to_class_capacity() {
        let pool = BufferPool::new();
        let buf = pool.get(100);
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), 4096);

        let buf = pool.get(5_000);
        assert_eq!(buf.capacity(), 8192);
    }

    #[test]
    fn put_then_get_reuses_the_buffer() {
        let pool = BufferPool::new();
        let mut buf = pool.get(4096);
        buf.extend_from_slice(b"scratch");
        pool.put(buf);

        let buf = pool.get(4096);
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), 4096);
    }

    #[test]
    fn oversized_requests_bypass_the_classes() {
        let pool = BufferPool::new();
        let huge = 1 << 26;
        let buf = pool.get(huge);
        assert!(buf.capacity() >= huge);

        // Returning it is a no-op; the next get allocates again.
        pool.put(buf);
        let buf = pool.get(huge);
        assert!(buf.capacity() >= huge);
    }

    #[test]
    fn odd_capacity_buffers_are_dropped_on_put() {
        let pool = BufferPool::new();
        // Not a power of two, so no class will accept it.
        pool.put(Vec::with_capacity(5_000));

        let buf = pool.get(4096);
        assert_eq!(buf.capacity(), 4096);

        let buf = pool.get(5_000);
        assert_eq!(buf.capacity(), 8192);
    }
}
