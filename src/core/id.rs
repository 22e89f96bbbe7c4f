/*!
 * ID Generation
 * Request, lock and work item identities with optional recycling
 */

use super::types::RequestId;
use crossbeam_queue::SegQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// ============================================================================
// ID Generator Trait
// ============================================================================

/// Generic ID generator interface
pub trait IdGenerator<T> {
    /// Generate next ID
    fn next(&self) -> T;

    /// Return an ID for reuse
    ///
    /// Request ids must only be recycled once the request reached a terminal
    /// state (Completed or Cancelled).
    fn recycle(&self, id: T);

    /// Current counter value (for debugging)
    fn current(&self) -> T;
}

// ============================================================================
// Atomic Counter Generator
// ============================================================================

/// Lock-free monotonically increasing generator
///
/// Cache-line aligned to prevent false sharing with neighbouring counters.
#[repr(C, align(64))]
pub struct AtomicGenerator<T> {
    counter: Arc<AtomicU64>,
    _marker: std::marker::PhantomData<T>,
}

impl<T> AtomicGenerator<T> {
    #[inline]
    pub fn new(start: u64) -> Self {
        Self {
            counter: Arc::new(AtomicU64::new(start)),
            _marker: std::marker::PhantomData,
        }
    }

    #[inline]
    pub fn default_start() -> Self {
        Self::new(1)
    }
}

impl<T> Clone for AtomicGenerator<T> {
    fn clone(&self) -> Self {
        Self {
            counter: Arc::clone(&self.counter),
            _marker: std::marker::PhantomData,
        }
    }
}

impl IdGenerator<u64> for AtomicGenerator<u64> {
    #[inline]
    fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst)
    }

    #[inline]
    fn recycle(&self, _id: u64) {}

    #[inline]
    fn current(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

impl IdGenerator<RequestId> for AtomicGenerator<RequestId> {
    #[inline]
    fn next(&self) -> RequestId {
        RequestId(self.counter.fetch_add(1, Ordering::SeqCst))
    }

    #[inline]
    fn recycle(&self, _id: RequestId) {}

    #[inline]
    fn current(&self) -> RequestId {
        RequestId(self.counter.load(Ordering::Relaxed))
    }
}

// ============================================================================
// Recycling Generator
// ============================================================================

/// Request id generator with recycling
///
/// Recycled ids are handed out before fresh ones. Lock-free via `SegQueue`.
pub struct RecyclingGenerator {
    counter: Arc<AtomicU64>,
    free_list: Arc<SegQueue<RequestId>>,
}

impl RecyclingGenerator {
    #[inline]
    pub fn new(start: u64) -> Self {
        Self {
            counter: Arc::new(AtomicU64::new(start)),
            free_list: Arc::new(SegQueue::new()),
        }
    }

    #[inline]
    pub fn default_start() -> Self {
        Self::new(1)
    }

    /// Number of ids waiting for reuse
    pub fn recycled_len(&self) -> usize {
        self.free_list.len()
    }
}

impl Clone for RecyclingGenerator {
    fn clone(&self) -> Self {
        Self {
            counter: Arc::clone(&self.counter),
            free_list: Arc::clone(&self.free_list),
        }
    }
}

impl IdGenerator<RequestId> for RecyclingGenerator {
    #[inline]
    fn next(&self) -> RequestId {
        self.free_list
            .pop()
            .unwrap_or_else(|| RequestId(self.counter.fetch_add(1, Ordering::SeqCst)))
    }

    #[inline]
    fn recycle(&self, id: RequestId) {
        self.free_list.push(id);
    }

    #[inline]
    fn current(&self) -> RequestId {
        RequestId(self.counter.load(Ordering::Relaxed))
    }
}

/// Serial numbers for tracked remove lock holders
pub type SerialGenerator = AtomicGenerator<u64>;

/// Request id generator without recycling
pub type RequestIdGenerator = AtomicGenerator<RequestId>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_generator() {
        let gen = RequestIdGenerator::new(100);

        assert_eq!(gen.next(), RequestId(100));
        assert_eq!(gen.next(), RequestId(101));
        assert_eq!(gen.current(), RequestId(102));
    }

    #[test]
    fn test_recycling_generator() {
        let gen = RecyclingGenerator::default_start();

        let _id1 = gen.next();
        let id2 = gen.next();
        let _id3 = gen.next();

        gen.recycle(id2);
        assert_eq!(gen.recycled_len(), 1);

        assert_eq!(gen.next(), RequestId(2));
        assert_eq!(gen.next(), RequestId(4));
    }

    #[test]
    fn test_concurrent_generation() {
        use std::thread;

        let gen = Arc::new(SerialGenerator::new(1));
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let g = Arc::clone(&gen);
                thread::spawn(move || (0..100).map(|_| g.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut all_ids = vec![];
        for handle in handles {
            all_ids.extend(handle.join().unwrap());
        }

        all_ids.sort_unstable();
        all_ids.dedup();
        assert_eq!(all_ids.len(), 1000);
    }
}
