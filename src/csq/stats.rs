/*!
 * Queue Statistics
 */

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of a cancel-safe queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsqStats {
    pub inserted: u64,
    pub dequeued: u64,
    pub cancelled: u64,
    pub rejected: u64,
    pub pending: usize,
    pub closed: bool,
    pub ordering: String,
}

/// Relaxed counters; exact only at quiescence
#[derive(Debug, Default)]
#[repr(C, align(64))]
pub(super) struct CsqCounters {
    inserted: AtomicU64,
    dequeued: AtomicU64,
    cancelled: AtomicU64,
    rejected: AtomicU64,
}

impl CsqCounters {
    #[inline]
    pub(super) fn record_inserted(&self) {
        self.inserted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(super) fn record_dequeued(&self) {
        self.dequeued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(super) fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(super) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn snapshot(&self, pending: usize, closed: bool, ordering: &str) -> CsqStats {
        CsqStats {
            inserted: self.inserted.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            pending,
            closed,
            ordering: ordering.to_string(),
        }
    }
}
