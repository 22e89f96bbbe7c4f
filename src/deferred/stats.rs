/*!
 * Dispatcher Statistics
 */

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time dispatcher counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherStats {
    /// Runs queued (including re-runs marked on running items)
    pub scheduled: u64,
    /// Schedules folded into a pending run
    pub coalesced: u64,
    /// Schedules refused by reject-mode items
    pub rejected: u64,
    /// Pending runs withdrawn through `remove_queued`
    pub removed: u64,
    pub executed: u64,
    pub panicked: u64,
    /// Queue entries skipped because the item was withdrawn or already ran
    pub stale_skipped: u64,
    /// Entries waiting on the immediate context
    pub immediate_depth: usize,
    pub pool: String,
    pub shut_down: bool,
}

#[derive(Debug, Default)]
#[repr(C, align(64))]
pub(super) struct DispatcherCounters {
    scheduled: AtomicU64,
    coalesced: AtomicU64,
    rejected: AtomicU64,
    removed: AtomicU64,
    executed: AtomicU64,
    panicked: AtomicU64,
    stale_skipped: AtomicU64,
}

impl DispatcherCounters {
    #[inline]
    pub(super) fn record_scheduled(&self) {
        self.scheduled.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(super) fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(super) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(super) fn record_removed(&self) {
        self.removed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(super) fn record_executed(&self) {
        self.executed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(super) fn record_panicked(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(super) fn record_stale(&self) {
        self.stale_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn snapshot(&self, immediate_depth: usize, pool: &str, shut_down: bool) -> DispatcherStats {
        DispatcherStats {
            scheduled: self.scheduled.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            stale_skipped: self.stale_skipped.load(Ordering::Relaxed),
            immediate_depth,
            pool: pool.to_string(),
            shut_down,
        }
    }
}
