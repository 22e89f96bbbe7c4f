/*!
 * Holder Tracking
 *
 * Optional table of outstanding remove lock references, keyed by token
 * serial. Diagnostics only: it never influences acquire/release outcomes.
 */

use crate::core::id::{IdGenerator, SerialGenerator};
use crate::core::types::Tag;
use ahash::RandomState;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::warn;

/// One outstanding tracked token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HolderRecord {
    pub tag: Tag,
    /// References pinned by the token
    pub count: u64,
    pub acquired_at: Instant,
}

impl HolderRecord {
    #[inline]
    pub fn held_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.acquired_at)
    }
}

pub(super) struct HolderTable {
    holders: DashMap<u64, HolderRecord, RandomState>,
    serials: SerialGenerator,
    max_held: Duration,
}

impl HolderTable {
    pub(super) fn new(max_held: Duration) -> Self {
        Self {
            holders: DashMap::with_hasher(RandomState::new()),
            serials: SerialGenerator::default_start(),
            max_held,
        }
    }

    /// Record a new holder, returning its serial
    pub(super) fn record(&self, tag: Tag, count: u64) -> u64 {
        let serial = self.serials.next();
        self.holders.insert(
            serial,
            HolderRecord {
                tag,
                count,
                acquired_at: Instant::now(),
            },
        );
        serial
    }

    pub(super) fn forget(&self, serial: u64) -> Option<HolderRecord> {
        self.holders.remove(&serial).map(|(_, record)| record)
    }

    pub(super) fn snapshot(&self) -> Vec<HolderRecord> {
        let mut records: Vec<_> = self.holders.iter().map(|entry| *entry.value()).collect();
        records.sort_by_key(|record| record.acquired_at);
        records
    }

    /// Holders pinned longer than `max_held`, oldest first
    pub(super) fn stale(&self, now: Instant) -> Vec<HolderRecord> {
        let stale: Vec<_> = self
            .snapshot()
            .into_iter()
            .filter(|record| record.held_for(now) > self.max_held)
            .collect();

        for record in &stale {
            warn!(
                tag = record.tag,
                count = record.count,
                held_ms = record.held_for(now).as_millis() as u64,
                "Remove lock holder exceeded max held duration"
            );
        }
        stale
    }

    pub(super) fn len(&self) -> usize {
        self.holders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_forget() {
        let table = HolderTable::new(Duration::from_secs(60));
        let a = table.record(1, 1);
        let b = table.record(2, 3);
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);

        let record = table.forget(b).unwrap();
        assert_eq!(record.tag, 2);
        assert_eq!(record.count, 3);
        assert!(table.forget(b).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_stale_detection() {
        let table = HolderTable::new(Duration::from_millis(10));
        table.record(9, 1);
        let later = Instant::now() + Duration::from_millis(50);
        let stale = table.stale(later);
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].tag, 9);
        assert!(table.stale(Instant::now()).is_empty());
    }
}
