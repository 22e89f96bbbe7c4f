/*!
 * Remove Lock
 *
 * Reference count + removing flag + drain signal packed for lock-free use.
 *
 * The count and the flag share one word, `(count << 1) | REMOVING`, so
 * "check the flag, then pin" is a single CAS and can never pin a resource
 * whose removal already began.
 */

use super::token::RemoveLockToken;
use super::tracking::{HolderRecord, HolderTable};
use crate::core::config::RemoveLockOptions;
use crate::core::errors::{ProtocolViolation, RemoveLockError, RemoveLockResult};
use crate::core::sync::interlocked::{compare_exchange, or};
use crate::core::sync::{Backoff, Event, SyncConfig};
use crate::core::types::Tag;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

const REMOVING: u64 = 1;
const ONE_REF: u64 = 2;

/// Untagged acquisitions are recorded under this tag
pub const UNTAGGED: Tag = 0;

/// Lifecycle of the guarded resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoveLockState {
    /// Acquisitions succeed
    Active,
    /// Removal started; waiting for outstanding references
    Draining,
    /// Every reference released after removal began (terminal)
    Removed,
}

pub(super) struct Inner {
    word: AtomicU64,
    drained: Event,
    drained_notify: Notify,
    holders: Option<HolderTable>,
    options: RemoveLockOptions,
    sync: SyncConfig,
}

impl Inner {
    fn acquire(self: &Arc<Self>, count: u64, tag: Tag) -> RemoveLockResult<RemoveLockToken> {
        assert!(count > 0, "remove lock acquire count must be non-zero");
        let delta = match count.checked_mul(ONE_REF) {
            Some(delta) => delta,
            None => panic!("remove lock acquire count {} overflows the counter", count),
        };

        let mut backoff = Backoff::new(self.sync);
        let mut current = self.word.load(Ordering::SeqCst);
        let outstanding = loop {
            if current & REMOVING != 0 {
                debug!(tag, "Remove lock acquire refused, removal in progress");
                return Err(RemoveLockError::AlreadyRemoving);
            }

            let next = match current.checked_add(delta) {
                Some(next) => next,
                None => panic!("remove lock reference count overflow"),
            };
            let observed = compare_exchange(&self.word, next, current);
            if observed == current {
                break next >> 1;
            }
            current = observed;
            backoff.spin();
        };

        let high_watermark = self.options.high_watermark as u64;
        if high_watermark > 0 && outstanding > high_watermark {
            warn!(
                tag,
                outstanding,
                high_watermark,
                "Remove lock references above high watermark"
            );
        }

        let serial = self.holders.as_ref().map(|table| table.record(tag, count));
        Ok(RemoveLockToken::new(Arc::clone(self), count, tag, serial))
    }

    pub(super) fn release(&self, count: u64, serial: Option<u64>) {
        if let (Some(table), Some(serial)) = (self.holders.as_ref(), serial) {
            table.forget(serial);
        }

        let delta = count * ONE_REF;
        let mut backoff = Backoff::new(self.sync);
        let mut current = self.word.load(Ordering::SeqCst);
        let next = loop {
            if current >> 1 < count {
                panic!("{}", ProtocolViolation::DoubleRelease);
            }
            let next = current - delta;
            let observed = compare_exchange(&self.word, next, current);
            if observed == current {
                break next;
            }
            current = observed;
            backoff.spin();
        };

        // Count hit zero after removal began: no acquire can follow, so this
        // transition happens at most once.
        if next == REMOVING {
            self.signal_drained();
        }
    }

    fn begin_remove(&self) {
        let previous = or(&self.word, REMOVING);
        if previous & REMOVING != 0 {
            panic!("{}", ProtocolViolation::DoubleBeginRemove);
        }

        let outstanding = previous >> 1;
        info!(outstanding, "Remove lock draining");
        if outstanding == 0 {
            self.signal_drained();
        }
    }

    fn signal_drained(&self) {
        let already = self.drained.set();
        debug_assert!(!already, "remove lock drain signalled twice");
        self.drained_notify.notify_waiters();
        info!("Remove lock drained");
    }

    #[inline]
    fn load(&self) -> u64 {
        self.word.load(Ordering::SeqCst)
    }
}

/// Remove lock guarding one resource's teardown
///
/// Cheap to clone: clones share the same counter. Tokens returned by
/// [`acquire`](Self::acquire) pin the resource until released or dropped.
///
/// # State machine
///
/// ```text
/// Active --begin_remove_and_wait--> Draining --count hits 0--> Removed
/// ```
///
/// # Examples
///
/// ```
/// use driver_io_core::remove_lock::RemoveLock;
///
/// let lock = RemoveLock::new();
/// let token = lock.acquire().expect("lock is active");
/// // ... touch the guarded resource ...
/// lock.release(token);
/// lock.begin_remove_and_wait();
/// assert!(lock.acquire().is_err());
/// ```
#[derive(Clone)]
pub struct RemoveLock {
    inner: Arc<Inner>,
}

impl RemoveLock {
    pub fn new() -> Self {
        Self::with_options(RemoveLockOptions::default(), SyncConfig::default())
    }

    pub fn with_options(options: RemoveLockOptions, sync: SyncConfig) -> Self {
        let holders = options
            .track_tags
            .then(|| HolderTable::new(options.max_held));
        Self {
            inner: Arc::new(Inner {
                word: AtomicU64::new(0),
                drained: Event::notification(),
                drained_notify: Notify::new(),
                holders,
                options,
                sync,
            }),
        }
    }

    /// Pin the resource
    ///
    /// Fails with `AlreadyRemoving`, without side effects, once removal began.
    #[inline]
    pub fn acquire(&self) -> RemoveLockResult<RemoveLockToken> {
        self.inner.acquire(1, UNTAGGED)
    }

    /// Pin the resource under a diagnostic tag
    #[inline]
    pub fn acquire_tagged(&self, tag: Tag) -> RemoveLockResult<RemoveLockToken> {
        self.inner.acquire(1, tag)
    }

    /// Pin `count` references with one token, released together
    ///
    /// # Panics
    ///
    /// If `count` is zero.
    #[inline]
    pub fn acquire_many(&self, count: u64) -> RemoveLockResult<RemoveLockToken> {
        self.inner.acquire(count, UNTAGGED)
    }

    /// Release a token issued by this lock
    ///
    /// Signals drain completion if this was the last reference after removal
    /// began.
    ///
    /// # Panics
    ///
    /// If the token was issued by a different lock.
    pub fn release(&self, token: RemoveLockToken) {
        self.assert_owns(&token);
        token.release();
    }

    /// Start removal and block until every outstanding reference is released
    ///
    /// # Panics
    ///
    /// If removal was already started on this lock.
    pub fn begin_remove_and_wait(&self) {
        self.inner.begin_remove();
        self.inner.drained.wait();
    }

    /// Start removal, release the caller's own token, and wait for the drain
    ///
    /// For callers that pinned the resource while deciding to remove it.
    pub fn release_and_wait(&self, token: RemoveLockToken) {
        self.assert_owns(&token);
        self.inner.begin_remove();
        token.release();
        self.inner.drained.wait();
    }

    /// Async variant of [`begin_remove_and_wait`](Self::begin_remove_and_wait)
    pub async fn begin_remove_and_wait_async(&self) {
        self.inner.begin_remove();
        self.wait_removed_async().await;
    }

    /// Wait (async) until the lock reaches `Removed`
    pub async fn wait_removed_async(&self) {
        loop {
            // Register before checking so a concurrent signal is not lost
            let notified = self.inner.drained_notify.notified();
            if self.inner.drained.is_set() {
                return;
            }
            notified.await;
        }
    }

    /// Wait up to `timeout` for the lock to reach `Removed`
    ///
    /// Does not start removal. Returns `true` once drained.
    pub fn wait_removed(&self, timeout: Duration) -> bool {
        self.inner.drained.wait_timeout(timeout)
    }

    pub fn state(&self) -> RemoveLockState {
        if self.inner.load() & REMOVING == 0 {
            RemoveLockState::Active
        } else if self.inner.drained.is_set() {
            RemoveLockState::Removed
        } else {
            RemoveLockState::Draining
        }
    }

    #[inline]
    pub fn is_removing(&self) -> bool {
        self.inner.load() & REMOVING != 0
    }

    /// Outstanding references
    #[inline]
    pub fn io_count(&self) -> u64 {
        self.inner.load() >> 1
    }

    pub fn options(&self) -> &RemoveLockOptions {
        &self.inner.options
    }

    /// Outstanding tracked holders, oldest first (empty when untracked)
    pub fn outstanding_tags(&self) -> Vec<HolderRecord> {
        self.inner
            .holders
            .as_ref()
            .map(HolderTable::snapshot)
            .unwrap_or_default()
    }

    /// Tracked holders pinned longer than the configured maximum
    pub fn stale_holders(&self) -> Vec<HolderRecord> {
        self.stale_holders_at(Instant::now())
    }

    pub fn stale_holders_at(&self, now: Instant) -> Vec<HolderRecord> {
        self.inner
            .holders
            .as_ref()
            .map(|table| table.stale(now))
            .unwrap_or_default()
    }

    /// Whether `token` was issued by this lock
    #[inline]
    pub fn owns(&self, token: &RemoveLockToken) -> bool {
        Arc::ptr_eq(&self.inner, token.issuer())
    }

    fn assert_owns(&self, token: &RemoveLockToken) {
        if !self.owns(token) {
            panic!("{}", ProtocolViolation::ForeignToken);
        }
    }
}

impl Default for RemoveLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RemoveLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoveLock")
            .field("state", &self.state())
            .field("io_count", &self.io_count())
            .field("tracked", &self.inner.holders.is_some())
            .finish()
    }
}
