/*!
 * Deferred Items
 *
 * A routine plus its context, scheduled onto the immediate context or the
 * worker pool. All scheduling state lives in one atomic word:
 *
 * ```text
 *   bit 0      QUEUED   a run is pending
 *   bit 1      RUNNING  a thread is inside the routine
 *   bits 2..4  TARGET   where the pending run executes
 * ```
 *
 * A queue entry only runs the item when the word is exactly
 * `QUEUED | target`. Entries that no longer match (withdrawn, already run,
 * retargeted) are skipped, so an item never runs on two threads at once.
 */

use super::pool::WorkClass;
use crate::core::errors::{DispatchError, DispatchResult};
use crate::core::sync::interlocked;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

const QUEUED: u32 = 1 << 0;
const RUNNING: u32 = 1 << 1;
const TARGET_SHIFT: u32 = 2;
const TARGET_MASK: u32 = 0b11 << TARGET_SHIFT;

static NEXT_ITEM_ID: AtomicU64 = AtomicU64::new(1);

/// What repeated scheduling of a pending item does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleMode {
    /// Fold into the pending run (`Ok(false)`)
    #[default]
    Coalesce,
    /// Refuse with [`DispatchError::AlreadyQueued`]
    Reject,
}

/// Placement on the immediate context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    Low,
    #[default]
    Medium,
    /// Queued ahead of everything already waiting
    High,
}

/// Observable item state
///
/// The lifecycle is Idle → Queued → Running → Idle. `RunningRequeued` is
/// `Running` with exactly one further run already accepted; it leaves for
/// `Queued` when the current run returns. Use [`ItemState::is_running`] to
/// treat both running variants alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    Idle,
    Queued,
    Running,
    /// Running with one further run pending
    RunningRequeued,
}

impl ItemState {
    /// `Running` or `RunningRequeued`
    pub fn is_running(&self) -> bool {
        matches!(self, ItemState::Running | ItemState::RunningRequeued)
    }

    /// A further run has been accepted and not yet started
    pub fn rerun_pending(&self) -> bool {
        matches!(self, ItemState::Queued | ItemState::RunningRequeued)
    }
}

/// Execution context of a pending run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(super) enum Target {
    Immediate,
    Pool(WorkClass),
}

impl Target {
    fn encode(self) -> u32 {
        let raw = match self {
            Target::Immediate => 0,
            Target::Pool(WorkClass::HyperCritical) => 1,
            Target::Pool(WorkClass::Critical) => 2,
            Target::Pool(WorkClass::Delayed) => 3,
        };
        raw << TARGET_SHIFT
    }

    fn decode(word: u32) -> Self {
        match (word & TARGET_MASK) >> TARGET_SHIFT {
            0 => Target::Immediate,
            1 => Target::Pool(WorkClass::HyperCritical),
            2 => Target::Pool(WorkClass::Critical),
            _ => Target::Pool(WorkClass::Delayed),
        }
    }
}

/// Result of claiming the QUEUED bit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Claim {
    /// Idle before: the caller must enqueue an entry
    Enqueue,
    /// Running: the runner re-enqueues when it finishes
    RerunPending,
    /// Already pending, folded
    Coalesced,
}

/// Scheduling word shared by every item type
pub(super) struct ItemCore {
    id: u64,
    state: AtomicU32,
    mode: ScheduleMode,
    importance: Importance,
    runs: AtomicU64,
}

impl ItemCore {
    fn new(mode: ScheduleMode, importance: Importance) -> Self {
        Self {
            id: NEXT_ITEM_ID.fetch_add(1, Ordering::Relaxed),
            state: AtomicU32::new(0),
            mode,
            importance,
            runs: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(super) fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub(super) fn importance(&self) -> Importance {
        self.importance
    }

    /// Set QUEUED for a run on `target`
    pub(super) fn claim(&self, target: Target) -> DispatchResult<Claim> {
        let mut current = self.state.load(Ordering::SeqCst);
        loop {
            if current & QUEUED != 0 {
                return match self.mode {
                    ScheduleMode::Coalesce => Ok(Claim::Coalesced),
                    ScheduleMode::Reject => Err(DispatchError::AlreadyQueued),
                };
            }
            if current & RUNNING != 0 && self.mode == ScheduleMode::Reject {
                return Err(DispatchError::AlreadyQueued);
            }

            let next = (current & RUNNING) | QUEUED | target.encode();
            let previous = interlocked::compare_exchange(&self.state, next, current);
            if previous == current {
                return Ok(if current & RUNNING != 0 {
                    Claim::RerunPending
                } else {
                    Claim::Enqueue
                });
            }
            current = previous;
        }
    }

    /// Undo a claim that could not be enqueued
    pub(super) fn abandon(&self) {
        interlocked::and(&self.state, !(QUEUED | TARGET_MASK));
    }

    /// QUEUED on `target` → RUNNING; false for a stale entry
    pub(super) fn begin_run(&self, target: Target) -> bool {
        let expected = QUEUED | target.encode();
        interlocked::compare_exchange(&self.state, RUNNING | target.encode(), expected) == expected
    }

    /// Leave RUNNING; returns where a run requested meanwhile must go
    pub(super) fn finish_run(&self) -> Option<Target> {
        self.runs.fetch_add(1, Ordering::Relaxed);
        let previous = interlocked::and(&self.state, !RUNNING);
        (previous & QUEUED != 0).then(|| Target::decode(previous))
    }

    /// Clear a pending run
    pub(super) fn withdraw(&self) -> bool {
        let previous = interlocked::and(&self.state, !QUEUED);
        previous & QUEUED != 0
    }

    pub(super) fn state(&self) -> ItemState {
        let word = self.state.load(Ordering::SeqCst);
        match (word & QUEUED != 0, word & RUNNING != 0) {
            (false, false) => ItemState::Idle,
            (true, false) => ItemState::Queued,
            (false, true) => ItemState::Running,
            (true, true) => ItemState::RunningRequeued,
        }
    }
}

/// Type-erased item as held by the dispatcher queues
pub(super) trait Deferred: Send + Sync {
    fn core(&self) -> &ItemCore;

    fn invoke(&self);
}

struct ItemInner<C> {
    core: ItemCore,
    context: C,
    routine: Box<dyn Fn(&C) + Send + Sync>,
}

impl<C: Send + Sync> Deferred for ItemInner<C> {
    #[inline]
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn invoke(&self) {
        (self.routine)(&self.context)
    }
}

/// Reusable deferred routine bound to a context value
///
/// Cloning shares the same item: scheduling any clone affects them all.
///
/// # Examples
///
/// ```
/// use driver_io_core::deferred::{DeferredItem, ScheduleMode};
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let item = DeferredItem::builder(AtomicUsize::new(0), |hits: &AtomicUsize| {
///     hits.fetch_add(1, Ordering::SeqCst);
/// })
/// .mode(ScheduleMode::Reject)
/// .build();
///
/// assert_eq!(item.mode(), ScheduleMode::Reject);
/// assert_eq!(item.context().load(Ordering::SeqCst), 0);
/// ```
pub struct DeferredItem<C> {
    inner: Arc<ItemInner<C>>,
}

impl<C: Send + Sync + 'static> DeferredItem<C> {
    /// Coalescing, medium importance item
    pub fn new<F>(context: C, routine: F) -> Self
    where
        F: Fn(&C) + Send + Sync + 'static,
    {
        Self::builder(context, routine).build()
    }

    pub fn builder<F>(context: C, routine: F) -> DeferredItemBuilder<C>
    where
        F: Fn(&C) + Send + Sync + 'static,
    {
        DeferredItemBuilder {
            context,
            routine: Box::new(routine),
            mode: ScheduleMode::default(),
            importance: Importance::default(),
        }
    }

    pub(super) fn erased(&self) -> Arc<dyn Deferred> {
        self.inner.clone()
    }
}

impl<C> DeferredItem<C> {
    pub(super) fn core(&self) -> &ItemCore {
        &self.inner.core
    }

    pub fn id(&self) -> u64 {
        self.inner.core.id
    }

    pub fn context(&self) -> &C {
        &self.inner.context
    }

    pub fn mode(&self) -> ScheduleMode {
        self.inner.core.mode
    }

    pub fn importance(&self) -> Importance {
        self.inner.core.importance
    }

    pub fn state(&self) -> ItemState {
        self.inner.core.state()
    }

    pub fn is_queued(&self) -> bool {
        self.state().rerun_pending()
    }

    /// Completed runs so far
    pub fn run_count(&self) -> u64 {
        self.inner.core.runs.load(Ordering::Relaxed)
    }
}

impl<C> Clone for DeferredItem<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> fmt::Debug for DeferredItem<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredItem")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("mode", &self.mode())
            .field("importance", &self.importance())
            .field("runs", &self.run_count())
            .finish()
    }
}

/// Builder for [`DeferredItem`]
pub struct DeferredItemBuilder<C> {
    context: C,
    routine: Box<dyn Fn(&C) + Send + Sync>,
    mode: ScheduleMode,
    importance: Importance,
}

impl<C: Send + Sync + 'static> DeferredItemBuilder<C> {
    pub fn mode(mut self, mode: ScheduleMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn importance(mut self, importance: Importance) -> Self {
        self.importance = importance;
        self
    }

    pub fn build(self) -> DeferredItem<C> {
        DeferredItem {
            inner: Arc::new(ItemInner {
                core: ItemCore::new(self.mode, self.importance),
                context: self.context,
                routine: self.routine,
            }),
        }
    }
}
