/*!
 * Deferred Work Dispatcher
 *
 * Two execution classes:
 *
 * ```text
 *   schedule_immediate ──► SpinLock<VecDeque> ──► immediate thread (serialized)
 *   schedule_on_pool ────► WorkerPool::submit ──► N workers (by WorkClass)
 * ```
 *
 * Items scheduled while running are re-enqueued by the thread that ran them,
 * once the routine returns.
 */

use super::item::{Claim, Deferred, DeferredItem, Importance, Target};
use super::pool::{Job, ThreadPool, WorkClass, WorkerPool};
use super::stats::{DispatcherCounters, DispatcherStats};
use crate::core::config::IoConfig;
use crate::core::errors::{DispatchError, DispatchResult, IoError, IoResult};
use crate::core::limits::{IMMEDIATE_IDLE_PARK, IMMEDIATE_QUEUE_WARN_DEPTH};
use crate::core::sync::{Event, SpinLock, SyncConfig};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};
use tracing::{debug, error, info, warn};

enum Entry {
    Item(Arc<dyn Deferred>),
    /// Signalled when the immediate thread reaches it
    Barrier(Arc<Event>),
}

#[derive(Default)]
struct ImmediateQueue {
    entries: VecDeque<Entry>,
    /// Set by the immediate thread, under the lock, when it exits
    closed: bool,
}

impl ImmediateQueue {
    fn push(&mut self, item: Arc<dyn Deferred>) -> usize {
        if item.core().importance() == Importance::High {
            self.entries.push_front(Entry::Item(item));
        } else {
            self.entries.push_back(Entry::Item(item));
        }
        self.entries.len()
    }
}

/// Where an accepted re-run ended up
enum Requeued {
    Queued,
    /// No context will pick it up; the caller runs it
    Inline(Target),
}

struct Shared {
    immediate: SpinLock<ImmediateQueue>,
    wake: Event,
    pool: Arc<dyn WorkerPool>,
    shut_down: AtomicBool,
    immediate_thread: OnceLock<ThreadId>,
    counters: DispatcherCounters,
}

impl Shared {
    fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Place an entry for a freshly claimed item
    fn enqueue(self: &Arc<Self>, item: Arc<dyn Deferred>, target: Target) -> DispatchResult<()> {
        match target {
            Target::Immediate => {
                let depth = {
                    let mut queue = self.immediate.lock();
                    // Decided under the lock the immediate thread exits under
                    if self.is_shut_down() {
                        return Err(DispatchError::ShutDown);
                    }
                    queue.push(item)
                };
                self.after_push(depth);
                Ok(())
            }
            Target::Pool(class) => self.submit_to_pool(item, class),
        }
    }

    /// Place a re-run accepted while the item was running
    ///
    /// Ignores shutdown: a re-run reported as `Ok(true)` still happens.
    fn requeue(self: &Arc<Self>, item: Arc<dyn Deferred>, target: Target) -> Requeued {
        match target {
            Target::Immediate => {
                let depth = {
                    let mut queue = self.immediate.lock();
                    if queue.closed {
                        return Requeued::Inline(target);
                    }
                    queue.push(item)
                };
                self.after_push(depth);
                Requeued::Queued
            }
            Target::Pool(class) => match self.submit_to_pool(item, class) {
                Ok(()) => Requeued::Queued,
                Err(_) => Requeued::Inline(target),
            },
        }
    }

    fn after_push(&self, depth: usize) {
        if depth == IMMEDIATE_QUEUE_WARN_DEPTH {
            warn!(depth, "Immediate queue is deep, a routine may be blocking");
        }
        self.wake.set();
    }

    fn submit_to_pool(self: &Arc<Self>, item: Arc<dyn Deferred>, class: WorkClass) -> DispatchResult<()> {
        let shared = Arc::clone(self);
        self.pool.submit(
            Box::new(move || shared.run(item, Target::Pool(class))),
            class,
        )
    }

    /// Execute one dequeued entry, plus any re-run nobody else can take
    fn run(self: &Arc<Self>, item: Arc<dyn Deferred>, target: Target) {
        let core = item.core();
        if !core.begin_run(target) {
            self.counters.record_stale();
            return;
        }

        loop {
            if catch_unwind(AssertUnwindSafe(|| item.invoke())).is_err() {
                self.counters.record_panicked();
                error!(item = core.id(), "Deferred routine panicked");
            }
            self.counters.record_executed();

            let Some(next) = core.finish_run() else {
                return;
            };
            debug!(item = core.id(), ?next, "Re-running deferred item");
            match self.requeue(Arc::clone(&item), next) {
                Requeued::Queued => return,
                Requeued::Inline(next) => {
                    debug!(item = core.id(), "Context stopped, re-running inline");
                    if !core.begin_run(next) {
                        self.counters.record_stale();
                        return;
                    }
                }
            }
        }
    }

    fn immediate_loop(self: Arc<Self>) {
        let _ = self.immediate_thread.set(thread::current().id());
        info!("Immediate context started");

        loop {
            let entry = {
                let mut queue = self.immediate.lock();
                match queue.entries.pop_front() {
                    Some(entry) => Some(entry),
                    None if self.is_shut_down() => {
                        queue.closed = true;
                        break;
                    }
                    None => None,
                }
            };
            match entry {
                Some(Entry::Item(item)) => self.run(item, Target::Immediate),
                Some(Entry::Barrier(event)) => {
                    event.set();
                }
                None => {
                    self.wake.wait_timeout(IMMEDIATE_IDLE_PARK);
                }
            }
        }

        info!("Immediate context stopped");
    }
}

/// Deferred work dispatcher
///
/// # Examples
///
/// ```
/// use driver_io_core::deferred::{DeferredItem, Dispatcher};
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let dispatcher = Dispatcher::with_threads(2).unwrap();
/// let item = DeferredItem::new(AtomicUsize::new(0), |hits: &AtomicUsize| {
///     hits.fetch_add(1, Ordering::SeqCst);
/// });
///
/// assert_eq!(dispatcher.schedule_immediate(&item), Ok(true));
/// dispatcher.flush_immediate();
/// assert_eq!(item.context().load(Ordering::SeqCst), 1);
/// dispatcher.shutdown();
/// ```
pub struct Dispatcher {
    shared: Arc<Shared>,
    immediate_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Dispatcher with a [`ThreadPool`] sized by `config`
    pub fn start(config: &IoConfig) -> IoResult<Self> {
        config.validate()?;
        let pool = ThreadPool::new(config.worker_threads, &config.thread_name_prefix)?;
        Self::with_pool(Arc::new(pool), &config.thread_name_prefix, config.sync)
    }

    /// Dispatcher with a default-named [`ThreadPool`] of `threads` workers
    pub fn with_threads(threads: usize) -> IoResult<Self> {
        Self::start(&IoConfig::default().with_worker_threads(threads))
    }

    /// Dispatcher over a caller-supplied pool
    pub fn with_pool(
        pool: Arc<dyn WorkerPool>,
        name_prefix: &str,
        sync: SyncConfig,
    ) -> IoResult<Self> {
        let shared = Arc::new(Shared {
            immediate: SpinLock::with_config(ImmediateQueue::default(), sync),
            wake: Event::synchronization(),
            pool,
            shut_down: AtomicBool::new(false),
            immediate_thread: OnceLock::new(),
            counters: DispatcherCounters::default(),
        });

        let name = format!("{}-immediate", name_prefix);
        let runner = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || runner.immediate_loop())
            .map_err(|e| IoError::ThreadSpawn(name, e.to_string()))?;

        info!(pool = shared.pool.name(), "Deferred dispatcher started");
        Ok(Self {
            shared,
            immediate_handle: Mutex::new(Some(handle)),
        })
    }

    /// Queue `item` on the serialized immediate context
    ///
    /// Returns `Ok(true)` when a run was queued (or a re-run marked for a
    /// running item), `Ok(false)` when folded into a pending run.
    pub fn schedule_immediate<C>(&self, item: &DeferredItem<C>) -> DispatchResult<bool>
    where
        C: Send + Sync + 'static,
    {
        self.schedule(item, Target::Immediate)
    }

    /// Queue `item` on the worker pool
    pub fn schedule_on_pool<C>(&self, item: &DeferredItem<C>, class: WorkClass) -> DispatchResult<bool>
    where
        C: Send + Sync + 'static,
    {
        self.schedule(item, Target::Pool(class))
    }

    fn schedule<C>(&self, item: &DeferredItem<C>, target: Target) -> DispatchResult<bool>
    where
        C: Send + Sync + 'static,
    {
        if self.shared.is_shut_down() {
            return Err(DispatchError::ShutDown);
        }

        let claim = match item.core().claim(target) {
            Ok(claim) => claim,
            Err(e) => {
                self.shared.counters.record_rejected();
                return Err(e);
            }
        };

        match claim {
            Claim::Coalesced => {
                self.shared.counters.record_coalesced();
                Ok(false)
            }
            Claim::RerunPending => {
                self.shared.counters.record_scheduled();
                debug!(item = item.id(), "Re-run marked for running item");
                Ok(true)
            }
            Claim::Enqueue => {
                if let Err(e) = self.shared.enqueue(item.erased(), target) {
                    item.core().abandon();
                    return Err(e);
                }
                self.shared.counters.record_scheduled();
                Ok(true)
            }
        }
    }

    /// Run a one-shot job on the worker pool
    pub fn run_on_pool(&self, job: Job, class: WorkClass) -> DispatchResult<()> {
        if self.shared.is_shut_down() {
            return Err(DispatchError::ShutDown);
        }
        self.shared.pool.submit(job, class)
    }

    /// Withdraw a pending run that has not started
    ///
    /// Returns whether a run was pending. A routine already executing is not
    /// interrupted.
    pub fn remove_queued<C>(&self, item: &DeferredItem<C>) -> bool {
        let removed = item.core().withdraw();
        if removed {
            self.shared.counters.record_removed();
            debug!(item = item.id(), "Deferred item withdrawn");
        }
        removed
    }

    /// Block until every entry queued on the immediate context before this
    /// call has been processed
    ///
    /// Returns at once when called from the immediate context itself or
    /// after shutdown.
    pub fn flush_immediate(&self) {
        if self.is_immediate_context() {
            warn!("flush_immediate called from the immediate context");
            return;
        }
        if self.shared.is_shut_down() {
            return;
        }

        let barrier = Arc::new(Event::notification());
        {
            let mut queue = self.shared.immediate.lock();
            if queue.closed {
                return;
            }
            queue.entries.push_back(Entry::Barrier(Arc::clone(&barrier)));
        }
        self.shared.wake.set();

        // The immediate thread only exits on an empty queue, so the barrier
        // is always reached
        barrier.wait();
    }

    /// Whether the caller is running on the immediate context thread
    pub fn is_immediate_context(&self) -> bool {
        self.shared.immediate_thread.get() == Some(&thread::current().id())
    }

    /// Stop accepting work, drain the immediate context and stop the pool
    pub fn shutdown(&self) {
        if self.shared.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.wake.set();

        if let Some(handle) = self.immediate_handle.lock().take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                warn!("Immediate context terminated abnormally");
            }
        }
        self.shared.pool.shutdown();
        info!("Deferred dispatcher stopped");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.is_shut_down()
    }

    pub fn stats(&self) -> DispatcherStats {
        let depth = self.shared.immediate.lock().entries.len();
        self.shared
            .counters
            .snapshot(depth, self.shared.pool.name(), self.shared.is_shut_down())
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pool", &self.shared.pool.name())
            .field("shut_down", &self.shared.is_shut_down())
            .finish()
    }
}
