/*!
 * Worker Pools
 *
 * Executors for pool-class deferred work. The dispatcher only needs
 * `submit(job, class)`; the class decides pickup order, never correctness.
 *
 * - [`ThreadPool`]: N named OS threads, one lock-free queue per class and a
 *   doorbell channel carrying one token per submitted job
 * - [`TokioPool`]: hands jobs to `tokio::task::spawn_blocking`
 */

use crate::core::errors::{DispatchError, DispatchResult, IoError, IoResult};
use crossbeam_queue::SegQueue;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Unit of pool work
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Pickup priority on the worker pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkClass {
    /// Picked up before anything else
    HyperCritical,
    #[default]
    Critical,
    /// Picked up when nothing more urgent waits
    Delayed,
}

impl WorkClass {
    /// Highest priority first
    pub const ALL: [WorkClass; 3] = [
        WorkClass::HyperCritical,
        WorkClass::Critical,
        WorkClass::Delayed,
    ];

    #[inline]
    fn index(self) -> usize {
        match self {
            WorkClass::HyperCritical => 0,
            WorkClass::Critical => 1,
            WorkClass::Delayed => 2,
        }
    }
}

/// Executor for pool-class deferred work
pub trait WorkerPool: Send + Sync {
    /// Queue `job`; fails once the pool is shut down
    fn submit(&self, job: Job, class: WorkClass) -> DispatchResult<()>;

    /// Stop accepting work and release pool threads
    ///
    /// Jobs submitted before the call still run.
    fn shutdown(&self);

    fn name(&self) -> &'static str;
}

// =============================================================================
// THREAD POOL
// =============================================================================

enum Doorbell {
    Ring,
    Stop,
}

struct PoolShared {
    queues: [SegQueue<Job>; 3],
    shut_down: AtomicBool,
    executed: AtomicU64,
    panicked: AtomicU64,
}

impl PoolShared {
    /// Highest-priority job available
    fn pop(&self) -> Option<Job> {
        WorkClass::ALL
            .iter()
            .find_map(|class| self.queues[class.index()].pop())
    }
}

/// Fixed set of OS worker threads
pub struct ThreadPool {
    shared: Arc<PoolShared>,
    doorbell: flume::Sender<Doorbell>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl ThreadPool {
    /// Spawn `threads` workers named `<prefix>-worker-<n>`
    pub fn new(threads: usize, name_prefix: &str) -> IoResult<Self> {
        if threads == 0 {
            return Err(IoError::InvalidConfig(
                "worker pool needs at least one thread".to_string(),
            ));
        }

        let shared = Arc::new(PoolShared {
            queues: [SegQueue::new(), SegQueue::new(), SegQueue::new()],
            shut_down: AtomicBool::new(false),
            executed: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
        });
        let (doorbell, bell_rx) = flume::unbounded();

        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let shared = Arc::clone(&shared);
            let bell_rx = bell_rx.clone();
            let name = format!("{}-worker-{}", name_prefix, index);
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_loop(shared, bell_rx))
                .map_err(|e| IoError::ThreadSpawn(name, e.to_string()))?;
            workers.push(handle);
        }

        info!(threads, "Worker pool started");
        Ok(Self {
            shared,
            doorbell,
            workers: Mutex::new(workers),
            size: threads,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Jobs waiting for a worker
    pub fn pending(&self) -> usize {
        self.shared.queues.iter().map(SegQueue::len).sum()
    }

    pub fn executed(&self) -> u64 {
        self.shared.executed.load(Ordering::Relaxed)
    }

    pub fn panicked(&self) -> u64 {
        self.shared.panicked.load(Ordering::Relaxed)
    }
}

fn worker_loop(shared: Arc<PoolShared>, bell_rx: flume::Receiver<Doorbell>) {
    debug!("Worker thread started");
    while let Ok(Doorbell::Ring) = bell_rx.recv() {
        // One token per pushed job, so a job is always available here
        let Some(job) = shared.pop() else {
            continue;
        };
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            shared.panicked.fetch_add(1, Ordering::Relaxed);
            error!("Worker job panicked");
        }
        shared.executed.fetch_add(1, Ordering::Relaxed);
    }
    debug!("Worker thread exiting");
}

impl WorkerPool for ThreadPool {
    fn submit(&self, job: Job, class: WorkClass) -> DispatchResult<()> {
        // Serialized with shutdown so no Ring is sent after the Stops
        let _workers = self.workers.lock();
        if self.shared.shut_down.load(Ordering::Acquire) {
            return Err(DispatchError::ShutDown);
        }
        self.shared.queues[class.index()].push(job);
        self.doorbell
            .send(Doorbell::Ring)
            .map_err(|_| DispatchError::ShutDown)
    }

    fn shutdown(&self) {
        let workers = {
            let mut workers = self.workers.lock();
            if self.shared.shut_down.swap(true, Ordering::AcqRel) {
                return;
            }
            for _ in 0..workers.len() {
                let _ = self.doorbell.send(Doorbell::Stop);
            }
            std::mem::take(&mut *workers)
        };

        let current = thread::current().id();
        for handle in workers {
            if handle.thread().id() == current {
                // Called from a job; this worker exits when the job returns
                continue;
            }
            if handle.join().is_err() {
                warn!("Worker thread terminated abnormally");
            }
        }

        let dropped = self.pending();
        if dropped > 0 {
            warn!(dropped, "Worker pool shut down with unclaimed jobs");
        }
        info!(executed = self.executed(), "Worker pool stopped");
    }

    fn name(&self) -> &'static str {
        "threads"
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// =============================================================================
// TOKIO POOL
// =============================================================================

/// Runs jobs on a tokio runtime's blocking pool
///
/// Work classes are accepted but not distinguished; tokio schedules blocking
/// tasks in submission order.
pub struct TokioPool {
    handle: tokio::runtime::Handle,
    shut_down: AtomicBool,
}

impl TokioPool {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Bind to the runtime of the calling task
    pub fn current() -> IoResult<Self> {
        tokio::runtime::Handle::try_current()
            .map(Self::new)
            .map_err(|e| IoError::InvalidConfig(format!("no tokio runtime: {}", e)))
    }
}

impl WorkerPool for TokioPool {
    fn submit(&self, job: Job, _class: WorkClass) -> DispatchResult<()> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(DispatchError::ShutDown);
        }
        drop(self.handle.spawn_blocking(job));
        Ok(())
    }

    fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
    }

    fn name(&self) -> &'static str {
        "tokio"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_thread_pool_runs_jobs() {
        let pool = ThreadPool::new(2, "test").unwrap();
        let (tx, rx) = mpsc::channel();
        for i in 0..8 {
            let tx = tx.clone();
            pool.submit(Box::new(move || tx.send(i).unwrap()), WorkClass::Critical)
                .unwrap();
        }

        let mut seen: Vec<i32> = (0..8)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..8).collect::<Vec<_>>());
        assert_eq!(pool.size(), 2);
    }

    #[test]
    fn test_class_priority_on_single_worker() {
        let pool = ThreadPool::new(1, "prio").unwrap();
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let order = Arc::new(Mutex::new(Vec::new()));

        // Block the only worker so the remaining jobs queue up
        pool.submit(
            Box::new(move || {
                let _ = gate_rx.recv_timeout(Duration::from_secs(5));
            }),
            WorkClass::Critical,
        )
        .unwrap();

        for (label, class) in [
            ("delayed", WorkClass::Delayed),
            ("critical", WorkClass::Critical),
            ("hyper", WorkClass::HyperCritical),
        ] {
            let order = Arc::clone(&order);
            pool.submit(Box::new(move || order.lock().push(label)), class)
                .unwrap();
        }

        gate_tx.send(()).unwrap();
        pool.shutdown();
        assert_eq!(*order.lock(), vec!["hyper", "critical", "delayed"]);
    }

    #[test]
    fn test_shutdown_runs_submitted_and_rejects_new() {
        let pool = ThreadPool::new(3, "stop").unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            let hits = Arc::clone(&hits);
            pool.submit(
                Box::new(move || {
                    hits.fetch_add(1, Ordering::SeqCst);
                }),
                WorkClass::Delayed,
            )
            .unwrap();
        }
        pool.shutdown();
        assert_eq!(hits.load(Ordering::SeqCst), 50);

        let result = pool.submit(Box::new(|| {}), WorkClass::Critical);
        assert_eq!(result, Err(DispatchError::ShutDown));
    }

    #[test]
    fn test_panicking_job_keeps_worker_alive() {
        let pool = ThreadPool::new(1, "panic").unwrap();
        pool.submit(Box::new(|| panic!("job failed")), WorkClass::Critical)
            .unwrap();
        let (tx, rx) = mpsc::channel();
        pool.submit(Box::new(move || tx.send(()).unwrap()), WorkClass::Critical)
            .unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        pool.shutdown();
        assert_eq!(pool.panicked(), 1);
        assert_eq!(pool.executed(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tokio_pool() {
        let pool = TokioPool::current().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        pool.submit(
            Box::new(move || {
                let _ = tx.send(7);
            }),
            WorkClass::HyperCritical,
        )
        .unwrap();
        assert_eq!(rx.await.unwrap(), 7);

        pool.shutdown();
        assert_eq!(
            pool.submit(Box::new(|| {}), WorkClass::Delayed),
            Err(DispatchError::ShutDown)
        );
        assert_eq!(pool.name(), "tokio");
    }
}
