/*!
 * I/O Context
 *
 * The explicitly constructed runtime value that owns what would otherwise be
 * process-wide state: configuration, the deferred work dispatcher and the
 * request id source. Components are created through it so they inherit the
 * configured remove lock options and sync tuning.
 */

use crate::core::config::IoConfig;
use crate::core::errors::IoResult;
use crate::core::id::{IdGenerator, RecyclingGenerator};
use crate::core::types::RequestId;
use crate::csq::{CancelSafeQueue, RequestOrdering};
use crate::deferred::{Dispatcher, DispatcherStats, WorkerPool};
use crate::device::Device;
use crate::monitoring::{MetricsCollector, MetricsSnapshot};
use crate::remove_lock::RemoveLock;
use std::sync::Arc;
use tracing::info;

/// Runtime context for requests, devices and deferred work
///
/// # Examples
///
/// ```
/// use driver_io_core::context::IoContext;
/// use driver_io_core::core::IoConfig;
/// use driver_io_core::csq::Request;
///
/// let ctx = IoContext::new(IoConfig::default().with_worker_threads(1)).unwrap();
/// let device = ctx.create_device::<u32>("nvme0");
///
/// let id = ctx.next_request_id();
/// device.submit(Request::new(id, 42), Box::new(|_| {})).unwrap();
/// assert_eq!(device.next_request().unwrap().id(), id);
/// ctx.shutdown();
/// ```
pub struct IoContext {
    config: IoConfig,
    dispatcher: Arc<Dispatcher>,
    request_ids: RecyclingGenerator,
    metrics: Arc<MetricsCollector>,
}

impl IoContext {
    /// Validate `config` and start the dispatcher
    pub fn new(config: IoConfig) -> IoResult<Self> {
        let dispatcher = Dispatcher::start(&config)?;
        info!(
            workers = config.worker_threads,
            processors = config.processor_count,
            verifier = config.verifier,
            "I/O context started"
        );
        Ok(Self {
            config,
            dispatcher: Arc::new(dispatcher),
            request_ids: RecyclingGenerator::default_start(),
            metrics: Arc::new(MetricsCollector::new()),
        })
    }

    /// Context configured from `IOCORE_*` environment variables
    pub fn from_env() -> IoResult<Self> {
        Self::new(IoConfig::from_env()?)
    }

    /// Context whose pool work runs on `pool`
    pub fn with_pool(config: IoConfig, pool: Arc<dyn WorkerPool>) -> IoResult<Self> {
        config.validate()?;
        let dispatcher = Dispatcher::with_pool(pool, &config.thread_name_prefix, config.sync)?;
        Ok(Self {
            config,
            dispatcher: Arc::new(dispatcher),
            request_ids: RecyclingGenerator::default_start(),
            metrics: Arc::new(MetricsCollector::new()),
        })
    }

    pub fn config(&self) -> &IoConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn next_request_id(&self) -> RequestId {
        self.request_ids.next()
    }

    /// Return the id of a terminal request for reuse
    pub fn recycle_request_id(&self, id: RequestId) {
        self.request_ids.recycle(id);
    }

    /// Remove lock with the configured options (verifier forces tracking)
    pub fn create_remove_lock(&self) -> RemoveLock {
        RemoveLock::with_options(self.config.effective_remove_lock_options(), self.config.sync)
    }

    /// FIFO queue, not bound to any remove lock
    pub fn create_queue<P: Send + 'static>(&self) -> CancelSafeQueue<P> {
        CancelSafeQueue::new()
    }

    /// FIFO device sharing this context's dispatcher
    pub fn create_device<P: Send + 'static>(&self, name: impl Into<String>) -> Device<P> {
        self.create_device_with_ordering(name, crate::csq::Fifo)
    }

    pub fn create_device_with_ordering<P, O>(&self, name: impl Into<String>, ordering: O) -> Device<P>
    where
        P: Send + 'static,
        O: RequestOrdering<P> + 'static,
    {
        Device::with_ordering(
            name,
            Arc::clone(&self.dispatcher),
            ordering,
            self.config.effective_remove_lock_options(),
            self.config.sync,
        )
        .with_metrics(Arc::clone(&self.metrics))
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Metrics with current dispatcher counters folded in
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.record_dispatcher(&self.dispatcher.stats());
        self.metrics.snapshot()
    }

    pub fn dispatcher_stats(&self) -> DispatcherStats {
        self.dispatcher.stats()
    }

    /// Stop the dispatcher; devices keep working but deferred work is refused
    pub fn shutdown(&self) {
        self.dispatcher.shutdown();
        info!("I/O context shut down");
    }
}

impl std::fmt::Debug for IoContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoContext")
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}
