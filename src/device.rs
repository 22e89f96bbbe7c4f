/*!
 * Device Composition
 *
 * Wires a remove lock, a bound cancel-safe queue and the shared dispatcher
 * into the usual request flow:
 *
 * ```text
 *   submit ──acquire──► pin ──insert──► queue ──next_request──► consumer
 *                                        │                         │
 *           cancel / sweep_expired ◄─────┘        complete(_deferred)
 *                                                                  │
 *   remove: close ─► cancel_all ─► wait for every pin ◄── pin dropped
 * ```
 */

use crate::core::config::RemoveLockOptions;
use crate::core::errors::{CsqError, IoError, IoResult};
use crate::core::sync::SyncConfig;
use crate::core::types::{IoStatus, RequestId};
use crate::csq::{
    CancelCallback, CancelSafeQueue, CompletedRequest, CsqStats, Fifo, Request, RequestOrdering,
};
use crate::deferred::{Dispatcher, WorkClass};
use crate::monitoring::{span_operation, MetricsCollector, Timer};
use crate::remove_lock::{RemoveLock, RemoveLockState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// One removable device and its pending requests
pub struct Device<P> {
    name: String,
    remove_lock: RemoveLock,
    queue: CancelSafeQueue<P>,
    dispatcher: Arc<Dispatcher>,
    metrics: Option<Arc<MetricsCollector>>,
    removed: AtomicBool,
}

impl<P: Send + 'static> Device<P> {
    /// FIFO device
    pub fn new(name: impl Into<String>, dispatcher: Arc<Dispatcher>) -> Self {
        Self::with_ordering(
            name,
            dispatcher,
            Fifo,
            RemoveLockOptions::default(),
            SyncConfig::default(),
        )
    }

    pub fn with_ordering<O>(
        name: impl Into<String>,
        dispatcher: Arc<Dispatcher>,
        ordering: O,
        lock_options: RemoveLockOptions,
        sync: SyncConfig,
    ) -> Self
    where
        O: RequestOrdering<P> + 'static,
    {
        let remove_lock = RemoveLock::with_options(lock_options, sync);
        let queue = CancelSafeQueue::with_ordering(ordering).bind_remove_lock(remove_lock.clone());
        let name = name.into();
        debug!(device = %name, "Device created");
        Self {
            name,
            remove_lock,
            queue,
            dispatcher,
            metrics: None,
            removed: AtomicBool::new(false),
        }
    }

    /// Report sweeps and drain times to `metrics`
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Pin the device and queue `request`
    ///
    /// A device being removed completes the request with
    /// `IoStatus::DeviceNotAvailable` and reports `IoError::DeviceNotAvailable`.
    pub fn submit(&self, mut request: Request<P>, cancel_callback: CancelCallback<P>) -> IoResult<RequestId> {
        let id = request.id();
        let token = match self.remove_lock.acquire_tagged(id.0) {
            Ok(token) => token,
            Err(_) => {
                debug!(device = %self.name, request = %id, "Submit refused, device removing");
                request.complete(IoStatus::DeviceNotAvailable);
                return Err(IoError::DeviceNotAvailable);
            }
        };
        request.attach_pin(token);

        match self.queue.insert(request, cancel_callback) {
            Ok(()) => Ok(id),
            Err(rejected) => {
                debug!(device = %self.name, request = %id, error = %rejected, "Insert rejected");
                rejected
                    .into_request()
                    .complete(IoStatus::DeviceNotAvailable);
                Err(IoError::DeviceNotAvailable)
            }
        }
    }

    /// Take ownership of the next request
    pub fn next_request(&self) -> Option<Request<P>> {
        self.queue.remove_next()
    }

    /// Take ownership of the next request matching `predicate`
    pub fn next_request_if<F>(&self, predicate: F) -> Option<Request<P>>
    where
        F: FnMut(&Request<P>) -> bool,
    {
        self.queue.remove_next_if(predicate)
    }

    /// Cancel a queued request and complete it as cancelled
    ///
    /// `CsqError::NotFound` when it already left the queue.
    pub fn cancel(&self, id: RequestId) -> IoResult<CompletedRequest<P>> {
        self.queue
            .cancel(id)
            .map(|request| request.complete(IoStatus::Cancelled))
            .ok_or_else(|| CsqError::NotFound(id).into())
    }

    /// Complete an owned request on the calling thread
    pub fn complete(&self, request: Request<P>, status: IoStatus) -> CompletedRequest<P> {
        request.complete(status)
    }

    /// Complete an owned request on the worker pool
    ///
    /// Completes inline when the pool refuses the job (dispatcher shut down,
    /// or a pool that stopped), so the request always reaches a terminal
    /// state.
    pub fn complete_deferred(&self, request: Request<P>, status: IoStatus, class: WorkClass) {
        let id = request.id();
        let pending = PendingCompletion {
            request: Some(request),
            status,
        };
        let job = Box::new(move || drop(pending));
        if let Err(e) = self.dispatcher.run_on_pool(job, class) {
            // The refused job was dropped, which completed the request here
            warn!(device = %self.name, request = %id, error = %e, "Pool refused completion, completed inline");
        }
    }

    /// Cancel every queued request whose deadline passed at `now`
    ///
    /// Completes each with `IoStatus::Timeout`. Requests dequeued meanwhile
    /// are left to their owners.
    pub fn sweep_expired(&self, now: Instant) -> Vec<CompletedRequest<P>> {
        let expired = self.queue.collect_ids(|request| request.is_expired(now));
        let completed: Vec<_> = expired
            .into_iter()
            .filter_map(|id| self.queue.cancel(id))
            .map(|request| request.complete(IoStatus::Timeout))
            .collect();

        if !completed.is_empty() {
            info!(device = %self.name, count = completed.len(), "Expired requests cancelled");
            if let Some(metrics) = &self.metrics {
                metrics.inc_counter("device.expired", completed.len() as f64);
            }
        }
        completed
    }

    /// Tear the device down
    ///
    /// Closes the queue, cancels everything pending, then waits until every
    /// pin (including requests still owned by consumers) is released. Fails
    /// with `DeviceNotAvailable` on a second call.
    pub fn remove(&self) -> IoResult<Vec<CompletedRequest<P>>> {
        let span = span_operation("device_remove");
        let timer = self.drain_timer();
        let cancelled = self.begin_remove()?;
        span.record_items(cancelled.len());

        self.remove_lock.begin_remove_and_wait();
        self.finish_remove(timer);
        Ok(cancelled)
    }

    /// Async variant of [`remove`](Self::remove)
    pub async fn remove_async(&self) -> IoResult<Vec<CompletedRequest<P>>> {
        let timer = self.drain_timer();
        let cancelled = self.begin_remove()?;
        self.remove_lock.begin_remove_and_wait_async().await;
        self.finish_remove(timer);
        Ok(cancelled)
    }

    fn drain_timer(&self) -> Option<Timer> {
        self.metrics
            .as_ref()
            .map(|metrics| Timer::new("device.drain_seconds", Arc::clone(metrics)))
    }

    fn finish_remove(&self, timer: Option<Timer>) {
        let drained_in = timer.map(Timer::stop);
        info!(device = %self.name, ?drained_in, "Device removed");
    }

    fn begin_remove(&self) -> IoResult<Vec<CompletedRequest<P>>> {
        if self.removed.swap(true, Ordering::AcqRel) {
            return Err(IoError::DeviceNotAvailable);
        }
        info!(device = %self.name, pending = self.queue.len(), "Removing device");
        self.queue.close();
        Ok(self
            .queue
            .cancel_all()
            .into_iter()
            .map(|request| request.complete(IoStatus::Cancelled))
            .collect())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> RemoveLockState {
        self.remove_lock.state()
    }

    pub fn remove_lock(&self) -> &RemoveLock {
        &self.remove_lock
    }

    pub fn queue(&self) -> &CancelSafeQueue<P> {
        &self.queue
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Requests pinning the device (queued or owned)
    pub fn outstanding(&self) -> u64 {
        self.remove_lock.io_count()
    }

    pub fn queue_stats(&self) -> CsqStats {
        let stats = self.queue.stats();
        if let Some(metrics) = &self.metrics {
            metrics.record_queue(&self.name, &stats);
        }
        stats
    }
}

/// Completes its request when dropped, whether or not a pool ran it
struct PendingCompletion<P> {
    request: Option<Request<P>>,
    status: IoStatus,
}

impl<P> Drop for PendingCompletion<P> {
    fn drop(&mut self) {
        if let Some(request) = self.request.take() {
            request.complete(self.status);
        }
    }
}

impl<P> std::fmt::Debug for Device<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("state", &self.remove_lock.state())
            .field("outstanding", &self.remove_lock.io_count())
            .field("queue", &self.queue)
            .finish()
    }
}
