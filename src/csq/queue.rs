/*!
 * Cancel-Safe Queue
 *
 * Ordered request queue whose dequeue and cancel paths are arbitrated by one
 * mutex. Whichever path takes the mutex first owns the request's
 * disposition; the loser observes nothing and becomes a no-op.
 *
 * ## Cancel callback slot
 *
 * `insert` installs the callback under the mutex. `remove_next` clears it
 * under the mutex (dropped, never invoked). `cancel` takes it under the
 * mutex and invokes it after unlocking. The callback therefore runs at most
 * once, and exactly once for a request cancelled while queued.
 */

use super::ordering::{Fifo, RequestOrdering};
use super::request::{CancelCallback, Request, RequestState};
use super::stats::{CsqCounters, CsqStats};
use crate::core::errors::CsqError;
use crate::core::types::RequestId;
use crate::remove_lock::RemoveLock;
use parking_lot::Mutex;
use std::any::Any;
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, info};

/// Failed insertion; hands the request back for completion
pub struct InsertError<P> {
    pub error: CsqError,
    pub request: Request<P>,
}

impl<P> InsertError<P> {
    pub fn into_request(self) -> Request<P> {
        self.request
    }
}

impl<P> fmt::Debug for InsertError<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InsertError")
            .field("error", &self.error)
            .field("request", &self.request.id())
            .finish()
    }
}

impl<P> fmt::Display for InsertError<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl<P> std::error::Error for InsertError<P> {}

impl<P> From<InsertError<P>> for CsqError {
    fn from(err: InsertError<P>) -> Self {
        err.error
    }
}

pub type InsertResult<P> = Result<(), InsertError<P>>;

struct QueueInner<P> {
    requests: VecDeque<Request<P>>,
    closed: bool,
    next_sequence: u64,
}

/// Cancel-safe queue of requests carrying payload `P`
///
/// # Examples
///
/// ```
/// use driver_io_core::csq::{CancelSafeQueue, Request};
/// use driver_io_core::core::types::RequestId;
///
/// let queue = CancelSafeQueue::new();
/// queue.insert(Request::new(RequestId(1), "read"), Box::new(|_| {})).unwrap();
///
/// let request = queue.remove_next().unwrap();
/// assert_eq!(request.id(), RequestId(1));
/// // A racing cancel now finds nothing
/// assert!(queue.cancel(RequestId(1)).is_none());
/// ```
pub struct CancelSafeQueue<P> {
    inner: Mutex<QueueInner<P>>,
    ordering: Box<dyn RequestOrdering<P>>,
    remove_lock: Option<RemoveLock>,
    counters: CsqCounters,
}

impl<P: Send + 'static> CancelSafeQueue<P> {
    /// FIFO queue
    pub fn new() -> Self {
        Self::with_ordering(Fifo)
    }

    pub fn with_ordering<O>(ordering: O) -> Self
    where
        O: RequestOrdering<P> + 'static,
    {
        Self {
            inner: Mutex::new(QueueInner {
                requests: VecDeque::new(),
                closed: false,
                next_sequence: 0,
            }),
            ordering: Box::new(ordering),
            remove_lock: None,
            counters: CsqCounters::default(),
        }
    }

    /// Reject inserts once `lock` starts draining
    pub fn bind_remove_lock(mut self, lock: RemoveLock) -> Self {
        self.remove_lock = Some(lock);
        self
    }

    /// Queue `request` and install its cancel callback
    ///
    /// Fails, returning the request, if the queue is closed or the bound
    /// remove lock is draining.
    ///
    /// # Panics
    ///
    /// If the request is already queued or terminal.
    pub fn insert(&self, request: Request<P>, cancel_callback: CancelCallback<P>) -> InsertResult<P> {
        self.insert_inner(request, cancel_callback, None)
    }

    /// Queue `request` with an insert context readable via
    /// [`Request::insert_context`]
    pub fn insert_with_context<C>(
        &self,
        request: Request<P>,
        cancel_callback: CancelCallback<P>,
        context: C,
    ) -> InsertResult<P>
    where
        C: Any + Send,
    {
        self.insert_inner(request, cancel_callback, Some(Box::new(context)))
    }

    fn insert_inner(
        &self,
        mut request: Request<P>,
        cancel_callback: CancelCallback<P>,
        context: Option<Box<dyn Any + Send>>,
    ) -> InsertResult<P> {
        assert!(
            matches!(request.state, RequestState::Created | RequestState::Owned),
            "request {} inserted from state {:?}",
            request.id(),
            request.state
        );

        let mut inner = self.inner.lock();

        if inner.closed {
            drop(inner);
            self.counters.record_rejected();
            return Err(InsertError {
                error: CsqError::Closed(request.id()),
                request,
            });
        }

        if self.remove_lock.as_ref().is_some_and(RemoveLock::is_removing) {
            drop(inner);
            self.counters.record_rejected();
            debug!(request = %request.id(), "Insert rejected, remove lock draining");
            return Err(InsertError {
                error: CsqError::Rejected(request.id()),
                request,
            });
        }

        request.state = RequestState::Queued;
        request.cancel_callback = Some(cancel_callback);
        request.insert_context = context;
        request.sequence = inner.next_sequence;
        inner.next_sequence += 1;

        let position = self.insert_position(&inner.requests, &request);
        let id = request.id();
        match position {
            Some(index) => inner.requests.insert(index, request),
            None => inner.requests.push_back(request),
        }
        let depth = inner.requests.len();
        drop(inner);

        self.counters.record_inserted();
        debug!(request = %id, depth, "Request queued");
        Ok(())
    }

    /// Index of the first queued request the new one must precede
    fn insert_position(&self, queued: &VecDeque<Request<P>>, incoming: &Request<P>) -> Option<usize> {
        // Fast path: belongs at the tail
        match queued.back() {
            None => return None,
            Some(last) if self.ordering.compare(incoming, last) != Ordering::Less => return None,
            Some(_) => {}
        }
        queued
            .iter()
            .position(|existing| self.ordering.compare(incoming, existing) == Ordering::Less)
    }

    /// Cancel a queued request
    ///
    /// Invokes its cancel callback once, outside the lock, and returns the
    /// request in state `Cancelled` for the "completed as cancelled" path.
    /// Returns `None` if the request is absent or no longer queued.
    pub fn cancel(&self, id: RequestId) -> Option<Request<P>> {
        let (request, callback) = {
            let mut inner = self.inner.lock();
            let index = inner
                .requests
                .iter()
                .position(|r| r.id() == id && r.state == RequestState::Queued)?;
            let mut request = inner.requests.remove(index)?;
            request.state = RequestState::Cancelled;
            let callback = request.cancel_callback.take();
            (request, callback)
        };

        self.counters.record_cancelled();
        debug!(request = %id, "Request cancelled");
        if let Some(callback) = callback {
            callback(&request);
        }
        Some(request)
    }

    /// Cancel every queued request (teardown)
    ///
    /// Callbacks run outside the lock, in queue order.
    pub fn cancel_all(&self) -> Vec<Request<P>> {
        let drained: Vec<_> = {
            let mut inner = self.inner.lock();
            inner
                .requests
                .drain(..)
                .map(|mut request| {
                    request.state = RequestState::Cancelled;
                    let callback = request.cancel_callback.take();
                    (request, callback)
                })
                .collect()
        };

        if !drained.is_empty() {
            info!(count = drained.len(), "Cancelling all queued requests");
        }

        drained
            .into_iter()
            .map(|(request, callback)| {
                self.counters.record_cancelled();
                if let Some(callback) = callback {
                    callback(&request);
                }
                request
            })
            .collect()
    }

    /// Dequeue the request at the head
    pub fn remove_next(&self) -> Option<Request<P>> {
        self.remove_next_if(|_| true)
    }

    /// Dequeue the first request (in queue order) matching `predicate`
    ///
    /// The returned request is `Owned` and its cancel callback is cleared, so
    /// a racing `cancel` becomes a no-op.
    pub fn remove_next_if<F>(&self, mut predicate: F) -> Option<Request<P>>
    where
        F: FnMut(&Request<P>) -> bool,
    {
        let (request, cleared) = {
            let mut inner = self.inner.lock();
            let index = inner.requests.iter().position(|r| predicate(r))?;
            let mut request = inner.requests.remove(index)?;
            request.state = RequestState::Owned;
            let cleared = request.cancel_callback.take();
            (request, cleared)
        };
        // Drop the unused callback outside the lock
        drop(cleared);

        self.counters.record_dequeued();
        debug!(request = %request.id(), "Request dequeued");
        Some(request)
    }

    /// Read-only scan
    ///
    /// Starts after the request `after` (or at the head when `None`) and
    /// returns the first value `inspect` produces. Returns `None` if `after`
    /// is no longer queued. Nothing is removed and no ownership moves.
    pub fn peek_next<F, R>(&self, after: Option<RequestId>, mut inspect: F) -> Option<R>
    where
        F: FnMut(&Request<P>) -> Option<R>,
    {
        let inner = self.inner.lock();
        let start = match after {
            None => 0,
            Some(id) => inner.requests.iter().position(|r| r.id() == id)? + 1,
        };
        inner.requests.iter().skip(start).find_map(|r| inspect(r))
    }

    /// Ids of queued requests matching `predicate`, in queue order
    pub fn collect_ids<F>(&self, mut predicate: F) -> Vec<RequestId>
    where
        F: FnMut(&Request<P>) -> bool,
    {
        self.inner
            .lock()
            .requests
            .iter()
            .filter(|r| predicate(r))
            .map(Request::id)
            .collect()
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.inner.lock().requests.iter().any(|r| r.id() == id)
    }

    /// Refuse further inserts; returns whether the queue was already closed
    pub fn close(&self) -> bool {
        let mut inner = self.inner.lock();
        let was_closed = std::mem::replace(&mut inner.closed, true);
        if !was_closed {
            info!(pending = inner.requests.len(), "Cancel-safe queue closed");
        }
        was_closed
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().requests.is_empty()
    }

    pub fn ordering_name(&self) -> &'static str {
        self.ordering.name()
    }

    pub fn stats(&self) -> CsqStats {
        let inner = self.inner.lock();
        self.counters
            .snapshot(inner.requests.len(), inner.closed, self.ordering.name())
    }
}

impl<P: Send + 'static> Default for CancelSafeQueue<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for CancelSafeQueue<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CancelSafeQueue")
            .field("pending", &inner.requests.len())
            .field("closed", &inner.closed)
            .field("ordering", &self.ordering.name())
            .finish()
    }
}
