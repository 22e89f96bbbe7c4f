/*!
 * Request Envelope
 *
 * The record that flows through the remove lock, the cancel-safe queue and
 * the deferred work dispatcher. The payload is opaque to the core.
 */

use crate::core::types::{IoStatus, RequestId, SortKey};
use crate::remove_lock::RemoveLockToken;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::time::{Duration, Instant};

/// Invoked exactly once if the request is cancelled while queued
pub type CancelCallback<P> = Box<dyn FnOnce(&Request<P>) + Send>;

/// Invoked exactly once when the request is completed
pub type CompletionRoutine<P> = Box<dyn FnOnce(&Request<P>, IoStatus) + Send>;

/// Request lifecycle
///
/// ```text
/// Created --insert--> Queued --remove_next--> Owned --complete--> Completed
///                        └-----cancel-------> Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    /// Built but never inserted
    Created,
    Queued,
    /// Handed to exactly one consumer by `remove_next`
    Owned,
    Completed,
    Cancelled,
}

impl RequestState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Completed | RequestState::Cancelled)
    }
}

/// In-flight unit of asynchronous work
pub struct Request<P> {
    id: RequestId,
    payload: P,
    pub(super) state: RequestState,
    pub(super) cancel_callback: Option<CancelCallback<P>>,
    pub(super) sequence: u64,
    deadline: Option<Instant>,
    sort_key: Option<SortKey>,
    completion: Option<CompletionRoutine<P>>,
    pin: Option<RemoveLockToken>,
    pub(super) insert_context: Option<Box<dyn Any + Send>>,
    created_at: Instant,
}

impl<P> Request<P> {
    /// Plain request with no deadline, key or completion routine
    pub fn new(id: RequestId, payload: P) -> Self {
        Self::builder(id, payload).build()
    }

    pub fn builder(id: RequestId, payload: P) -> RequestBuilder<P> {
        RequestBuilder {
            id,
            payload,
            deadline: None,
            sort_key: None,
            completion: None,
            pin: None,
        }
    }

    #[inline]
    pub fn id(&self) -> RequestId {
        self.id
    }

    #[inline]
    pub fn state(&self) -> RequestState {
        self.state
    }

    #[inline]
    pub fn payload(&self) -> &P {
        &self.payload
    }

    #[inline]
    pub fn payload_mut(&mut self) -> &mut P {
        &mut self.payload
    }

    /// Advisory deadline; the core never acts on it by itself
    #[inline]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    #[inline]
    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    #[inline]
    pub fn sort_key(&self) -> Option<SortKey> {
        self.sort_key
    }

    #[inline]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Insertion sequence within its current queue (FIFO tie-break)
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Context supplied through `insert_with_context`, if of type `T`
    pub fn insert_context<T: Any>(&self) -> Option<&T> {
        self.insert_context.as_ref()?.downcast_ref::<T>()
    }

    /// Whether a cancel callback is currently installed
    #[inline]
    pub fn has_cancel_callback(&self) -> bool {
        self.cancel_callback.is_some()
    }

    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin.is_some()
    }

    /// Attach a remove lock token released when the request terminates
    ///
    /// Replaces (and releases) any previously attached token.
    pub fn attach_pin(&mut self, token: RemoveLockToken) {
        self.pin = Some(token);
    }

    /// Detach the remove lock token without releasing it
    pub fn take_pin(&mut self) -> Option<RemoveLockToken> {
        self.pin.take()
    }

    pub fn set_completion(&mut self, routine: CompletionRoutine<P>) {
        self.completion = Some(routine);
    }

    /// Report the final status
    ///
    /// An owned request becomes `Completed`; a cancelled request stays
    /// `Cancelled`. The completion routine runs once, then the attached pin
    /// is released.
    ///
    /// # Panics
    ///
    /// If the request is still `Queued` (a queued request is owned by its
    /// queue and cannot be reached here) or already `Completed`.
    pub fn complete(mut self, status: IoStatus) -> CompletedRequest<P> {
        match self.state {
            RequestState::Created | RequestState::Owned => {
                self.state = RequestState::Completed;
            }
            RequestState::Cancelled => {}
            RequestState::Queued | RequestState::Completed => {
                panic!(
                    "request {} completed from invalid state {:?}",
                    self.id, self.state
                );
            }
        }

        if let Some(routine) = self.completion.take() {
            routine(&self, status);
        }
        // Terminal: drop the pin after the completion routine observed the request
        drop(self.pin.take());

        CompletedRequest {
            id: self.id,
            state: self.state,
            status,
            payload: self.payload,
        }
    }

    /// Give up the payload without reporting completion
    pub fn into_payload(self) -> P {
        self.payload
    }
}

impl<P: fmt::Debug> fmt::Debug for Request<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("payload", &self.payload)
            .field("deadline", &self.deadline)
            .field("sort_key", &self.sort_key)
            .field("pinned", &self.pin.is_some())
            .field("cancel_callback", &self.cancel_callback.is_some())
            .finish()
    }
}

/// Builder for [`Request`]
pub struct RequestBuilder<P> {
    id: RequestId,
    payload: P,
    deadline: Option<Instant>,
    sort_key: Option<SortKey>,
    completion: Option<CompletionRoutine<P>>,
    pin: Option<RemoveLockToken>,
}

impl<P> RequestBuilder<P> {
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline relative to now
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn sort_key(mut self, key: SortKey) -> Self {
        self.sort_key = Some(key);
        self
    }

    pub fn on_complete<F>(mut self, routine: F) -> Self
    where
        F: FnOnce(&Request<P>, IoStatus) + Send + 'static,
    {
        self.completion = Some(Box::new(routine));
        self
    }

    pub fn pin(mut self, token: RemoveLockToken) -> Self {
        self.pin = Some(token);
        self
    }

    pub fn build(self) -> Request<P> {
        Request {
            id: self.id,
            payload: self.payload,
            state: RequestState::Created,
            cancel_callback: None,
            sequence: 0,
            deadline: self.deadline,
            sort_key: self.sort_key,
            completion: self.completion,
            pin: self.pin,
            insert_context: None,
            created_at: Instant::now(),
        }
    }
}

/// Outcome of [`Request::complete`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedRequest<P> {
    pub id: RequestId,
    /// `Completed` or `Cancelled`
    pub state: RequestState,
    pub status: IoStatus,
    pub payload: P,
}
