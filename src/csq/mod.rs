/*!
 * Cancel-Safe Queue
 *
 * Request envelope plus an ordered queue in which dequeue and cancellation
 * race safely: every queued request ends up either handed to one consumer
 * or cancelled exactly once, never both.
 *
 * # Ownership handoff
 *
 * ```text
 *   insert ──► [ mutex: deque + callback slots ] ──► remove_next ──► consumer
 *                            │
 *                         cancel ──► callback (outside the lock) ──► caller
 * ```
 */

mod ordering;
mod queue;
mod request;
mod stats;

pub use ordering::{ByDeadline, ByKey, CompareFn, Fifo, RequestOrdering};
pub use queue::{CancelSafeQueue, InsertError, InsertResult};
pub use request::{
    CancelCallback, CompletedRequest, CompletionRoutine, Request, RequestBuilder, RequestState,
};
pub use stats::CsqStats;
