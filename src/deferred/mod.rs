/*!
 * Deferred Work
 *
 * Runs routines later, outside the caller's context:
 * - Immediate class: one dedicated thread, strictly serialized, for short
 *   completion-side work
 * - Pool class: a [`WorkerPool`] for work that may block
 *
 * An item is idle, queued or running. Scheduling a running item yields
 * exactly one further run, and an item never runs on two threads at once.
 */

mod dispatcher;
mod item;
mod pool;
mod stats;

pub use dispatcher::Dispatcher;
pub use item::{DeferredItem, DeferredItemBuilder, Importance, ItemState, ScheduleMode};
pub use pool::{Job, ThreadPool, TokioPool, WorkClass, WorkerPool};
pub use stats::DispatcherStats;
