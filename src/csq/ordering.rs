/*!
 * Ordering Strategies
 *
 * Pluggable comparator deciding where an inserted request lands. Always
 * evaluated under the queue mutex. Requests comparing `Equal` keep arrival
 * order, so every strategy is FIFO among equals.
 */

use super::request::Request;
use std::cmp::Ordering;

/// Comparator between a request being inserted and one already queued
///
/// Returning `Less` places `incoming` ahead of `queued`.
pub trait RequestOrdering<P>: Send + Sync {
    fn compare(&self, incoming: &Request<P>, queued: &Request<P>) -> Ordering;

    fn name(&self) -> &'static str;
}

/// Arrival order (default)
#[derive(Debug, Clone, Copy, Default)]
pub struct Fifo;

impl<P> RequestOrdering<P> for Fifo {
    #[inline]
    fn compare(&self, _incoming: &Request<P>, _queued: &Request<P>) -> Ordering {
        Ordering::Equal
    }

    fn name(&self) -> &'static str {
        "fifo"
    }
}

/// Ascending sort key; requests without a key go last
#[derive(Debug, Clone, Copy, Default)]
pub struct ByKey;

impl<P> RequestOrdering<P> for ByKey {
    #[inline]
    fn compare(&self, incoming: &Request<P>, queued: &Request<P>) -> Ordering {
        compare_optional(incoming.sort_key(), queued.sort_key())
    }

    fn name(&self) -> &'static str {
        "by_key"
    }
}

/// Earliest deadline first; requests without a deadline go last
#[derive(Debug, Clone, Copy, Default)]
pub struct ByDeadline;

impl<P> RequestOrdering<P> for ByDeadline {
    #[inline]
    fn compare(&self, incoming: &Request<P>, queued: &Request<P>) -> Ordering {
        compare_optional(incoming.deadline(), queued.deadline())
    }

    fn name(&self) -> &'static str {
        "by_deadline"
    }
}

/// Adapter for closure comparators
pub struct CompareFn<F>(pub F);

impl<P, F> RequestOrdering<P> for CompareFn<F>
where
    F: Fn(&Request<P>, &Request<P>) -> Ordering + Send + Sync,
{
    #[inline]
    fn compare(&self, incoming: &Request<P>, queued: &Request<P>) -> Ordering {
        (self.0)(incoming, queued)
    }

    fn name(&self) -> &'static str {
        "custom"
    }
}

#[inline]
fn compare_optional<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
