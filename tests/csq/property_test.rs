/*!
 * Cancel-Safe Queue Property Tests
 * Random operation sequences checked against a sorted-vector model
 */

use driver_io_core::csq::{ByKey, CancelSafeQueue, Request, RequestState};
use driver_io_core::RequestId;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Op {
    Insert(Option<u8>),
    Cancel(usize),
    RemoveNext,
    CancelMissing,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => proptest::option::weighted(0.8, 0u8..6).prop_map(Op::Insert),
        2 => (0usize..64).prop_map(Op::Cancel),
        2 => Just(Op::RemoveNext),
        1 => Just(Op::CancelMissing),
    ]
}

/// Reference model: keyed entries, keyless last, arrival order among equals
fn model_insert(model: &mut Vec<(u64, Option<u8>)>, id: u64, key: Option<u8>) {
    let rank = |k: Option<u8>| k.map_or(u16::MAX, u16::from);
    let index = model
        .iter()
        .position(|&(_, existing)| rank(key) < rank(existing))
        .unwrap_or(model.len());
    model.insert(index, (id, key));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_queue_matches_model(ops in proptest::collection::vec(op_strategy(), 1..80)) {
        let queue = CancelSafeQueue::<u64>::with_ordering(ByKey);
        let callbacks = Arc::new(AtomicUsize::new(0));
        let mut model: Vec<(u64, Option<u8>)> = Vec::new();
        let mut next_id = 0u64;
        let mut inserted = 0usize;
        let mut dequeued = 0usize;
        let mut cancelled = 0usize;

        for op in ops {
            match op {
                Op::Insert(key) => {
                    let id = next_id;
                    next_id += 1;
                    let mut builder = Request::builder(RequestId(id), id);
                    if let Some(key) = key {
                        builder = builder.sort_key(u64::from(key));
                    }
                    let counter = Arc::clone(&callbacks);
                    queue
                        .insert(builder.build(), Box::new(move |_| {
                            counter.fetch_add(1, Ordering::SeqCst);
                        }))
                        .unwrap();
                    model_insert(&mut model, id, key);
                    inserted += 1;
                }
                Op::Cancel(pick) => {
                    if model.is_empty() {
                        continue;
                    }
                    let (id, _) = model.remove(pick % model.len());
                    let request = queue.cancel(RequestId(id));
                    prop_assert!(request.is_some());
                    prop_assert_eq!(request.unwrap().state(), RequestState::Cancelled);
                    cancelled += 1;
                }
                Op::RemoveNext => {
                    let expected = if model.is_empty() { None } else { Some(model.remove(0).0) };
                    let actual = queue.remove_next().map(|r| r.id().0);
                    prop_assert_eq!(actual, expected);
                    if actual.is_some() {
                        dequeued += 1;
                    }
                }
                Op::CancelMissing => {
                    prop_assert!(queue.cancel(RequestId(u64::MAX)).is_none());
                }
            }

            prop_assert_eq!(queue.len(), model.len());
        }

        prop_assert_eq!(callbacks.load(Ordering::SeqCst), cancelled);
        prop_assert_eq!(inserted, dequeued + cancelled + queue.len());

        let remaining: Vec<u64> = queue.cancel_all().iter().map(|r| r.id().0).collect();
        let expected: Vec<u64> = model.iter().map(|&(id, _)| id).collect();
        prop_assert_eq!(remaining, expected);
        prop_assert_eq!(callbacks.load(Ordering::SeqCst), inserted - dequeued);
    }

    #[test]
    fn prop_cancel_after_dequeue_is_noop(count in 1usize..40) {
        let queue = CancelSafeQueue::<usize>::new();
        let callbacks = Arc::new(AtomicUsize::new(0));
        for i in 0..count {
            let counter = Arc::clone(&callbacks);
            queue
                .insert(Request::new(RequestId(i as u64), i), Box::new(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }

        let mut order = Vec::new();
        while let Some(request) = queue.remove_next() {
            prop_assert!(queue.cancel(request.id()).is_none());
            order.push(*request.payload());
        }

        prop_assert_eq!(order, (0..count).collect::<Vec<_>>());
        prop_assert_eq!(callbacks.load(Ordering::SeqCst), 0);
        assert_eq!(queue.stats().dequeued, count as u64);
    }
}
