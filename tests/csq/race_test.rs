/*!
 * Cancel/Dequeue Race Tests
 * Every request ends up owned by exactly one of the consumer or the canceller
 */

use driver_io_core::csq::{CancelSafeQueue, Request, RequestState};
use driver_io_core::RequestId;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

const REQUESTS: u64 = 2_000;

#[test]
fn test_cancel_and_remove_next_partition_requests() {
    let queue = Arc::new(CancelSafeQueue::<u64>::new());
    let callbacks = Arc::new(AtomicUsize::new(0));

    for id in 0..REQUESTS {
        let callbacks = Arc::clone(&callbacks);
        queue
            .insert(
                Request::new(RequestId(id), id),
                Box::new(move |request| {
                    assert_eq!(request.state(), RequestState::Cancelled);
                    callbacks.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
    }

    let barrier = Arc::new(Barrier::new(3));

    let consumer = {
        let queue = Arc::clone(&queue);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            let mut owned = Vec::new();
            while let Some(request) = queue.remove_next() {
                assert_eq!(request.state(), RequestState::Owned);
                assert!(!request.has_cancel_callback());
                owned.push(request.id().0);
            }
            owned
        })
    };

    let mut shuffled: Vec<u64> = (0..REQUESTS).collect();
    shuffled.shuffle(&mut StdRng::seed_from_u64(0x5eed));

    let cancellers: Vec<_> = [(0..REQUESTS).rev().collect::<Vec<_>>(), shuffled]
        .into_iter()
        .map(|order| {
            let queue = Arc::clone(&queue);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                order
                    .into_iter()
                    .filter_map(|id| queue.cancel(RequestId(id)))
                    .map(|request| request.id().0)
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let owned = consumer.join().unwrap();
    let cancelled: Vec<u64> = cancellers
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    let owned_set: HashSet<_> = owned.iter().copied().collect();
    let cancelled_set: HashSet<_> = cancelled.iter().copied().collect();

    assert_eq!(owned.len(), owned_set.len(), "request dequeued twice");
    assert_eq!(cancelled.len(), cancelled_set.len(), "request cancelled twice");
    assert!(owned_set.is_disjoint(&cancelled_set));
    assert_eq!(owned.len() + cancelled.len(), REQUESTS as usize);
    assert_eq!(callbacks.load(Ordering::SeqCst), cancelled.len());
    assert!(queue.is_empty());
}

#[test]
fn test_producers_and_consumers_lose_nothing() {
    let queue = Arc::new(CancelSafeQueue::<u64>::new());
    let producers_done = Arc::new(AtomicBool::new(false));

    let producers: Vec<_> = (0..4u64)
        .map(|p| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..500 {
                    let id = p * 1_000 + i;
                    queue
                        .insert(Request::new(RequestId(id), id), Box::new(|_| {}))
                        .unwrap();
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..2)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let done = Arc::clone(&producers_done);
            thread::spawn(move || {
                let mut seen = Vec::new();
                loop {
                    match queue.remove_next() {
                        Some(request) => seen.push(request.id().0),
                        None if done.load(Ordering::SeqCst) => break,
                        None => thread::yield_now(),
                    }
                }
                seen
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }
    producers_done.store(true, Ordering::SeqCst);

    let mut seen: Vec<u64> = consumers
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    // Anything left after the consumers observed the flag
    while let Some(request) = queue.remove_next() {
        seen.push(request.id().0);
    }

    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen.len(), 2_000);
    assert_eq!(queue.stats().dequeued, 2_000);
}

#[test]
fn test_per_producer_fifo_preserved() {
    let queue = Arc::new(CancelSafeQueue::<(u64, u64)>::new());
    let producers: Vec<_> = (0..3u64)
        .map(|p| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for seq in 0..300 {
                    let id = RequestId(p * 10_000 + seq);
                    queue
                        .insert(Request::new(id, (p, seq)), Box::new(|_| {}))
                        .unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    let mut last = [None::<u64>; 3];
    while let Some(request) = queue.remove_next() {
        let (p, seq) = *request.payload();
        if let Some(previous) = last[p as usize] {
            assert!(seq > previous);
        }
        last[p as usize] = Some(seq);
    }
}
