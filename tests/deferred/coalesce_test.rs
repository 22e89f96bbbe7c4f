/*!
 * Coalescing Tests
 * Concurrent scheduling of one item never overlaps runs and never loses the
 * final request
 */

use driver_io_core::deferred::{DeferredItem, Dispatcher, ItemState, ScheduleMode, WorkClass};
use driver_io_core::DispatchError;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Barrier, Mutex};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Default)]
struct Probe {
    in_flight: AtomicBool,
    overlaps: AtomicUsize,
    runs: AtomicUsize,
    requested: AtomicU64,
    observed: AtomicU64,
}

fn probe_routine(probe: &Probe) {
    if probe.in_flight.swap(true, Ordering::SeqCst) {
        probe.overlaps.fetch_add(1, Ordering::SeqCst);
    }
    probe
        .observed
        .store(probe.requested.load(Ordering::SeqCst), Ordering::SeqCst);
    probe.runs.fetch_add(1, Ordering::SeqCst);
    thread::sleep(Duration::from_micros(50));
    probe.in_flight.store(false, Ordering::SeqCst);
}

fn wait_idle<C>(item: &DeferredItem<C>) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while item.state() != ItemState::Idle {
        assert!(Instant::now() < deadline, "item never went idle");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_concurrent_pool_scheduling_never_overlaps() {
    let dispatcher = Arc::new(Dispatcher::with_threads(4).unwrap());
    let item = DeferredItem::new(Probe::default(), probe_routine);
    let barrier = Arc::new(Barrier::new(6));
    let accepted = Arc::new(AtomicUsize::new(0));

    let schedulers: Vec<_> = (0..6)
        .map(|n| {
            let dispatcher = Arc::clone(&dispatcher);
            let item = item.clone();
            let barrier = Arc::clone(&barrier);
            let accepted = Arc::clone(&accepted);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..300 {
                    item.context().requested.fetch_add(1, Ordering::SeqCst);
                    let class = WorkClass::ALL[n % WorkClass::ALL.len()];
                    if dispatcher.schedule_on_pool(&item, class).unwrap() {
                        accepted.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        })
        .collect();

    for scheduler in schedulers {
        scheduler.join().unwrap();
    }
    wait_idle(&item);

    let probe = item.context();
    assert_eq!(probe.overlaps.load(Ordering::SeqCst), 0);
    assert!(probe.runs.load(Ordering::SeqCst) >= 1);
    assert!(probe.runs.load(Ordering::SeqCst) <= accepted.load(Ordering::SeqCst));
    // The last run started after the last request
    assert_eq!(probe.observed.load(Ordering::SeqCst), 1_800);
    dispatcher.shutdown();
}

#[test]
fn test_mixed_targets_never_overlap() {
    let dispatcher = Arc::new(Dispatcher::with_threads(2).unwrap());
    let item = DeferredItem::new(Probe::default(), probe_routine);

    let handles: Vec<_> = (0..4)
        .map(|n| {
            let dispatcher = Arc::clone(&dispatcher);
            let item = item.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    item.context().requested.fetch_add(1, Ordering::SeqCst);
                    let result = if n % 2 == 0 {
                        dispatcher.schedule_immediate(&item)
                    } else {
                        dispatcher.schedule_on_pool(&item, WorkClass::Critical)
                    };
                    assert!(result.is_ok());
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    wait_idle(&item);

    let probe = item.context();
    assert_eq!(probe.overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(probe.observed.load(Ordering::SeqCst), 800);
    assert_eq!(item.run_count(), probe.runs.load(Ordering::SeqCst) as u64);
}

#[test]
fn test_reject_mode_reports_every_collision() {
    let dispatcher = Dispatcher::with_threads(1).unwrap();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let item = DeferredItem::builder(Mutex::new(release_rx), |rx: &Mutex<mpsc::Receiver<()>>| {
        let _ = rx.lock().unwrap().recv_timeout(Duration::from_secs(5));
    })
    .mode(ScheduleMode::Reject)
    .build();

    assert_eq!(dispatcher.schedule_on_pool(&item, WorkClass::Critical), Ok(true));
    for _ in 0..10 {
        assert_eq!(
            dispatcher.schedule_on_pool(&item, WorkClass::Critical),
            Err(DispatchError::AlreadyQueued)
        );
    }
    release_tx.send(()).unwrap();
    wait_idle(&item);

    assert_eq!(item.run_count(), 1);
    assert_eq!(dispatcher.stats().rejected, 10);
}
