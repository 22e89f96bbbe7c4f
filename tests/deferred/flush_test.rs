/*!
 * Immediate Context Flush Tests
 */

use driver_io_core::deferred::{DeferredItem, Dispatcher, ItemState, WorkClass};
use driver_io_core::DispatchError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, OnceLock, Weak};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_flush_waits_for_queued_items() {
    let dispatcher = Dispatcher::with_threads(1).unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));

    let items: Vec<_> = (0..20)
        .map(|n| {
            let order = Arc::clone(&order);
            DeferredItem::new(n, move |n: &usize| {
                thread::sleep(Duration::from_millis(1));
                order.lock().push(*n);
            })
        })
        .collect();

    for item in &items {
        assert_eq!(dispatcher.schedule_immediate(item), Ok(true));
    }
    dispatcher.flush_immediate();

    // Serialized, arrival order
    assert_eq!(*order.lock(), (0..20).collect::<Vec<_>>());
    assert!(items.iter().all(|item| item.state() == ItemState::Idle));
}

#[derive(Default)]
struct Reentrant {
    dispatcher: OnceLock<Weak<Dispatcher>>,
    on_immediate: AtomicBool,
    flushed: AtomicBool,
}

#[test]
fn test_flush_from_immediate_context_returns() {
    let dispatcher = Arc::new(Dispatcher::with_threads(1).unwrap());
    let item = DeferredItem::new(Reentrant::default(), |ctx: &Reentrant| {
        if let Some(dispatcher) = ctx.dispatcher.get().and_then(Weak::upgrade) {
            ctx.on_immediate
                .store(dispatcher.is_immediate_context(), Ordering::SeqCst);
            dispatcher.flush_immediate();
            ctx.flushed.store(true, Ordering::SeqCst);
        }
    });
    item.context()
        .dispatcher
        .set(Arc::downgrade(&dispatcher))
        .unwrap();

    dispatcher.schedule_immediate(&item).unwrap();
    dispatcher.flush_immediate();

    assert!(item.context().on_immediate.load(Ordering::SeqCst));
    assert!(item.context().flushed.load(Ordering::SeqCst));
    assert!(!dispatcher.is_immediate_context());
}

#[test]
fn test_flush_after_shutdown_returns() {
    let dispatcher = Dispatcher::with_threads(1).unwrap();
    let hits = DeferredItem::new(AtomicUsize::new(0), |hits: &AtomicUsize| {
        hits.fetch_add(1, Ordering::SeqCst);
    });
    dispatcher.schedule_immediate(&hits).unwrap();
    dispatcher.shutdown();

    // Work queued before shutdown is drained by it
    assert_eq!(hits.context().load(Ordering::SeqCst), 1);

    let started = Instant::now();
    dispatcher.flush_immediate();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(
        dispatcher.schedule_immediate(&hits),
        Err(DispatchError::ShutDown)
    );
}

#[test]
fn test_rerun_moves_to_latest_target() {
    let dispatcher = Dispatcher::with_threads(1).unwrap();
    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    let (started_tx, started_rx) = mpsc::channel::<()>();

    struct Gate {
        gate: std::sync::Mutex<mpsc::Receiver<()>>,
        started: std::sync::Mutex<mpsc::Sender<()>>,
        threads: Mutex<Vec<String>>,
        first: AtomicBool,
    }

    let item = DeferredItem::new(
        Gate {
            gate: std::sync::Mutex::new(gate_rx),
            started: std::sync::Mutex::new(started_tx),
            threads: Mutex::new(Vec::new()),
            first: AtomicBool::new(true),
        },
        |ctx: &Gate| {
            let name = thread::current().name().unwrap_or_default().to_string();
            ctx.threads.lock().push(name);
            if ctx.first.swap(false, Ordering::SeqCst) {
                let _ = ctx.started.lock().unwrap().send(());
                let _ = ctx.gate.lock().unwrap().recv_timeout(Duration::from_secs(5));
            }
        },
    );

    dispatcher
        .schedule_on_pool(&item, WorkClass::Critical)
        .unwrap();
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(item.state(), ItemState::Running);

    assert_eq!(dispatcher.schedule_immediate(&item), Ok(true));
    assert_eq!(item.state(), ItemState::RunningRequeued);
    gate_tx.send(()).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while item.run_count() < 2 {
        assert!(Instant::now() < deadline);
        thread::sleep(Duration::from_millis(1));
    }

    let threads = item.context().threads.lock().clone();
    assert_eq!(threads.len(), 2);
    assert!(threads[0].contains("-worker-"));
    assert!(threads[1].ends_with("-immediate"));
}
