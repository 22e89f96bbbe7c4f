/*!
 * Remove Lock Lifecycle Tests
 * Acquire/release balance and drain ordering across threads
 */

use driver_io_core::core::{RemoveLockError, RemoveLockOptions};
use driver_io_core::core::sync::SyncConfig;
use driver_io_core::{RemoveLock, RemoveLockState};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

#[test]
fn test_drain_waits_for_last_release() {
    let lock = RemoveLock::new();
    let tokens: Vec<_> = (0..3).map(|_| lock.acquire().unwrap()).collect();

    let (done_tx, done_rx) = mpsc::channel();
    let remover = lock.clone();
    let handle = thread::spawn(move || {
        remover.begin_remove_and_wait();
        done_tx.send(()).unwrap();
    });

    thread::sleep(Duration::from_millis(50));
    assert_eq!(lock.state(), RemoveLockState::Draining);
    assert_eq!(lock.acquire().unwrap_err(), RemoveLockError::AlreadyRemoving);

    let mut tokens = tokens.into_iter();
    tokens.next().unwrap().release();
    tokens.next().unwrap().release();
    assert!(done_rx.recv_timeout(Duration::from_millis(50)).is_err());

    drop(tokens);
    done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    handle.join().unwrap();
    assert_eq!(lock.state(), RemoveLockState::Removed);
    assert_eq!(lock.io_count(), 0);
}

#[test]
fn test_no_acquire_succeeds_after_removal_begins() {
    let lock = RemoveLock::new();
    let removing = Arc::new(AtomicBool::new(false));
    let late_successes = Arc::new(AtomicU64::new(0));

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let lock = lock.clone();
            let removing = Arc::clone(&removing);
            let late = Arc::clone(&late_successes);
            thread::spawn(move || {
                for _ in 0..20_000 {
                    // Flag read before the attempt: a success after it was set
                    // would mean an acquire slipped past removal
                    let was_removing = removing.load(Ordering::SeqCst);
                    match lock.acquire() {
                        Ok(token) => {
                            if was_removing {
                                late.fetch_add(1, Ordering::SeqCst);
                            }
                            drop(token);
                        }
                        Err(RemoveLockError::AlreadyRemoving) => break,
                    }
                }
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(5));
    lock.begin_remove_and_wait();
    removing.store(true, Ordering::SeqCst);

    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(late_successes.load(Ordering::SeqCst), 0);
    assert_eq!(lock.state(), RemoveLockState::Removed);
}

#[test]
fn test_release_and_wait_with_own_token() {
    let lock = RemoveLock::new();
    let own = lock.acquire().unwrap();
    let other = lock.acquire_many(2).unwrap();
    assert_eq!(lock.io_count(), 3);

    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        drop(other);
    });
    lock.release_and_wait(own);
    releaser.join().unwrap();
    assert_eq!(lock.state(), RemoveLockState::Removed);
}

#[test]
fn test_wait_removed_times_out_while_pinned() {
    let lock = RemoveLock::new();
    let _token = lock.acquire().unwrap();
    assert!(!lock.wait_removed(Duration::from_millis(20)));
    assert_eq!(lock.state(), RemoveLockState::Active);
}

#[test]
fn test_stale_holder_reporting() {
    let options = RemoveLockOptions::tracked().with_max_held(Duration::from_millis(10));
    let lock = RemoveLock::with_options(options, SyncConfig::default());

    let _old = lock.acquire_tagged(0xA).unwrap();
    thread::sleep(Duration::from_millis(25));
    let _fresh = lock.acquire_tagged(0xB).unwrap();

    let stale: Vec<_> = lock.stale_holders().into_iter().map(|h| h.tag).collect();
    assert_eq!(stale, vec![0xA]);
    assert_eq!(lock.outstanding_tags().len(), 2);
}

#[test]
#[should_panic(expected = "did not issue")]
fn test_foreign_token_panics() {
    let first = RemoveLock::new();
    let second = RemoveLock::new();
    let token = first.acquire().unwrap();
    second.release(token);
}

#[test]
#[should_panic(expected = "removal started twice")]
fn test_double_begin_remove_panics() {
    let lock = RemoveLock::new();
    lock.begin_remove_and_wait();
    lock.begin_remove_and_wait();
}
