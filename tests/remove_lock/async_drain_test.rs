/*!
 * Async Drain Tests
 * Removal awaited from tokio tasks
 */

use driver_io_core::{RemoveLock, RemoveLockState};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_test::{assert_pending, assert_ready, task};

#[tokio::test]
async fn test_async_drain_completes_after_release() {
    let lock = RemoveLock::new();
    let token = lock.acquire().unwrap();

    let holder = tokio::spawn(async move {
        sleep(Duration::from_millis(20)).await;
        drop(token);
    });

    timeout(Duration::from_secs(5), lock.begin_remove_and_wait_async())
        .await
        .unwrap();
    holder.await.unwrap();
    assert_eq!(lock.state(), RemoveLockState::Removed);
}

#[tokio::test]
async fn test_observers_all_see_drain() {
    let lock = RemoveLock::new();
    let token = lock.acquire().unwrap();

    let observers: Vec<_> = (0..4)
        .map(|_| {
            let lock = lock.clone();
            tokio::spawn(async move { lock.wait_removed_async().await })
        })
        .collect();

    let remover = {
        let lock = lock.clone();
        tokio::spawn(async move { lock.begin_remove_and_wait_async().await })
    };

    sleep(Duration::from_millis(10)).await;
    drop(token);

    for observer in observers {
        timeout(Duration::from_secs(5), observer).await.unwrap().unwrap();
    }
    timeout(Duration::from_secs(5), remover).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_async_drain_of_idle_lock_is_immediate() {
    let lock = RemoveLock::new();
    timeout(Duration::from_millis(100), lock.begin_remove_and_wait_async())
        .await
        .unwrap();
}

#[test]
fn test_waiter_is_woken_by_last_release() {
    let lock = RemoveLock::new();
    let token = lock.acquire().unwrap();

    let mut waiter = task::spawn(lock.begin_remove_and_wait_async());
    assert_pending!(waiter.poll());
    assert_eq!(lock.state(), RemoveLockState::Draining);

    drop(token);
    assert!(waiter.is_woken());
    assert_ready!(waiter.poll());
    assert_eq!(lock.state(), RemoveLockState::Removed);
}

#[test]
fn test_observer_future_pending_until_drained() {
    let lock = RemoveLock::new();
    let token = lock.acquire().unwrap();

    let mut observer = task::spawn(lock.wait_removed_async());
    assert_pending!(observer.poll());

    // Removal has not started, so releasing does not drain
    let second = lock.acquire().unwrap();
    drop(second);
    assert_pending!(observer.poll());

    lock.release_and_wait(token);
    assert_ready!(observer.poll());
}
