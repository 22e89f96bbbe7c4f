/*!
 * Events
 *
 * Signal primitives built on parking_lot::Condvar.
 *
 * - **Notification**: stays signalled once set and releases every waiter
 *   (manual reset). Used as the remove lock's drain-completion signal.
 * - **Synchronization**: releases one waiter and resets itself (auto reset).
 *   Used to wake the immediate execution context.
 */

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Reset behaviour of an [`Event`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Manual reset: all waiters are released while signalled
    Notification,
    /// Auto reset: one waiter consumes each signal
    Synchronization,
}

#[derive(Debug, Default)]
struct EventState {
    signalled: bool,
    waiters: usize,
}

/// Signal/wait event
#[derive(Debug)]
pub struct Event {
    kind: EventType,
    state: Mutex<EventState>,
    condvar: Condvar,
}

impl Event {
    pub fn new(kind: EventType) -> Self {
        Self {
            kind,
            state: Mutex::new(EventState::default()),
            condvar: Condvar::new(),
        }
    }

    pub fn notification() -> Self {
        Self::new(EventType::Notification)
    }

    pub fn synchronization() -> Self {
        Self::new(EventType::Synchronization)
    }

    #[inline]
    pub fn kind(&self) -> EventType {
        self.kind
    }

    /// Signal the event, returning the previous signalled state
    pub fn set(&self) -> bool {
        let mut state = self.state.lock();
        let previous = state.signalled;
        state.signalled = true;
        if state.waiters > 0 {
            match self.kind {
                EventType::Notification => {
                    self.condvar.notify_all();
                }
                EventType::Synchronization => {
                    self.condvar.notify_one();
                }
            }
        }
        previous
    }

    /// Clear the signal, returning the previous signalled state
    pub fn reset(&self) -> bool {
        let mut state = self.state.lock();
        std::mem::replace(&mut state.signalled, false)
    }

    pub fn is_set(&self) -> bool {
        self.state.lock().signalled
    }

    /// Block until the event is signalled
    pub fn wait(&self) {
        let mut state = self.state.lock();
        state.waiters += 1;
        while !state.signalled {
            self.condvar.wait(&mut state);
        }
        state.waiters -= 1;
        self.consume(&mut state);
    }

    /// Block until signalled or `timeout` elapses
    ///
    /// Returns `true` if the event was signalled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        state.waiters += 1;
        while !state.signalled {
            if self.condvar.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.waiters -= 1;

        let signalled = state.signalled;
        if signalled {
            self.consume(&mut state);
        }
        signalled
    }

    /// Number of threads currently blocked on the event (diagnostics)
    pub fn waiter_count(&self) -> usize {
        self.state.lock().waiters
    }

    #[inline]
    fn consume(&self, state: &mut EventState) {
        if self.kind == EventType::Synchronization {
            state.signalled = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_notification_releases_all_waiters() {
        let event = Arc::new(Event::notification());

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let event = Arc::clone(&event);
                thread::spawn(move || event.wait_timeout(Duration::from_secs(2)))
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        assert!(!event.set());

        for handle in handles {
            assert!(handle.join().unwrap());
        }
        // Manual reset: stays signalled
        assert!(event.is_set());
        assert!(event.wait_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn test_synchronization_auto_resets() {
        let event = Event::synchronization();
        event.set();
        assert!(event.wait_timeout(Duration::from_millis(10)));
        assert!(!event.is_set());
        assert!(!event.wait_timeout(Duration::from_millis(20)));
    }

    #[test]
    fn test_wait_timeout_expires() {
        let event = Event::notification();
        let start = Instant::now();
        assert!(!event.wait_timeout(Duration::from_millis(50)));
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(event.waiter_count(), 0);
    }

    #[test]
    fn test_reset() {
        let event = Event::notification();
        assert!(!event.set());
        assert!(event.set());
        assert!(event.reset());
        assert!(!event.is_set());
    }
}
