//! A level-triggered wakeup signal, safe to `set` from any thread and `wait`
//! on from the poll thread.
//!
//! The poll thread only blocks on a [`Signal`] once it has found no work on
//! a full, non-blocking pass over every endpoint it owns; anything that
//! hands the poll thread new work (an enqueued Tx payload, a received
//! packet, a control packet, a shutdown request) must `set` the signal
//! *after* the work is actually visible, never before — setting first and
//! publishing the work second can race a waiter into missing the wakeup and
//! going back to sleep with un-drained work still pending.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct Signal {
    state: Mutex<bool>,
    condvar: Condvar,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the signal as set and wakes any waiter. Idempotent.
    pub fn set(&self) {
        let mut state = self.state.lock().unwrap();
        if !*state {
            *state = true;
            self.condvar.notify_all();
        }
    }

    /// Clears the signal without waiting. Callers drain their work queue
    /// first, then clear, so a `set()` racing the drain still leaves the
    /// signal set for the next wait.
    pub fn clear(&self) {
        *self.state.lock().unwrap() = false;
    }

    /// Returns `true` if the signal is currently set, without clearing it.
    pub fn is_set(&self) -> bool {
        *self.state.lock().unwrap()
    }

    /// Blocks until the signal is set, or `timeout` elapses, whichever comes
    /// first. Does not clear the signal; callers do that explicitly once
    /// they've drained whatever set it.
    pub fn wait_timeout(&self, timeout: Duration) {
        let state = self.state.lock().unwrap();
        if *state {
            return;
        }
        let _ = self.condvar.wait_timeout(state, timeout).unwrap();
    }
}

/// Blocks on the first of several signals to fire, or until `timeout`
/// elapses. Used by the poll thread when every endpoint it owns is idle, so
/// one thread can service many connections without a dedicated OS thread per
/// endpoint.
pub fn wait_any(signals: &[&Signal], timeout: Duration) {
    if signals.iter().any(|s| s.is_set()) {
        return;
    }
    // None of the signals expose a way to wait on several condvars at once
    // without a shared lock, so fall back to a short poll interval, bounded
    // by `timeout`. This keeps worst-case wakeup latency low without
    // requiring every caller to share one condvar.
    const POLL_SLICE: Duration = Duration::from_millis(1);
    let mut waited = Duration::ZERO;
    while waited < timeout {
        if signals.iter().any(|s| s.is_set()) {
            return;
        }
        let slice = POLL_SLICE.min(timeout - waited);
        std::thread::sleep(slice);
        waited += slice;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn set_then_wait_returns_immediately() {
        let signal = Signal::new();
        signal.set();
        signal.wait_timeout(Duration::from_millis(50));
        assert!(signal.is_set());
    }

    #[test]
    fn wait_times_out_without_set() {
        let signal = Signal::new();
        let start = std::time::Instant::now();
        signal.wait_timeout(Duration::from_millis(20));
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert!(!signal.is_set());
    }

    #[test]
    fn set_from_other_thread_wakes_waiter() {
        let signal = Arc::new(Signal::new());
        let signal2 = Arc::clone(&signal);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            signal2.set();
        });
        signal.wait_timeout(Duration::from_secs(5));
        handle.join().unwrap();
        assert!(signal.is_set());
    }

    #[test]
    fn clear_then_set_is_still_observed() {
        let signal = Signal::new();
        signal.set();
        signal.clear();
        assert!(!signal.is_set());
        signal.set();
        assert!(signal.is_set());
    }
}
