//! Tx enqueue accounting and back-pressure signaling.
//!
//! The fabric is assumed reliable: there is no retransmission or congestion
//! window here, only a bound on how many payloads may be in flight at once
//! and a signal that wakes the poll thread when there's work to send.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::TransportError;
use crate::sync::Signal;

/// Tracks how many payloads are currently enqueued-but-not-yet-acked for one
/// Tx endpoint, and exposes a [`Signal`] the poll thread waits on when idle.
pub struct TxEnqueue {
    capacity: usize,
    in_flight: Arc<AtomicUsize>,
    work_signal: Arc<Signal>,
}

impl TxEnqueue {
    pub fn new(capacity: usize, work_signal: Arc<Signal>) -> Self {
        Self {
            capacity,
            in_flight: Arc::new(AtomicUsize::new(0)),
            work_signal,
        }
    }

    /// Reserves a slot for a new payload. `Err(QueueFull)` if the endpoint
    /// already has `capacity` payloads outstanding; the caller should retry
    /// once an ack or a queue-drained notification frees a slot.
    ///
    /// The work signal is set only *after* the reservation is visible to
    /// any other thread reading `in_flight`, so a poll thread that's about
    /// to go idle can't observe zero in-flight, decide to sleep, and then
    /// miss this enqueue's wakeup.
    pub fn try_reserve(&self) -> Result<(), TransportError> {
        loop {
            let current = self.in_flight.load(Ordering::Acquire);
            if current >= self.capacity {
                return Err(TransportError::QueueFull);
            }
            if self
                .in_flight
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.work_signal.set();
                return Ok(());
            }
        }
    }

    /// Releases a slot once a payload has been fully acked (or dropped on a
    /// reset). Never panics on over-release; at most clamps to zero, since a
    /// duplicate ack from a retried control packet must not corrupt the
    /// count.
    pub fn release(&self) {
        loop {
            let current = self.in_flight.load(Ordering::Acquire);
            if current == 0 {
                return;
            }
            if self
                .in_flight
                .compare_exchange(current, current - 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return;
            }
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.in_flight() >= self.capacity
    }
}

impl Clone for TxEnqueue {
    fn clone(&self) -> Self {
        Self {
            capacity: self.capacity,
            in_flight: Arc::clone(&self.in_flight),
            work_signal: Arc::clone(&self.work_signal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_until_full_then_release_reopens() {
        let signal = Arc::new(Signal::new());
        let enqueue = TxEnqueue::new(2, signal.clone());
        enqueue.try_reserve().unwrap();
        enqueue.try_reserve().unwrap();
        assert!(enqueue.is_full());
        assert!(matches!(enqueue.try_reserve(), Err(TransportError::QueueFull)));
        assert!(signal.is_set());

        enqueue.release();
        assert!(!enqueue.is_full());
        enqueue.try_reserve().unwrap();
        assert_eq!(enqueue.in_flight(), 2);
    }

    #[test]
    fn release_below_zero_is_a_no_op() {
        let enqueue = TxEnqueue::new(4, Arc::new(Signal::new()));
        enqueue.release();
        assert_eq!(enqueue.in_flight(), 0);
    }
}
