//! Abstraction over the underlying kernel-bypass fabric driver.
//!
//! Real fabric drivers (and the test-only loopback below) are dispatched
//! through the [`AdapterHandle`] enum rather than `Box<dyn Adapter>`: the
//! poll thread calls into this on every pass over every endpoint it owns, so
//! avoiding a vtable indirection there is worth the enum boilerplate.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::error::TransportError;

/// How full an endpoint's Tx queue is, as reported by the adapter. Drives
/// the back-pressure signal surfaced to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxQueueLevel {
    Empty,
    Partial,
    Full,
}

/// What a single non-blocking poll pass over one endpoint accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollOutcome {
    pub packets_sent: u32,
    pub packets_received: u32,
}

impl PollOutcome {
    pub fn did_work(&self) -> bool {
        self.packets_sent > 0 || self.packets_received > 0
    }

    pub fn merge(&mut self, other: PollOutcome) {
        self.packets_sent += other.packets_sent;
        self.packets_received += other.packets_received;
    }
}

/// The operations the transport engine needs from a fabric driver.
///
/// Implementations must be non-blocking: `poll_send`/`poll_receive` are
/// called from the poll thread's hot loop and must never park it.
pub trait Adapter: Send {
    /// Submits `payload` for transmission on `queue_handle`. Returns
    /// `Err(TransportError::QueueFull)` if the underlying send queue has no
    /// room; the caller retries on a later poll pass.
    fn try_send(&mut self, queue_handle: u64, payload: Bytes) -> Result<(), TransportError>;

    /// Drains any packets that have arrived for `queue_handle` without
    /// blocking, handing each to `on_packet`.
    fn poll_receive(
        &mut self,
        queue_handle: u64,
        on_packet: &mut dyn FnMut(Bytes),
    ) -> Result<u32, TransportError>;

    /// Current Tx queue fill level, used to drive back-pressure signaling.
    fn queue_level(&self, queue_handle: u64) -> TxQueueLevel;

    /// This adapter's device address, exchanged during the probe handshake.
    fn device_address(&self) -> [u8; 32];
}

/// An in-process adapter that loops sent packets straight back to the
/// receive side of the same queue handle. Used by tests and by any endpoint
/// pair that hasn't been wired to a real fabric driver.
#[derive(Debug, Default)]
pub struct LoopbackAdapter {
    device_address: [u8; 32],
    queue_capacity: usize,
    queues: std::collections::HashMap<u64, VecDeque<Bytes>>,
}

impl LoopbackAdapter {
    pub fn new(device_address: [u8; 32], queue_capacity: usize) -> Self {
        Self {
            device_address,
            queue_capacity,
            queues: std::collections::HashMap::new(),
        }
    }
}

impl Adapter for LoopbackAdapter {
    fn try_send(&mut self, queue_handle: u64, payload: Bytes) -> Result<(), TransportError> {
        let queue = self.queues.entry(queue_handle).or_default();
        if queue.len() >= self.queue_capacity {
            return Err(TransportError::QueueFull);
        }
        queue.push_back(payload);
        Ok(())
    }

    fn poll_receive(
        &mut self,
        queue_handle: u64,
        on_packet: &mut dyn FnMut(Bytes),
    ) -> Result<u32, TransportError> {
        let mut count = 0;
        if let Some(queue) = self.queues.get_mut(&queue_handle) {
            while let Some(packet) = queue.pop_front() {
                on_packet(packet);
                count += 1;
            }
        }
        Ok(count)
    }

    fn queue_level(&self, queue_handle: u64) -> TxQueueLevel {
        match self.queues.get(&queue_handle) {
            None => TxQueueLevel::Empty,
            Some(q) if q.is_empty() => TxQueueLevel::Empty,
            Some(q) if q.len() >= self.queue_capacity => TxQueueLevel::Full,
            Some(_) => TxQueueLevel::Partial,
        }
    }

    fn device_address(&self) -> [u8; 32] {
        self.device_address
    }
}

/// Two endpoints' worth of [`PairedAdapter`], wired so each side's sends
/// land in the other's receive queue. Used by integration tests that need a
/// real Tx endpoint talking to a real Rx endpoint without a fabric driver.
pub fn paired_adapters(device_a: [u8; 32], device_b: [u8; 32], capacity: usize) -> (PairedAdapter, PairedAdapter) {
    let a_to_b = Arc::new(Mutex::new(VecDeque::new()));
    let b_to_a = Arc::new(Mutex::new(VecDeque::new()));
    (
        PairedAdapter {
            device_address: device_a,
            capacity,
            outgoing: Arc::clone(&a_to_b),
            incoming: Arc::clone(&b_to_a),
        },
        PairedAdapter {
            device_address: device_b,
            capacity,
            outgoing: b_to_a,
            incoming: a_to_b,
        },
    )
}

/// One side of a [`paired_adapters`] pair: a point-to-point in-memory link
/// between exactly two endpoints, ignoring `queue_handle` (there's only
/// ever one peer). Unlike [`LoopbackAdapter`], a send from one side is
/// visible to the *other* side's receive, making this usable for true
/// Tx/Rx integration tests.
pub struct PairedAdapter {
    device_address: [u8; 32],
    capacity: usize,
    outgoing: Arc<Mutex<VecDeque<Bytes>>>,
    incoming: Arc<Mutex<VecDeque<Bytes>>>,
}

impl Adapter for PairedAdapter {
    fn try_send(&mut self, _queue_handle: u64, payload: Bytes) -> Result<(), TransportError> {
        let mut queue = self.outgoing.lock().unwrap();
        if queue.len() >= self.capacity {
            return Err(TransportError::QueueFull);
        }
        queue.push_back(payload);
        Ok(())
    }

    fn poll_receive(
        &mut self,
        _queue_handle: u64,
        on_packet: &mut dyn FnMut(Bytes),
    ) -> Result<u32, TransportError> {
        let mut queue = self.incoming.lock().unwrap();
        let mut count = 0;
        while let Some(packet) = queue.pop_front() {
            on_packet(packet);
            count += 1;
        }
        Ok(count)
    }

    fn queue_level(&self, _queue_handle: u64) -> TxQueueLevel {
        let queue = self.outgoing.lock().unwrap();
        match queue.len() {
            0 => TxQueueLevel::Empty,
            n if n >= self.capacity => TxQueueLevel::Full,
            _ => TxQueueLevel::Partial,
        }
    }

    fn device_address(&self) -> [u8; 32] {
        self.device_address
    }
}

/// Enum-dispatch wrapper over the adapter implementations this crate ships.
/// Extend with a variant (and a `dispatch!` arm) per real driver backend.
pub enum AdapterHandle {
    Loopback(LoopbackAdapter),
    Paired(PairedAdapter),
}

macro_rules! dispatch {
    ($self:ident, $method:ident $(, $args:expr)*) => {
        match $self {
            AdapterHandle::Loopback(a) => a.$method($($args),*),
            AdapterHandle::Paired(a) => a.$method($($args),*),
        }
    };
}

impl AdapterHandle {
    pub fn try_send(&mut self, queue_handle: u64, payload: Bytes) -> Result<(), TransportError> {
        dispatch!(self, try_send, queue_handle, payload)
    }

    pub fn poll_receive(
        &mut self,
        queue_handle: u64,
        on_packet: &mut dyn FnMut(Bytes),
    ) -> Result<u32, TransportError> {
        dispatch!(self, poll_receive, queue_handle, on_packet)
    }

    pub fn queue_level(&self, queue_handle: u64) -> TxQueueLevel {
        dispatch!(self, queue_level, queue_handle)
    }

    pub fn device_address(&self) -> [u8; 32] {
        dispatch!(self, device_address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_round_trips_and_reports_levels() {
        let mut adapter = LoopbackAdapter::new([1; 32], 2);
        assert_eq!(adapter.queue_level(7), TxQueueLevel::Empty);
        adapter.try_send(7, Bytes::from_static(b"one")).unwrap();
        adapter.try_send(7, Bytes::from_static(b"two")).unwrap();
        assert_eq!(adapter.queue_level(7), TxQueueLevel::Full);
        assert!(matches!(
            adapter.try_send(7, Bytes::from_static(b"three")),
            Err(TransportError::QueueFull)
        ));

        let mut received = Vec::new();
        let count = adapter
            .poll_receive(7, &mut |p| received.push(p))
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(received, vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")]);
        assert_eq!(adapter.queue_level(7), TxQueueLevel::Empty);
    }
}
