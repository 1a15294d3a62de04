//! The cooperative poll loop: one thread services every connection in its
//! [`EndpointManager`], doing non-blocking work on each in turn and only
//! blocking (on every connection's work signal at once) once a full pass
//! finds nothing to do anywhere.

use std::time::Duration;

use crate::adapter::PollOutcome;
use crate::endpoint_manager::EndpointManager;
use crate::rx::RxEvent;
use crate::sync::signal::wait_any;

/// How long a single idle wait blocks for before re-checking for new
/// connections (which carry their own signal the engine doesn't yet know
/// about when it started waiting).
const IDLE_WAIT_SLICE: Duration = Duration::from_millis(20);

pub struct PollEngine {
    manager: EndpointManager,
}

impl PollEngine {
    pub fn new(manager: EndpointManager) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &EndpointManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut EndpointManager {
        &mut self.manager
    }

    /// Services every connection exactly once: a fair, bounded amount of
    /// work per endpoint per pass, so one very busy endpoint can't starve
    /// its neighbors on the same poll thread.
    pub fn run_pass(&mut self) -> (PollOutcome, Vec<RxEvent>) {
        let mut total = PollOutcome::default();
        let mut events = Vec::new();
        for connection in self.manager.iter_mut() {
            let (outcome, rx_events) = connection.poll();
            total.merge(outcome);
            events.extend(rx_events);
        }
        (total, events)
    }

    /// Runs passes until one does no work anywhere, then blocks on every
    /// connection's work signal until either new Tx work arrives or
    /// `timeout` elapses, whichever is first.
    pub fn run_until_idle_then_wait(&mut self, timeout: Duration) -> Vec<RxEvent> {
        let mut all_events = Vec::new();
        loop {
            let (outcome, events) = self.run_pass();
            all_events.extend(events);
            if !outcome.did_work() {
                break;
            }
        }

        let signals: Vec<_> = self
            .manager
            .iter_mut()
            .map(|c| c.endpoint.work_signal())
            .collect();
        let refs: Vec<&_> = signals.iter().map(|s| s.as_ref()).collect();
        wait_any(&refs, timeout.min(IDLE_WAIT_SLICE).max(Duration::from_millis(1)));
        for signal in &signals {
            signal.clear();
        }
        all_events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{AdapterHandle, LoopbackAdapter};
    use crate::config::{ConnectionConfig, DataType, Direction, SdkContext};
    use crate::endpoint::Endpoint;
    use crate::connection::Connection;
    use crate::sync::Signal;
    use std::sync::Arc;

    fn push_connection(manager: &mut EndpointManager, direction: Direction, queue: u64) -> crate::endpoint::EndpointHandle {
        let handle = manager.allocate_handle().unwrap();
        let cfg = ConnectionConfig::new(direction, DataType::Video, "cam0", handle.0 as u32);
        let endpoint = Endpoint::new(handle, queue, cfg, Arc::new(Signal::new()));
        let adapter = AdapterHandle::Loopback(LoopbackAdapter::new([0; 32], 16));
        manager.insert(Connection::new(endpoint, adapter));
        handle
    }

    #[test]
    fn run_pass_is_a_no_op_on_empty_manager() {
        let manager = EndpointManager::new(SdkContext::default());
        let mut engine = PollEngine::new(manager);
        let (outcome, events) = engine.run_pass();
        assert!(!outcome.did_work());
        assert!(events.is_empty());
    }

    #[test]
    fn tx_enqueue_is_visible_on_next_pass() {
        let mut manager = EndpointManager::new(SdkContext::default());
        let handle = push_connection(&mut manager, Direction::Tx, 99);
        let mut engine = PollEngine::new(manager);
        engine
            .manager_mut()
            .get_mut(handle)
            .unwrap()
            .enqueue_payload(b"hello")
            .unwrap();
        let (outcome, _) = engine.run_pass();
        assert!(outcome.packets_sent == 0); // poll() itself only does receive-side work
        assert_eq!(
            engine.manager_mut().get_mut(handle).unwrap().endpoint.stats().snapshot().payloads_sent,
            1
        );
    }

    #[test]
    fn idle_wait_returns_without_panicking() {
        let mut manager = EndpointManager::new(SdkContext::default());
        push_connection(&mut manager, Direction::Rx, 1);
        let mut engine = PollEngine::new(manager);
        let events = engine.run_until_idle_then_wait(Duration::from_millis(5));
        assert!(events.is_empty());
    }
}
