//! Tracks sent-but-unacked payloads so acks can be matched back to their
//! send time. Since the fabric is reliable there's no retransmission here,
//! only accounting: this feeds both the in-flight count (for back-pressure)
//! and latency statistics.

use std::time::Instant;

use crate::flat_map::FlatMap;

pub struct AckTracker {
    outstanding: FlatMap<u32, Instant>,
}

impl Default for AckTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl AckTracker {
    pub fn new() -> Self {
        Self {
            outstanding: FlatMap::new(),
        }
    }

    pub fn record_sent(&mut self, payload_num: u32, sent_at: Instant) {
        self.outstanding.insert(payload_num, sent_at);
    }

    /// Matches an incoming ack to its send record, returning how long the
    /// payload was in flight. Returns `None` for an unknown or duplicate
    /// ack, which the caller treats as a no-op rather than an error: a
    /// retried ack for an already-acked payload is expected, not malformed.
    pub fn record_ack(&mut self, payload_num: u32, acked_at: Instant) -> Option<std::time::Duration> {
        let sent_at = self.outstanding.remove(&payload_num)?;
        Some(acked_at.saturating_duration_since(sent_at))
    }

    pub fn outstanding_count(&self) -> usize {
        self.outstanding.len()
    }

    /// Drops every outstanding record without acking it, for use when a
    /// probe reset invalidates whatever the peer had in flight.
    pub fn clear(&mut self) {
        self.outstanding.retain(|_, _| false);
    }

    /// Drops every record sent more than `timeout` ago as of `now`, returning
    /// how many were reclaimed. This is a local backstop for payloads the
    /// peer never acks at all (dropped on window overflow, lost on the
    /// wire), so their Tx slot doesn't leak forever waiting on a round trip
    /// that will never arrive.
    pub fn reclaim_expired(&mut self, now: Instant, timeout: std::time::Duration) -> usize {
        let mut reclaimed = 0;
        self.outstanding.retain(|_, sent_at| {
            if now.saturating_duration_since(*sent_at) >= timeout {
                reclaimed += 1;
                false
            } else {
                true
            }
        });
        reclaimed
    }
}
