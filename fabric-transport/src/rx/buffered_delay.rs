//! Optional PTP-timestamp-ordered delayed emission.
//!
//! Payloads can arrive with a PTP wall-clock capture timestamp attached.
//! Rather than emitting each payload the instant it finishes reassembly
//! (which would pass jitter straight through to the application), this
//! holds payloads until `max_delay` has elapsed since their PTP timestamp,
//! using the local wall clock to decide "elapsed" but scheduling against
//! the monotonic clock so a backward wall-clock step (NTP slew, PTP
//! resync) can't freeze or rewind delivery.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::BufferedDelayConfig;
use crate::packet::GatheredPayload;
use crate::time::TimeProvider;

struct Pending {
    deadline: Instant,
    payload: GatheredPayload,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline
    }
}
impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Pending {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.deadline.cmp(&other.deadline)
    }
}

pub struct BufferedDelay {
    config: BufferedDelayConfig,
    time: Arc<dyn TimeProvider>,
    /// A min-heap by `deadline`: payloads don't arrive in PTP-timestamp
    /// order (that's the whole point of this component), so the earliest
    /// deadline can belong to any push, not just the most recent one.
    pending: BinaryHeap<Reverse<Pending>>,
}

impl BufferedDelay {
    pub fn new(config: BufferedDelayConfig, time: Arc<dyn TimeProvider>) -> Self {
        Self {
            config,
            time,
            pending: BinaryHeap::new(),
        }
    }

    /// Queues `payload` for delayed emission. Payloads without a PTP
    /// timestamp are scheduled against the moment they arrived here, which
    /// degrades gracefully to a flat `max_delay` hold.
    pub fn push(&mut self, payload: GatheredPayload) {
        let now_instant = self.time.now_instant();
        let now_wall = self.time.now_system_ms();
        let target_wall = payload.ptp_timestamp_ms.unwrap_or(now_wall);
        // Reconcile the wall-clock target against the monotonic clock: the
        // deadline is "target + max_delay" expressed as an offset from now,
        // computed once in wall-clock units and then applied to the
        // monotonic instant, so later wall-clock jumps don't move it.
        let offset_ms = (target_wall - now_wall) + self.config.max_delay.as_millis() as i64;
        let deadline = if offset_ms <= 0 {
            now_instant
        } else {
            now_instant + Duration::from_millis(offset_ms as u64)
        };
        self.pending.push(Reverse(Pending { deadline, payload }));
    }

    /// Returns every payload whose deadline has passed, in ascending
    /// deadline order — which tracks PTP-timestamp order, not arrival
    /// order, since payloads can arrive with their timestamps scrambled.
    pub fn drain_ready(&mut self) -> Vec<GatheredPayload> {
        let now = self.time.now_instant();
        let mut ready = Vec::new();
        while let Some(Reverse(front)) = self.pending.peek() {
            if front.deadline <= now {
                let Reverse(pending) = self.pending.pop().unwrap();
                ready.push(pending.payload);
            } else {
                break;
            }
        }
        ready
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
