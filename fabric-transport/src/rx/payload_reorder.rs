//! Ordered-stream emission on top of the bounded packet reorder window.

use crate::packet::{GatheredPayload, SglEntry};
use crate::rx::packet_reorder::{FlushOutcome, PacketReorder};
use crate::stats::ConnectionStats;

/// What the application-facing Rx path should do with one payload number.
#[derive(Debug, Clone)]
pub enum RxEvent {
    Payload(GatheredPayload),
    /// A payload was evicted from the window before it finished gathering,
    /// either because it timed out or because newer traffic outran it.
    Error { payload_num: u32 },
}

pub struct PayloadReorder {
    window: PacketReorder,
    stats: ConnectionStats,
    /// Set once the first fragment of a fresh (or freshly reconnected)
    /// stream has been seen, so the window knows to seek rather than
    /// assume payload numbering starts at zero.
    seeked: bool,
}

impl PayloadReorder {
    pub fn new(window_size: u32, stats: ConnectionStats) -> Self {
        Self {
            window: PacketReorder::new(window_size),
            stats,
            seeked: false,
        }
    }

    /// Called after a probe reset: the next fragment's payload number
    /// becomes the new base, regardless of where the old stream left off.
    pub fn reset_for_reconnect(&mut self) {
        self.seeked = false;
    }

    pub fn insert_fragment(
        &mut self,
        payload_num: u32,
        total_size: u32,
        entry: SglEntry,
        ptp_timestamp_ms: Option<i64>,
    ) -> Vec<RxEvent> {
        if !self.seeked {
            self.window.seek_first_payload(payload_num);
            self.seeked = true;
        }
        let evicted = self
            .window
            .insert_fragment(payload_num, total_size, entry, ptp_timestamp_ms, &self.stats);
        let mut events: Vec<RxEvent> = evicted
            .into_iter()
            .map(|outcome| match outcome {
                FlushOutcome::Complete(slot) => {
                    self.stats.record_payload_received();
                    RxEvent::Payload(slot.payload)
                }
                FlushOutcome::Incomplete(slot) => {
                    self.stats.record_payload_dropped();
                    RxEvent::Error {
                        payload_num: slot.payload_num,
                    }
                }
            })
            .collect();

        for slot in self.window.drain_ready() {
            self.stats.record_payload_received();
            events.push(RxEvent::Payload(slot.payload));
        }
        events
    }
}
