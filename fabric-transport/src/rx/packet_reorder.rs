//! Bounded out-of-order packet reassembly window.
//!
//! Received fragments land in a fixed-size array indexed by
//! `payload_num & (window_size - 1)` — not a map — so lookups and staleness
//! checks are both O(1) regardless of how far out of order traffic arrives.
//! `window_size` must be a power of two for that mask to work.
//!
//! Staleness and window-overflow detection both rely on wrapping subtraction
//! against `expected_base`, the lowest payload number not yet fully flushed.
//! A payload whose `distance = payload_num.wrapping_sub(expected_base)` is
//! `>= window_size` is either a duplicate/very-late arrival (if it wraps to
//! a huge distance, meaning it's actually *behind* `expected_base`) or has
//! outrun the window (if `distance` is a moderately large value at or past
//! `window_size`); both cases are handled by forcibly flushing the oldest
//! slot to make room, which is the only way a bounded window can behave
//! when the sender is far enough ahead of the receiver.

use crate::packet::SglEntry;
use crate::rx::payload_state::PayloadSlot;
use crate::stats::ConnectionStats;

/// What happened to the slot at `expected_base` when it was forced out of
/// the window, either by timeout or by overflow pressure from new arrivals.
#[derive(Debug, Clone)]
pub enum FlushOutcome {
    Complete(PayloadSlot),
    Incomplete(PayloadSlot),
}

pub struct PacketReorder {
    window_size: u32,
    slots: Vec<Option<PayloadSlot>>,
    expected_base: u32,
    base_initialized: bool,
}

impl PacketReorder {
    pub fn new(window_size: u32) -> Self {
        assert!(window_size.is_power_of_two(), "window_size must be a power of two");
        Self {
            window_size,
            slots: vec![None; window_size as usize],
            expected_base: 0,
            base_initialized: false,
        }
    }

    fn index(&self, payload_num: u32) -> usize {
        (payload_num & (self.window_size - 1)) as usize
    }

    /// `distance` of `payload_num` ahead of `expected_base`, using wrapping
    /// arithmetic so a payload number that has wrapped around `u32::MAX`
    /// is still compared correctly relative to the base.
    fn distance_from_base(&self, payload_num: u32) -> u32 {
        payload_num.wrapping_sub(self.expected_base)
    }

    /// Resets `expected_base` to `payload_num` without touching any slots.
    /// Used on first contact (or after a probe reset) when there is no
    /// established ordering yet to seek against.
    pub fn seek_first_payload(&mut self, payload_num: u32) {
        self.expected_base = payload_num;
        self.base_initialized = true;
    }

    /// Inserts one received fragment. Returns any slot(s) forced out of the
    /// window to make room, in flush order (oldest first).
    pub fn insert_fragment(
        &mut self,
        payload_num: u32,
        total_size: u32,
        entry: SglEntry,
        ptp_timestamp_ms: Option<i64>,
        stats: &ConnectionStats,
    ) -> Vec<FlushOutcome> {
        if !self.base_initialized {
            self.seek_first_payload(payload_num);
        }

        let mut evicted = Vec::new();
        while self.distance_from_base(payload_num) >= self.window_size {
            evicted.push(self.force_flush_oldest());
            stats.record_window_overflow();
        }

        let idx = self.index(payload_num);
        let slot = self.slots[idx].get_or_insert_with(|| PayloadSlot::new(payload_num, total_size));
        if slot.payload_num != payload_num {
            // Stale occupant from a payload number that wrapped back onto
            // this slot's index without ever being flushed; drop it in
            // favor of the newer arrival rather than corrupting both.
            *slot = PayloadSlot::new(payload_num, total_size);
        } else if slot.payload.total_size == 0 && total_size != 0 {
            // The fragment carrying the total size (the Num0 fragment)
            // arrived after a continuation fragment already opened this
            // slot; backfill it now so completion can be detected.
            slot.payload.total_size = total_size;
        }
        if ptp_timestamp_ms.is_some() {
            slot.payload.ptp_timestamp_ms = ptp_timestamp_ms;
        }
        slot.payload.entries.push(entry);
        evicted
    }

    /// Forces the slot at `expected_base` out of the window, always
    /// producing an outcome: a payload whose every packet was lost never
    /// occupies a slot at all, but it still needs exactly one error
    /// surfaced once the window passes it by, so that case synthesizes an
    /// empty `Incomplete` slot rather than silently skipping it.
    fn force_flush_oldest(&mut self) -> FlushOutcome {
        let idx = self.index(self.expected_base);
        let outcome = match self.slots[idx].take() {
            Some(slot) if slot.is_complete() => FlushOutcome::Complete(slot),
            Some(slot) => FlushOutcome::Incomplete(slot),
            None => FlushOutcome::Incomplete(PayloadSlot::new(self.expected_base, 0)),
        };
        self.expected_base = self.expected_base.wrapping_add(1);
        outcome
    }

    /// Drains every contiguous complete payload starting at `expected_base`,
    /// in ascending order. Stops at the first gap (incomplete or empty
    /// slot), preserving strict in-order emission.
    pub fn drain_ready(&mut self) -> Vec<PayloadSlot> {
        let mut ready = Vec::new();
        loop {
            let idx = self.index(self.expected_base);
            match &self.slots[idx] {
                Some(slot) if slot.payload_num == self.expected_base && slot.is_complete() => {
                    let slot = self.slots[idx].take().unwrap();
                    self.expected_base = self.expected_base.wrapping_add(1);
                    ready.push(slot);
                }
                _ => break,
            }
        }
        ready
    }

    pub fn expected_base(&self) -> u32 {
        self.expected_base
    }
}
