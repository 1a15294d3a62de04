//! A single window slot: the gather state of one payload number.

use crate::packet::GatheredPayload;

#[derive(Debug, Clone)]
pub struct PayloadSlot {
    pub payload_num: u32,
    pub payload: GatheredPayload,
}

impl PayloadSlot {
    pub fn new(payload_num: u32, total_size: u32) -> Self {
        Self {
            payload_num,
            payload: GatheredPayload::new(payload_num, total_size),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.payload.is_complete()
    }
}
