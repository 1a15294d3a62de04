//! Linear-buffer Rx mode: fragments are copied directly into one contiguous
//! buffer per payload instead of being handed to the application as a
//! scatter/gather list.
//!
//! This trades a memcpy per fragment for a simpler application-facing API.
//! Byte content is identical to the scatter/gather path for the same input;
//! only the representation differs.

use crate::packet::GatheredPayload;

/// A payload gathered directly into one contiguous buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinearPayload {
    pub payload_num: u32,
    pub bytes: Vec<u8>,
}

/// Converts a scatter/gather [`GatheredPayload`] into a [`LinearPayload`],
/// copying every fragment into place by its offset.
pub fn to_linear(payload: &GatheredPayload) -> LinearPayload {
    LinearPayload {
        payload_num: payload.payload_num,
        bytes: payload.to_linear(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::SglEntry;
    use bytes::Bytes;

    #[test]
    fn linear_and_sgl_modes_produce_identical_bytes() {
        let mut payload = GatheredPayload::new(3, 10);
        payload.entries.push(SglEntry {
            data: Bytes::from_static(b"fghij"),
            offset: 5,
        });
        payload.entries.push(SglEntry {
            data: Bytes::from_static(b"abcde"),
            offset: 0,
        });
        let linear = to_linear(&payload);
        assert_eq!(linear.payload_num, 3);
        assert_eq!(linear.bytes, b"abcdefghij".to_vec());
    }
}
