//! Packet buffers as handed between the adapter and the reassembly/ack
//! subsystems.

use bytes::Bytes;
use smallvec::SmallVec;

/// One fragment of a scatter/gather payload: its bytes and where those bytes
/// belong in the reassembled payload.
#[derive(Debug, Clone)]
pub struct SglEntry {
    pub data: Bytes,
    pub offset: u32,
}

/// A payload as gathered from the wire, before it is handed to the
/// application. In SGL mode this holds one entry per received fragment,
/// arrived in any order; in linear mode it holds a single entry already
/// copied into a contiguous buffer.
#[derive(Debug, Clone, Default)]
pub struct GatheredPayload {
    pub payload_num: u32,
    pub total_size: u32,
    pub extra_data: Vec<u8>,
    pub entries: SmallVec<[SglEntry; 4]>,
    /// PTP wall-clock capture timestamp, in milliseconds since the Unix
    /// epoch, when the sender attaches one. Used only by the optional
    /// buffered-delay emission path.
    pub ptp_timestamp_ms: Option<i64>,
}

impl GatheredPayload {
    pub fn new(payload_num: u32, total_size: u32) -> Self {
        Self {
            payload_num,
            total_size,
            extra_data: Vec::new(),
            entries: SmallVec::new(),
            ptp_timestamp_ms: None,
        }
    }

    /// Total bytes currently gathered across all entries.
    pub fn gathered_len(&self) -> u32 {
        self.entries.iter().map(|e| e.data.len() as u32).sum()
    }

    /// `total_size == 0` means the Num0 fragment (which carries the actual
    /// size) hasn't arrived yet, so completion can't be determined even if
    /// every continuation fragment received so far has landed.
    pub fn is_complete(&self) -> bool {
        self.total_size > 0 && self.gathered_len() >= self.total_size
    }

    /// Copies every entry into a single contiguous buffer in offset order,
    /// for consumers that want linear bytes regardless of how the payload
    /// was gathered.
    pub fn to_linear(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.total_size as usize];
        for entry in &self.entries {
            let start = entry.offset as usize;
            let end = (start + entry.data.len()).min(out.len());
            if start < out.len() {
                out[start..end].copy_from_slice(&entry.data[..end - start]);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gathered_len_sums_fragments() {
        let mut payload = GatheredPayload::new(1, 10);
        payload.entries.push(SglEntry {
            data: Bytes::from_static(b"abcde"),
            offset: 0,
        });
        payload.entries.push(SglEntry {
            data: Bytes::from_static(b"fghij"),
            offset: 5,
        });
        assert_eq!(payload.gathered_len(), 10);
        assert!(payload.is_complete());
    }

    #[test]
    fn to_linear_respects_offsets_out_of_order() {
        let mut payload = GatheredPayload::new(1, 10);
        payload.entries.push(SglEntry {
            data: Bytes::from_static(b"fghij"),
            offset: 5,
        });
        payload.entries.push(SglEntry {
            data: Bytes::from_static(b"abcde"),
            offset: 0,
        });
        assert_eq!(payload.to_linear(), b"abcdefghij".to_vec());
    }
}
