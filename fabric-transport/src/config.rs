//! Connection and SDK-wide configuration.

use std::time::Duration;

use crate::time::{SystemTimeProvider, TimeProvider};
use std::sync::Arc;

/// Which side of a connection an endpoint represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Tx,
    Rx,
}

/// What kind of media a stream carries. Only affects default buffer sizing
/// and logging labels; the reassembly path is identical for all three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Video,
    Audio,
    Ancillary,
}

/// How the Rx side places received fragments into memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RxBufferType {
    /// Fragments are copied into a single contiguous buffer per payload.
    Linear,
    /// Fragments are handed to the application as a scatter/gather list,
    /// each pointing at its own backing buffer.
    ScatterGather,
}

/// Size, in payload numbers, of the bounded out-of-order reassembly window.
/// Must be a power of two: the payload-state array is indexed by
/// `payload_num & (WINDOW - 1)`.
pub const DEFAULT_RX_WINDOW_SIZE: u32 = 64;

/// Configuration for the optional PTP-timestamp-ordered delayed emission
/// path on the Rx side.
#[derive(Debug, Clone, Copy)]
pub struct BufferedDelayConfig {
    /// How long to hold a fully-reassembled payload before emitting it, to
    /// smooth out jitter between payloads that arrived close together.
    pub max_delay: Duration,
}

impl Default for BufferedDelayConfig {
    fn default() -> Self {
        Self {
            max_delay: Duration::from_millis(0),
        }
    }
}

/// Per-connection tunables, set once at endpoint creation.
#[derive(Clone)]
pub struct ConnectionConfig {
    pub direction: Direction,
    pub data_type: DataType,
    pub stream_name: String,
    pub stream_id: u32,
    pub rx_buffer_type: RxBufferType,
    pub rx_window_size: u32,
    pub tx_queue_capacity: usize,
    pub max_payload_size: u32,
    pub buffered_delay: Option<BufferedDelayConfig>,
    pub time_provider: Arc<dyn TimeProvider>,
}

impl ConnectionConfig {
    pub fn new(direction: Direction, data_type: DataType, stream_name: impl Into<String>, stream_id: u32) -> Self {
        Self {
            direction,
            data_type,
            stream_name: stream_name.into(),
            stream_id,
            rx_buffer_type: RxBufferType::ScatterGather,
            rx_window_size: DEFAULT_RX_WINDOW_SIZE,
            tx_queue_capacity: 256,
            max_payload_size: 64 * 1024 * 1024,
            buffered_delay: None,
            time_provider: Arc::new(SystemTimeProvider),
        }
    }

    pub fn with_rx_buffer_type(mut self, rx_buffer_type: RxBufferType) -> Self {
        self.rx_buffer_type = rx_buffer_type;
        self
    }

    pub fn with_rx_window_size(mut self, rx_window_size: u32) -> Self {
        assert!(
            rx_window_size.is_power_of_two(),
            "rx_window_size must be a power of two, got {rx_window_size}"
        );
        self.rx_window_size = rx_window_size;
        self
    }

    pub fn with_tx_queue_capacity(mut self, capacity: usize) -> Self {
        self.tx_queue_capacity = capacity;
        self
    }

    pub fn with_buffered_delay(mut self, delay: BufferedDelayConfig) -> Self {
        self.buffered_delay = Some(delay);
        self
    }

    pub fn with_time_provider(mut self, time_provider: Arc<dyn TimeProvider>) -> Self {
        self.time_provider = time_provider;
        self
    }
}

/// Process-wide context shared by every connection created through it:
/// which poll groups exist and how many endpoints each may hold.
#[derive(Debug, Clone, Copy)]
pub struct SdkContext {
    pub max_endpoints_per_poll_group: usize,
}

impl Default for SdkContext {
    fn default() -> Self {
        Self {
            max_endpoints_per_poll_group: 32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "power of two")]
    fn non_power_of_two_window_panics() {
        ConnectionConfig::new(Direction::Rx, DataType::Video, "cam0", 1).with_rx_window_size(100);
    }

    #[test]
    fn builder_overrides_defaults() {
        let cfg = ConnectionConfig::new(Direction::Tx, DataType::Audio, "mic0", 2)
            .with_rx_buffer_type(RxBufferType::Linear)
            .with_tx_queue_capacity(16);
        assert_eq!(cfg.rx_buffer_type, RxBufferType::Linear);
        assert_eq!(cfg.tx_queue_capacity, 16);
    }
}
