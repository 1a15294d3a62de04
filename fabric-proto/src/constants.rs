//! Fundamental and derived constants for the wire protocol.

/// Maximum size of a single packet the fabric will carry, header included.
pub const MAX_FABRIC_PACKET_SIZE: usize = 8972;

/// Size of a fabric device address (GID-equivalent) in bytes.
pub const DEVICE_ADDRESS_SIZE: usize = 32;

/// Maximum length of a stream name carried in a control packet.
pub const MAX_STREAM_NAME_SIZE: usize = 128;

/// Maximum length of an IP address string carried in a control packet.
pub const MAX_IP_STRING_SIZE: usize = 46;

/// Maximum `extra_data` blob size carried on a packet-zero header.
pub const MAX_EXTRA_DATA_SIZE: usize = 256;

/// Size of the common data-packet header (no Num0/DataOffset extension).
pub const COMMON_HEADER_SIZE: usize = 8;

/// Minimum size of the packet-zero header extension's fixed fields (beyond
/// the common header), before the variable-length `extra_data` region:
/// `total_payload_size` + `max_latency_microsecs` + `origination_ptp_timestamp`
/// (two u32s) + `payload_user_data` + `tx_start_time_microseconds` +
/// `extra_data`'s own length prefix.
pub const NUM0_HEADER_EXTENSION_SIZE: usize = 4 + 4 + 4 + 4 + 8 + 8 + 2;

/// Size of the data-offset header extension (beyond the common header).
pub const DATA_OFFSET_HEADER_EXTENSION_SIZE: usize = 8;

/// Usable payload bytes per packet once the common header is subtracted.
pub const USABLE_PAYLOAD_PER_PACKET: usize = MAX_FABRIC_PACKET_SIZE - COMMON_HEADER_SIZE;

/// Default highest payload number before wraparound, when the codec does not
/// report a narrower protocol-specific maximum.
pub const DEFAULT_PAYLOAD_NUM_MAX: u32 = u16::MAX as u32;

/// Number of probe packets a Tx endpoint sends during the handshake probe phase.
pub const PROBE_PACKET_COUNT: u32 = 10;

/// Byte pattern the Tx side fills probe packets with.
pub const PROBE_PACKET_FILL: u8 = 0xCD;

/// Highest number of out-of-order packets the Rx reassembly window is
/// willing to buffer before forcibly flushing the oldest in-progress
/// payload. Distinct from [`crate::data`]'s wire format: this bounds the
/// *packet-count* overflow threshold, not the power-of-two slot count an
/// engine chooses to implement that bound with.
pub const MAX_PACKET_OUT_OF_ORDER_WINDOW: u32 = 64;

/// How often the Tx side (re-)sends a `Reset` command while waiting for the
/// peer's ack, before giving up and proceeding to `FabricReset` anyway.
pub const SEND_RESET_COMMAND_FREQUENCY_MSEC: u64 = 500;

/// Maximum number of send attempts for a control command awaiting an ack
/// (`Reset`, the initial probe `Ping` wait) before the probe state machine
/// treats the attempt as exhausted.
pub const TX_COMMAND_MAX_RETRIES: u32 = 5;

/// How long the Tx side waits for an ack to a sent control command before
/// retrying (or giving up once `TX_COMMAND_MAX_RETRIES` is reached).
pub const TX_COMMAND_ACK_TIMEOUT_MSEC: u64 = 1_000;

/// How often a `Connected` Tx endpoint sends a keepalive `Ping`.
pub const SEND_PING_COMMAND_FREQUENCY_MSEC: u64 = 1_000;

/// How long a `Connected` Rx endpoint waits for a keepalive `Ping` before
/// treating it as missed.
pub const RX_PING_MONITOR_TIMEOUT_MSEC: u64 = 3_000;

/// Maximum number of missed-ping reset cycles a Rx endpoint tolerates before
/// destroying itself.
pub const RX_RESET_COMMAND_MAX_RETRIES: u32 = 3;

/// How long a Tx endpoint lets a payload sit unacked before reclaiming its
/// in-flight slot locally, independent of any Rx round-trip ack. Backstops
/// payloads the Rx side drops on window overflow, which never produce an
/// ack at all.
pub const TX_PAYLOAD_ACK_TIMEOUT_MSEC: u64 = 5_000;
