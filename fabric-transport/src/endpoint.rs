//! A single Tx or Rx endpoint: its probe state machine plus whichever
//! side-specific accounting (enqueue/ack for Tx, reassembly for Rx) applies.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use fabric_proto::control::ControlPacket;
use fabric_proto::data::{CommonFields, DataPacket, Num0Extension};
use tracing::{debug, warn};

use crate::adapter::AdapterHandle;
use crate::config::{ConnectionConfig, Direction};
use crate::error::TransportError;
use crate::packet::SglEntry;
use crate::probe::{ProbeEvent, ProbeMachine, ProbeState, ProbeStep};
use crate::rx::{BufferedDelay, PayloadReorder, RxEvent};
use crate::stats::ConnectionStats;
use crate::sync::Signal;
use crate::tx::{AckTracker, TxEnqueue};

/// How long a Tx payload may sit unacked before its in-flight slot is
/// reclaimed locally, independent of any Rx round-trip ack. Backstops
/// payloads the Rx side drops on window overflow, which never produce an
/// ack of any kind.
const TX_PAYLOAD_ACK_TIMEOUT: std::time::Duration =
    std::time::Duration::from_millis(fabric_proto::constants::TX_PAYLOAD_ACK_TIMEOUT_MSEC);

/// Converts a wire PTP timestamp to milliseconds since the Unix epoch, the
/// unit [`crate::packet::GatheredPayload::ptp_timestamp_ms`] is scheduled
/// against.
fn ptp_to_millis(ptp: fabric_proto::data::PtpTimestamp) -> i64 {
    ptp.seconds as i64 * 1_000 + ptp.nanoseconds as i64 / 1_000_000
}

/// Opaque handle identifying an endpoint within its [`crate::endpoint_manager::EndpointManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointHandle(pub u64);

enum Side {
    Tx {
        enqueue: TxEnqueue,
        acks: AckTracker,
        next_payload_num: u32,
    },
    Rx {
        reorder: PayloadReorder,
        buffered_delay: Option<BufferedDelay>,
    },
}

/// One endpoint of a connection: owns its probe state machine, its fabric
/// queue handle, and its Tx- or Rx-specific accounting.
pub struct Endpoint {
    pub handle: EndpointHandle,
    queue_handle: u64,
    config: ConnectionConfig,
    probe: ProbeMachine,
    side: Side,
    stats: ConnectionStats,
    work_signal: Arc<Signal>,
}

impl Endpoint {
    pub fn new(handle: EndpointHandle, queue_handle: u64, config: ConnectionConfig, work_signal: Arc<Signal>) -> Self {
        let stats = ConnectionStats::new();
        let probe = ProbeMachine::new(
            config.direction,
            config.stream_id,
            0,
            Arc::clone(&config.time_provider),
        );
        let side = match config.direction {
            Direction::Tx => Side::Tx {
                enqueue: TxEnqueue::new(config.tx_queue_capacity, Arc::clone(&work_signal)),
                acks: AckTracker::new(),
                next_payload_num: 0,
            },
            Direction::Rx => Side::Rx {
                reorder: PayloadReorder::new(config.rx_window_size, stats.clone()),
                buffered_delay: config
                    .buffered_delay
                    .clone()
                    .map(|cfg| BufferedDelay::new(cfg, Arc::clone(&config.time_provider))),
            },
        };
        Self {
            handle,
            queue_handle,
            config,
            probe,
            side,
            stats,
            work_signal,
        }
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    pub fn queue_handle(&self) -> u64 {
        self.queue_handle
    }

    /// The signal this endpoint wakes when it gains work while the poll
    /// thread is blocked idle (a Tx enqueue; an Rx wakeup is driven purely
    /// by adapter readiness instead, since arrival isn't observable here).
    pub fn work_signal(&self) -> Arc<Signal> {
        Arc::clone(&self.work_signal)
    }

    pub fn probe_state(&self) -> ProbeState {
        self.probe.state()
    }

    /// Enqueues a whole payload for transmission, splitting it into
    /// fragments no larger than `fabric_proto::constants::USABLE_PAYLOAD_PER_PACKET`.
    /// Returns `Err(QueueFull)` immediately if there isn't room, rather than
    /// partially enqueueing a payload.
    pub fn enqueue_payload(&mut self, adapter: &mut AdapterHandle, data: &[u8]) -> Result<u32, TransportError> {
        let (enqueue, acks, payload_num) = match &mut self.side {
            Side::Tx {
                enqueue,
                acks,
                next_payload_num,
            } => (enqueue, acks, next_payload_num),
            Side::Rx { .. } => {
                return Err(TransportError::InvalidProbeState("enqueue_payload called on an Rx endpoint"))
            }
        };

        enqueue.try_reserve()?;
        let this_payload_num = *payload_num;
        *payload_num = payload_num.wrapping_add(1);

        let chunk_size = fabric_proto::constants::USABLE_PAYLOAD_PER_PACKET;
        let mut offset = 0usize;
        let mut seq = 0u32;
        while offset < data.len() || (offset == 0 && data.is_empty()) {
            let end = (offset + chunk_size).min(data.len());
            let fragment = &data[offset..end];
            let common = CommonFields {
                payload_num: this_payload_num as u16,
                packet_sequence_num: seq,
                encoded_header_size: 0,
            };
            let packet = if offset == 0 {
                DataPacket::Num0 {
                    common,
                    ext: Num0Extension {
                        total_payload_size: data.len() as u32,
                        extra_data: Vec::new(),
                    },
                    fragment: Bytes::copy_from_slice(fragment),
                }
            } else {
                DataPacket::DataOffset {
                    common,
                    ext: fabric_proto::data::DataOffsetExtension {
                        payload_data_offset: offset as u32,
                    },
                    fragment: Bytes::copy_from_slice(fragment),
                }
            };
            let encoded = packet.encode()?;
            adapter.try_send(self.queue_handle, encoded)?;
            self.stats.record_packet_sent();
            seq += 1;
            offset = end;
            if data.is_empty() {
                break;
            }
        }

        acks.record_sent(this_payload_num, Instant::now());
        self.stats.record_payload_sent();
        Ok(this_payload_num)
    }

    /// Processes one received data-plane packet, returning any completed
    /// (or errored-out) payloads ready for immediate emission. Only
    /// meaningful for Rx endpoints. Payloads held back by a configured
    /// buffered-delay path are not included here; they surface later from
    /// [`Endpoint::drain_buffered_delay`].
    pub fn on_data_packet(&mut self, packet: DataPacket) -> Vec<RxEvent> {
        let (reorder, buffered_delay) = match &mut self.side {
            Side::Rx { reorder, buffered_delay } => (reorder, buffered_delay),
            Side::Tx { .. } => {
                warn!("data packet delivered to a Tx endpoint, dropping");
                return Vec::new();
            }
        };
        let common = *packet.common();
        let payload_num = common.payload_num as u32;
        let (total_size, ptp_timestamp_ms) = match &packet {
            DataPacket::Num0 { ext, .. } => (ext.total_payload_size, Some(ptp_to_millis(ext.origination_ptp_timestamp))),
            // Filled in once the Num0 fragment for this payload arrives.
            _ => (0, None),
        };
        let offset = match (&packet, common.packet_sequence_num) {
            (DataPacket::DataOffset { ext, .. }, _) => ext.payload_data_offset,
            (DataPacket::Num0 { .. }, _) => 0,
            (DataPacket::Common { .. }, 0) => {
                // A Common fragment is a bare continuation: it can never
                // legitimately be the first fragment of a payload, since the
                // first fragment is always Num0. Treat it as corrupt rather
                // than guess an offset.
                warn!(payload_num, "Common fragment at sequence 0, dropping");
                return Vec::new();
            }
            (DataPacket::Common { .. }, seq) => {
                let mtu = fabric_proto::constants::MAX_FABRIC_PACKET_SIZE as u32;
                let num0_header_size = (fabric_proto::constants::COMMON_HEADER_SIZE
                    + fabric_proto::constants::NUM0_HEADER_EXTENSION_SIZE
                    + fabric_proto::constants::MAX_EXTRA_DATA_SIZE) as u32;
                let common_header_size = fabric_proto::constants::COMMON_HEADER_SIZE as u32;
                (mtu - num0_header_size) + (mtu - common_header_size) * (seq - 1)
            }
        };
        let entry = SglEntry {
            offset,
            data: packet.fragment().clone(),
        };
        self.stats.record_packet_received();
        let events = reorder.insert_fragment(payload_num, total_size, entry, ptp_timestamp_ms);

        let Some(delay) = buffered_delay else {
            return events;
        };
        events
            .into_iter()
            .filter(|event| match event {
                RxEvent::Payload(payload) => {
                    delay.push(payload.clone());
                    false
                }
                RxEvent::Error { .. } => true,
            })
            .collect()
    }

    /// Drains any payloads whose buffered-delay deadline has passed. A
    /// no-op for endpoints with no buffered-delay path configured.
    pub fn drain_buffered_delay(&mut self) -> Vec<RxEvent> {
        match &mut self.side {
            Side::Rx {
                buffered_delay: Some(delay),
                ..
            } => delay.drain_ready().into_iter().map(RxEvent::Payload).collect(),
            _ => Vec::new(),
        }
    }

    /// Reclaims Tx slots for payloads sent longer than
    /// [`TX_PAYLOAD_ACK_TIMEOUT`] ago with no ack ever received — a local
    /// backstop for payloads the Rx side drops on window overflow, which
    /// never produce an ack of any kind. A no-op on Rx endpoints.
    pub fn reclaim_stale_acks(&mut self) {
        let now = self.config.time_provider.now_instant();
        if let Side::Tx { enqueue, acks, .. } = &mut self.side {
            let reclaimed = acks.reclaim_expired(now, TX_PAYLOAD_ACK_TIMEOUT);
            for _ in 0..reclaimed {
                enqueue.release();
            }
        }
    }

    /// Processes a received ack, releasing the corresponding Tx slot.
    pub fn on_ack(&mut self, acked_payload_num: u32) {
        if let Side::Tx { enqueue, acks, .. } = &mut self.side {
            if acks.record_ack(acked_payload_num, Instant::now()).is_some() {
                enqueue.release();
            }
        }
    }

    /// Builds the `Ack` control packet the Rx side sends back once a
    /// payload finishes reassembly, so the Tx side's [`TxEnqueue`] can free
    /// that payload's slot.
    pub fn make_ack(&mut self, acked_payload_num: u32) -> ControlPacket {
        let header = fabric_proto::control::ControlHeader::new(acked_payload_num, self.config.stream_id, 0);
        ControlPacket::Ack(
            header,
            fabric_proto::control::AckExtra {
                acked_command: fabric_proto::control::ControlCommand::PayloadDelivered,
                acked_control_packet_num: acked_payload_num,
            },
        )
    }

    /// Steps the probe state machine once, reacting to an optional received
    /// control packet. The caller is responsible for sending `step.outgoing`
    /// on to the adapter; this only advances local state.
    pub fn step_probe(&mut self, incoming: Option<&ControlPacket>) -> ProbeStep {
        let step = self.probe.step(incoming);
        if let Some(event) = step.event {
            self.handle_probe_event(event);
        }
        step
    }

    fn handle_probe_event(&mut self, event: ProbeEvent) {
        match event {
            ProbeEvent::Reset => {
                debug!(handle = self.handle.0, "endpoint reset");
                self.stats.record_probe_reset();
                match &mut self.side {
                    Side::Tx { acks, .. } => acks.clear(),
                    Side::Rx { reorder, .. } => reorder.reset_for_reconnect(),
                }
            }
            ProbeEvent::Connected => {
                debug!(handle = self.handle.0, "endpoint connected");
            }
            ProbeEvent::Destroyed => {
                debug!(handle = self.handle.0, "endpoint destroyed");
            }
        }
    }

    pub fn is_tx_queue_full(&self) -> bool {
        matches!(&self.side, Side::Tx { enqueue, .. } if enqueue.is_full())
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::LoopbackAdapter;
    use crate::config::{BufferedDelayConfig, DataType};
    use crate::time::ManualTimeProvider;
    use fabric_proto::data::PtpTimestamp;
    use std::time::Duration;

    fn num0_ext(total_payload_size: u32) -> Num0Extension {
        Num0Extension {
            total_payload_size,
            max_latency_microsecs: 0,
            origination_ptp_timestamp: PtpTimestamp::default(),
            payload_user_data: 0,
            tx_start_time_microseconds: 0,
            extra_data: Vec::new(),
        }
    }

    fn tx_endpoint() -> (Endpoint, AdapterHandle) {
        let cfg = ConnectionConfig::new(Direction::Tx, DataType::Video, "cam0", 1).with_tx_queue_capacity(4);
        let endpoint = Endpoint::new(EndpointHandle(1), 42, cfg, Arc::new(Signal::new()));
        let adapter = AdapterHandle::Loopback(LoopbackAdapter::new([0; 32], 64));
        (endpoint, adapter)
    }

    #[test]
    fn enqueue_then_ack_frees_the_slot() {
        let (mut endpoint, mut adapter) = tx_endpoint();
        let payload_num = endpoint.enqueue_payload(&mut adapter, b"hello world").unwrap();
        assert!(!endpoint.is_tx_queue_full());
        endpoint.on_ack(payload_num);
    }

    #[test]
    fn stale_unacked_payload_is_reclaimed_locally() {
        let clock = Arc::new(ManualTimeProvider::new(Instant::now(), 0));
        let cfg = ConnectionConfig::new(Direction::Tx, DataType::Video, "cam0", 1)
            .with_tx_queue_capacity(1)
            .with_time_provider(clock.clone());
        let mut endpoint = Endpoint::new(EndpointHandle(1), 42, cfg, Arc::new(Signal::new()));
        let mut adapter = AdapterHandle::Loopback(LoopbackAdapter::new([0; 32], 64));
        endpoint.enqueue_payload(&mut adapter, b"hello").unwrap();
        assert!(endpoint.is_tx_queue_full());

        clock.advance(Duration::from_millis(
            fabric_proto::constants::TX_PAYLOAD_ACK_TIMEOUT_MSEC,
        ));
        endpoint.reclaim_stale_acks();
        assert!(!endpoint.is_tx_queue_full());
    }

    #[test]
    fn rx_endpoint_reassembles_via_data_packets() {
        let cfg = ConnectionConfig::new(Direction::Rx, DataType::Video, "cam0", 1);
        let mut endpoint = Endpoint::new(EndpointHandle(2), 42, cfg, Arc::new(Signal::new()));
        let packet = DataPacket::Num0 {
            common: CommonFields {
                payload_num: 0,
                packet_sequence_num: 0,
                encoded_header_size: 0,
            },
            ext: num0_ext(5),
            fragment: Bytes::from_static(b"hello"),
        };
        let events = endpoint.on_data_packet(packet);
        assert_eq!(events.len(), 1);
        match &events[0] {
            RxEvent::Payload(p) => assert_eq!(p.to_linear(), b"hello".to_vec()),
            RxEvent::Error { .. } => panic!("expected a payload"),
        }
    }

    #[test]
    fn buffered_delay_holds_payload_until_drained() {
        let clock = Arc::new(ManualTimeProvider::new(Instant::now(), 0));
        let cfg = ConnectionConfig::new(Direction::Rx, DataType::Video, "cam0", 1)
            .with_buffered_delay(BufferedDelayConfig {
                max_delay: Duration::from_millis(50),
            })
            .with_time_provider(clock.clone());
        let mut endpoint = Endpoint::new(EndpointHandle(3), 42, cfg, Arc::new(Signal::new()));
        let packet = DataPacket::Num0 {
            common: CommonFields {
                payload_num: 0,
                packet_sequence_num: 0,
                encoded_header_size: 0,
            },
            ext: num0_ext(5),
            fragment: Bytes::from_static(b"hello"),
        };
        assert!(endpoint.on_data_packet(packet).is_empty());
        assert!(endpoint.drain_buffered_delay().is_empty());

        clock.advance(Duration::from_millis(60));
        let events = endpoint.drain_buffered_delay();
        assert_eq!(events.len(), 1);
        match &events[0] {
            RxEvent::Payload(p) => assert_eq!(p.to_linear(), b"hello".to_vec()),
            RxEvent::Error { .. } => panic!("expected a payload"),
        }
    }

    #[test]
    fn common_fragment_at_sequence_zero_is_dropped() {
        let cfg = ConnectionConfig::new(Direction::Rx, DataType::Video, "cam0", 1);
        let mut endpoint = Endpoint::new(EndpointHandle(4), 42, cfg, Arc::new(Signal::new()));
        let packet = DataPacket::Common {
            common: CommonFields {
                payload_num: 0,
                packet_sequence_num: 0,
                encoded_header_size: 0,
            },
            fragment: Bytes::from_static(b"orphan"),
        };
        assert!(endpoint.on_data_packet(packet).is_empty());
    }

    #[test]
    fn common_fragment_offset_follows_num0_then_continuations() {
        let cfg = ConnectionConfig::new(Direction::Rx, DataType::Video, "cam0", 1);
        let mut endpoint = Endpoint::new(EndpointHandle(5), 42, cfg, Arc::new(Signal::new()));
        let mtu = fabric_proto::constants::MAX_FABRIC_PACKET_SIZE as u32;
        let num0_header_size = (fabric_proto::constants::COMMON_HEADER_SIZE
            + fabric_proto::constants::NUM0_HEADER_EXTENSION_SIZE
            + fabric_proto::constants::MAX_EXTRA_DATA_SIZE) as u32;
        let first_fragment_len = mtu - num0_header_size;

        let num0 = DataPacket::Num0 {
            common: CommonFields {
                payload_num: 7,
                packet_sequence_num: 0,
                encoded_header_size: 0,
            },
            ext: num0_ext(first_fragment_len + 3),
            fragment: Bytes::from(vec![0u8; first_fragment_len as usize]),
        };
        assert!(endpoint.on_data_packet(num0).is_empty());

        let common_fragment = DataPacket::Common {
            common: CommonFields {
                payload_num: 7,
                packet_sequence_num: 1,
                encoded_header_size: 0,
            },
            fragment: Bytes::from_static(b"abc"),
        };
        let events = endpoint.on_data_packet(common_fragment);
        assert_eq!(events.len(), 1);
        match &events[0] {
            RxEvent::Payload(p) => {
                assert_eq!(p.entries.last().unwrap().offset, first_fragment_len);
            }
            RxEvent::Error { .. } => panic!("expected a payload"),
        }
    }
}
