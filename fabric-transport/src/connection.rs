//! A connection: one endpoint plus the adapter queue it drives.
//!
//! Incoming bytes are demultiplexed here by their first byte family: the
//! control and data wire formats are distinguished by the codec layer
//! itself (a control packet's command byte and a data packet's payload-type
//! byte occupy disjoint ranges in this protocol), so a connection just
//! tries control decode first and falls back to data decode.

use fabric_proto::control::ControlPacket;
use fabric_proto::data::DataPacket;
use tracing::{trace, warn};

use crate::adapter::{AdapterHandle, PollOutcome};
use crate::endpoint::Endpoint;
use crate::error::TransportError;
use crate::rx::RxEvent;

pub struct Connection {
    pub endpoint: Endpoint,
    adapter: AdapterHandle,
}

impl Connection {
    pub fn new(endpoint: Endpoint, adapter: AdapterHandle) -> Self {
        Self { endpoint, adapter }
    }

    pub fn enqueue_payload(&mut self, data: &[u8]) -> Result<u32, TransportError> {
        self.endpoint.enqueue_payload(&mut self.adapter, data)
    }

    /// One non-blocking pass: steps the probe machine, drains any arrived
    /// packets, and returns both the rx-facing events produced and a count
    /// of how much work actually happened (for the poll loop's idle check).
    pub fn poll(&mut self) -> (PollOutcome, Vec<RxEvent>) {
        let mut outcome = PollOutcome::default();
        let mut rx_events = Vec::new();

        let queue_handle = self.endpoint_queue_handle();
        let mut incoming_control: Option<ControlPacket> = None;
        let mut incoming_data: Vec<DataPacket> = Vec::new();

        let received = self
            .adapter
            .poll_receive(queue_handle, &mut |bytes| match ControlPacket::decode(&bytes) {
                Ok(packet) => incoming_control = Some(packet),
                Err(_) => match DataPacket::decode(&bytes) {
                    Ok(packet) => incoming_data.push(packet),
                    Err(err) => warn!(?err, "dropping packet that decoded as neither control nor data"),
                },
            })
            .unwrap_or(0);
        outcome.packets_received += received;

        let probe_step = self.endpoint.step_probe(incoming_control.as_ref());
        if let Some(event) = probe_step.event {
            trace!(?event, "probe event");
        }
        if let Some(packet) = probe_step.outgoing {
            if let Err(err) = self.adapter.try_send(queue_handle, packet.encode()) {
                warn!(?err, "failed to send probe control packet");
            }
        }

        for packet in incoming_data {
            let events = self.endpoint.on_data_packet(packet);
            self.ack_payloads(queue_handle, &events);
            rx_events.extend(events);
        }

        let delayed = self.endpoint.drain_buffered_delay();
        self.ack_payloads(queue_handle, &delayed);
        rx_events.extend(delayed);

        if let Some(ControlPacket::Ack(_, extra)) = &incoming_control {
            self.endpoint.on_ack(extra.acked_control_packet_num);
        }

        self.endpoint.reclaim_stale_acks();

        (outcome, rx_events)
    }

    /// Sends an `Ack` back for every completed payload in `events`, logging
    /// (rather than silently dropping) a failed send: a lost ack here means
    /// the Tx side's slot never frees via the round trip, relying on its own
    /// local timeout instead.
    fn ack_payloads(&mut self, queue_handle: u64, events: &[RxEvent]) {
        for event in events {
            if let RxEvent::Payload(payload) = event {
                let ack = self.endpoint.make_ack(payload.payload_num);
                if let Err(err) = self.adapter.try_send(queue_handle, ack.encode()) {
                    warn!(?err, payload_num = payload.payload_num, "failed to send payload ack");
                }
            }
        }
    }

    fn endpoint_queue_handle(&self) -> u64 {
        self.endpoint.queue_handle()
    }
}
