//! Endpoint lifecycle / probe state machine.
//!
//! Tx and Rx endpoints each run one of these, stepped cooperatively from the
//! poll thread alongside ordinary data-plane work rather than on a
//! dedicated OS thread, so it composes with the per-pass one-packet-per-
//! endpoint fairness rule the poll loop applies everywhere else.
//!
//! `ProbeState` and `ProbeCommand` are kept as distinct types on purpose:
//! an earlier revision matched a received command directly against the
//! local state with `==` and occasionally compared the wrong side, treating
//! a state and a command as interchangeable. Making them different enums
//! turns that mismatch into a compile error.

use std::sync::Arc;
use std::time::{Duration, Instant};

use fabric_proto::constants::{
    PROBE_PACKET_COUNT, RX_PING_MONITOR_TIMEOUT_MSEC, RX_RESET_COMMAND_MAX_RETRIES,
    SEND_RESET_COMMAND_FREQUENCY_MSEC, TX_COMMAND_ACK_TIMEOUT_MSEC, TX_COMMAND_MAX_RETRIES,
};
use fabric_proto::control::{ControlCommand, ControlHeader, ControlPacket, ProtocolVersion};
use fabric_proto::version::{negotiate, Negotiation};

use crate::config::Direction;
use crate::time::TimeProvider;

/// Named states of the endpoint lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Start,
    WaitForStart,
    SendReset,
    Resetting,
    FabricReset,
    ResetDone,
    SendProtocolVersion,
    Probing,
    Connected,
    ConnectedPing,
    Destroy,
}

/// The control-plane command a received packet carries, kept distinct from
/// [`ProbeState`] so the two can never be compared against each other by
/// mistake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeCommand {
    Reset,
    Ping,
    Connected,
    Ack,
    ProtocolVersion,
    /// Never a packet's top-level command; included only so this mapping
    /// stays exhaustive over [`ControlCommand`].
    PayloadDelivered,
}

impl From<ControlCommand> for ProbeCommand {
    fn from(c: ControlCommand) -> Self {
        match c {
            ControlCommand::Reset => ProbeCommand::Reset,
            ControlCommand::Ping => ProbeCommand::Ping,
            ControlCommand::Connected => ProbeCommand::Connected,
            ControlCommand::Ack => ProbeCommand::Ack,
            ControlCommand::ProtocolVersion => ProbeCommand::ProtocolVersion,
            ControlCommand::PayloadDelivered => ProbeCommand::PayloadDelivered,
        }
    }
}

/// An observable transition the caller (endpoint/connection layer) should
/// react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeEvent {
    Connected,
    Reset,
    Destroyed,
}

/// What a single [`ProbeMachine::step`] call produced.
#[derive(Debug, Default)]
pub struct ProbeStep {
    pub outgoing: Option<ControlPacket>,
    pub event: Option<ProbeEvent>,
}

/// The probe/lifecycle state machine run by one endpoint.
pub struct ProbeMachine {
    direction: Direction,
    state: ProbeState,
    local_version: ProtocolVersion,
    negotiated_version: Option<ProtocolVersion>,
    probe_packets_sent: u32,
    probe_packets_acked: u32,
    next_control_packet_num: u32,
    stream_id: u32,
    control_dest_port: u16,
    time: Arc<dyn TimeProvider>,
    /// Attempt counter for whichever state is currently retrying (`Resetting`,
    /// `Probing`). Reset to zero whenever that state is left.
    retry_count: u32,
    /// Deadline for the current retry attempt, armed lazily on first entry
    /// to a retrying state and cleared whenever that state is left.
    retry_deadline: Option<Instant>,
}

impl ProbeMachine {
    pub fn new(direction: Direction, stream_id: u32, control_dest_port: u16, time: Arc<dyn TimeProvider>) -> Self {
        let state = match direction {
            Direction::Tx => ProbeState::Start,
            Direction::Rx => ProbeState::WaitForStart,
        };
        Self {
            direction,
            state,
            local_version: ProtocolVersion {
                probe_version_num: ProtocolVersion::MIN_SUPPORTED,
                major: 1,
                minor: 0,
            },
            negotiated_version: None,
            probe_packets_sent: 0,
            probe_packets_acked: 0,
            next_control_packet_num: 0,
            stream_id,
            control_dest_port,
            time,
            retry_count: 0,
            retry_deadline: None,
        }
    }

    pub fn state(&self) -> ProbeState {
        self.state
    }

    pub fn negotiated_version(&self) -> Option<ProtocolVersion> {
        self.negotiated_version
    }

    fn next_header(&mut self) -> ControlHeader {
        let header = ControlHeader::new(self.next_control_packet_num, self.stream_id, self.control_dest_port);
        self.next_control_packet_num = self.next_control_packet_num.wrapping_add(1);
        header
    }

    fn enter_fabric_reset(&mut self) {
        self.state = ProbeState::FabricReset;
        self.retry_count = 0;
        self.retry_deadline = None;
    }

    /// Advances the state machine by one cooperative step: reacts to at most
    /// one received control packet and/or advances a timer-driven
    /// transition, and returns at most one packet to send.
    pub fn step(&mut self, incoming: Option<&ControlPacket>) -> ProbeStep {
        let incoming_command = incoming.map(|p| ProbeCommand::from(p.command()));

        match self.state {
            ProbeState::Start => {
                self.state = ProbeState::SendReset;
                ProbeStep::default()
            }
            ProbeState::SendReset => {
                self.state = ProbeState::Resetting;
                let header = self.next_header();
                ProbeStep {
                    outgoing: Some(ControlPacket::Reset(header)),
                    event: None,
                }
            }
            ProbeState::WaitForStart => {
                if incoming_command == Some(ProbeCommand::Reset) {
                    self.state = ProbeState::Resetting;
                }
                ProbeStep::default()
            }
            ProbeState::Resetting => match self.direction {
                Direction::Tx => {
                    if let Some(ControlPacket::Ack(_, extra)) = incoming {
                        if extra.acked_command == ControlCommand::Reset {
                            self.enter_fabric_reset();
                            return ProbeStep::default();
                        }
                    }
                    let now = self.time.now_instant();
                    let deadline = *self
                        .retry_deadline
                        .get_or_insert_with(|| now + Duration::from_millis(SEND_RESET_COMMAND_FREQUENCY_MSEC));
                    if now < deadline {
                        return ProbeStep::default();
                    }
                    if self.retry_count >= TX_COMMAND_MAX_RETRIES {
                        // The peer never acked our reset, but the handshake
                        // still has to make progress: proceed to the local
                        // fabric reset anyway rather than deadlocking.
                        self.enter_fabric_reset();
                        return ProbeStep::default();
                    }
                    self.retry_count += 1;
                    self.retry_deadline = Some(now + Duration::from_millis(SEND_RESET_COMMAND_FREQUENCY_MSEC));
                    let header = self.next_header();
                    ProbeStep {
                        outgoing: Some(ControlPacket::Reset(header)),
                        event: None,
                    }
                }
                Direction::Rx => {
                    // Acking the reset we just observed lets the Tx side
                    // stop retrying it; then proceed to our own local
                    // fabric reset.
                    let header = self.next_header();
                    self.enter_fabric_reset();
                    ProbeStep {
                        outgoing: Some(ControlPacket::Ack(
                            header,
                            fabric_proto::control::AckExtra {
                                acked_command: ControlCommand::Reset,
                                acked_control_packet_num: 0,
                            },
                        )),
                        event: None,
                    }
                }
            },
            ProbeState::FabricReset => {
                // Local fabric queue/device reset happens at the endpoint
                // layer, which calls this once that's done.
                self.state = ProbeState::ResetDone;
                ProbeStep {
                    outgoing: None,
                    event: Some(ProbeEvent::Reset),
                }
            }
            ProbeState::ResetDone => {
                self.state = ProbeState::SendProtocolVersion;
                ProbeStep::default()
            }
            ProbeState::SendProtocolVersion => {
                if let Some(ControlPacket::ProtocolVersion(header)) = incoming {
                    match negotiate(self.local_version, header.sender_version) {
                        Negotiation::Agreed(v) => {
                            self.negotiated_version = Some(v);
                            self.state = ProbeState::Probing;
                        }
                        Negotiation::Incompatible => {
                            self.state = ProbeState::Destroy;
                            return ProbeStep {
                                outgoing: None,
                                event: Some(ProbeEvent::Destroyed),
                            };
                        }
                    }
                }
                let mut header = self.next_header();
                header.sender_version = self.local_version;
                ProbeStep {
                    outgoing: Some(ControlPacket::ProtocolVersion(header)),
                    event: None,
                }
            }
            ProbeState::Probing => match self.direction {
                Direction::Tx => {
                    if incoming_command == Some(ProbeCommand::Ack) {
                        self.probe_packets_acked += 1;
                        self.retry_count = 0;
                        self.retry_deadline = None;
                    }
                    if self.probe_packets_sent < PROBE_PACKET_COUNT {
                        self.probe_packets_sent += 1;
                        let header = self.next_header();
                        ProbeStep {
                            outgoing: Some(ControlPacket::Ping(header)),
                            event: None,
                        }
                    } else if self.probe_packets_acked >= PROBE_PACKET_COUNT {
                        self.state = ProbeState::Connected;
                        self.retry_count = 0;
                        self.retry_deadline = None;
                        let header = self.next_header();
                        ProbeStep {
                            outgoing: Some(ControlPacket::Connected(header)),
                            event: Some(ProbeEvent::Connected),
                        }
                    } else {
                        // Every ping has been sent at least once but some
                        // acks are still outstanding: wait, then resend the
                        // unacked tail on timeout.
                        let now = self.time.now_instant();
                        let deadline = *self
                            .retry_deadline
                            .get_or_insert_with(|| now + Duration::from_millis(TX_COMMAND_ACK_TIMEOUT_MSEC));
                        if now < deadline {
                            return ProbeStep::default();
                        }
                        if self.retry_count >= TX_COMMAND_MAX_RETRIES {
                            self.state = ProbeState::Destroy;
                            return ProbeStep {
                                outgoing: None,
                                event: Some(ProbeEvent::Destroyed),
                            };
                        }
                        self.retry_count += 1;
                        self.retry_deadline = Some(now + Duration::from_millis(TX_COMMAND_ACK_TIMEOUT_MSEC));
                        self.probe_packets_sent = self.probe_packets_acked;
                        ProbeStep::default()
                    }
                }
                Direction::Rx => {
                    if let Some(ControlPacket::Ping(ping_header)) = incoming {
                        self.probe_packets_sent += 1;
                        self.retry_count = 0;
                        self.retry_deadline = None;
                        let acked_num = ping_header.control_packet_num;
                        let header = self.next_header();
                        return ProbeStep {
                            outgoing: Some(ControlPacket::Ack(
                                header,
                                fabric_proto::control::AckExtra {
                                    acked_command: ControlCommand::Ping,
                                    acked_control_packet_num: acked_num,
                                },
                            )),
                            event: None,
                        };
                    }
                    if self.probe_packets_sent >= PROBE_PACKET_COUNT {
                        self.state = ProbeState::Connected;
                        self.retry_count = 0;
                        self.retry_deadline = None;
                        let header = self.next_header();
                        return ProbeStep {
                            outgoing: Some(ControlPacket::Connected(header)),
                            event: Some(ProbeEvent::Connected),
                        };
                    }
                    // No ping arrived this step: bound how long we wait
                    // before treating the handshake as stalled.
                    let now = self.time.now_instant();
                    let deadline = *self
                        .retry_deadline
                        .get_or_insert_with(|| now + Duration::from_millis(RX_PING_MONITOR_TIMEOUT_MSEC));
                    if now < deadline {
                        return ProbeStep::default();
                    }
                    if self.retry_count >= RX_RESET_COMMAND_MAX_RETRIES {
                        self.state = ProbeState::Destroy;
                        return ProbeStep {
                            outgoing: None,
                            event: Some(ProbeEvent::Destroyed),
                        };
                    }
                    self.retry_count += 1;
                    self.retry_deadline = Some(now + Duration::from_millis(RX_PING_MONITOR_TIMEOUT_MSEC));
                    ProbeStep::default()
                }
            },
            ProbeState::Connected => {
                if incoming_command == Some(ProbeCommand::Reset) {
                    self.reset_for_reconnect();
                    return ProbeStep {
                        outgoing: None,
                        event: Some(ProbeEvent::Reset),
                    };
                }
                self.state = ProbeState::ConnectedPing;
                ProbeStep::default()
            }
            ProbeState::ConnectedPing => {
                if incoming_command == Some(ProbeCommand::Reset) {
                    self.reset_for_reconnect();
                    return ProbeStep {
                        outgoing: None,
                        event: Some(ProbeEvent::Reset),
                    };
                }
                self.state = ProbeState::Connected;
                let header = self.next_header();
                ProbeStep {
                    outgoing: Some(ControlPacket::Ping(header)),
                    event: None,
                }
            }
            ProbeState::Destroy => ProbeStep::default(),
        }
    }

    /// Tears the endpoint down; once in `Destroy` no further packets are
    /// sent and every subsequent `step` is a no-op.
    pub fn destroy(&mut self) -> ProbeStep {
        self.state = ProbeState::Destroy;
        ProbeStep {
            outgoing: None,
            event: Some(ProbeEvent::Destroyed),
        }
    }

    fn reset_for_reconnect(&mut self) {
        self.state = match self.direction {
            Direction::Tx => ProbeState::SendReset,
            Direction::Rx => ProbeState::WaitForStart,
        };
        self.probe_packets_sent = 0;
        self.probe_packets_acked = 0;
        self.negotiated_version = None;
        self.retry_count = 0;
        self.retry_deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{ManualTimeProvider, SystemTimeProvider};

    fn machine(direction: Direction) -> ProbeMachine {
        ProbeMachine::new(direction, 1, 9000, Arc::new(SystemTimeProvider))
    }

    fn drive_to_connected(tx: &mut ProbeMachine, rx: &mut ProbeMachine) {
        let mut tx_out: Option<ControlPacket> = None;
        let mut rx_out: Option<ControlPacket> = None;
        for _ in 0..128 {
            if tx.state() == ProbeState::Connected && rx.state() == ProbeState::Connected {
                return;
            }
            let tx_step = tx.step(rx_out.as_ref());
            let rx_step = rx.step(tx_out.as_ref());
            tx_out = tx_step.outgoing;
            rx_out = rx_step.outgoing;
        }
        panic!("handshake did not converge: tx={:?} rx={:?}", tx.state(), rx.state());
    }

    #[test]
    fn handshake_converges_to_connected() {
        let mut tx = machine(Direction::Tx);
        let mut rx = machine(Direction::Rx);
        drive_to_connected(&mut tx, &mut rx);
        assert_eq!(tx.state(), ProbeState::Connected);
        assert_eq!(rx.state(), ProbeState::Connected);
        assert!(tx.negotiated_version().is_some());
    }

    #[test]
    fn reset_after_connected_returns_to_handshake() {
        let mut tx = machine(Direction::Tx);
        let mut rx = machine(Direction::Rx);
        drive_to_connected(&mut tx, &mut rx);

        let reset = ControlPacket::Reset(ControlHeader::new(0, 1, 9000));
        let step = rx.step(Some(&reset));
        assert_eq!(step.event, Some(ProbeEvent::Reset));
        assert_eq!(rx.state(), ProbeState::WaitForStart);
    }

    #[test]
    fn destroy_is_terminal() {
        let mut tx = machine(Direction::Tx);
        tx.destroy();
        assert_eq!(tx.state(), ProbeState::Destroy);
        let step = tx.step(None);
        assert_eq!(step.outgoing, None);
        assert_eq!(tx.state(), ProbeState::Destroy);
    }

    #[test]
    fn lost_reset_ack_is_retried_then_gives_up_and_proceeds() {
        let clock = Arc::new(ManualTimeProvider::new(Instant::now(), 0));
        let mut tx = ProbeMachine::new(Direction::Tx, 1, 9000, clock.clone());

        assert_eq!(tx.step(None).outgoing, None); // Start -> SendReset
        let first_reset = tx.step(None).outgoing; // SendReset -> Resetting, sends Reset
        assert!(matches!(first_reset, Some(ControlPacket::Reset(_))));
        assert_eq!(tx.step(None).outgoing, None); // primes the retry deadline

        // No ack ever arrives: each timeout resends, up to the retry limit.
        for _ in 0..TX_COMMAND_MAX_RETRIES {
            assert_eq!(tx.state(), ProbeState::Resetting);
            clock.advance(Duration::from_millis(SEND_RESET_COMMAND_FREQUENCY_MSEC));
            let step = tx.step(None);
            assert!(matches!(step.outgoing, Some(ControlPacket::Reset(_))));
        }

        // Retries exhausted: proceed to the local fabric reset anyway.
        clock.advance(Duration::from_millis(SEND_RESET_COMMAND_FREQUENCY_MSEC));
        tx.step(None);
        assert_eq!(tx.state(), ProbeState::FabricReset);
    }

    #[test]
    fn reset_ack_short_circuits_the_retry_wait() {
        let clock = Arc::new(ManualTimeProvider::new(Instant::now(), 0));
        let mut tx = ProbeMachine::new(Direction::Tx, 1, 9000, clock);
        tx.step(None); // Start -> SendReset
        tx.step(None); // SendReset -> Resetting

        let ack = ControlPacket::Ack(
            ControlHeader::new(0, 1, 9000),
            fabric_proto::control::AckExtra {
                acked_command: ControlCommand::Reset,
                acked_control_packet_num: 0,
            },
        );
        tx.step(Some(&ack));
        assert_eq!(tx.state(), ProbeState::FabricReset);
    }

    #[test]
    fn rx_acks_reset_before_its_own_fabric_reset() {
        let mut rx = machine(Direction::Rx);
        let reset = ControlPacket::Reset(ControlHeader::new(0, 1, 9000));
        rx.step(Some(&reset)); // WaitForStart -> Resetting
        let step = rx.step(None); // Resetting -> FabricReset, acking
        match step.outgoing {
            Some(ControlPacket::Ack(_, extra)) => assert_eq!(extra.acked_command, ControlCommand::Reset),
            other => panic!("expected a Reset ack, got {other:?}"),
        }
        assert_eq!(rx.state(), ProbeState::FabricReset);
    }

    #[test]
    fn unacked_ping_tail_is_resent_then_destroys_on_exhaustion() {
        let clock = Arc::new(ManualTimeProvider::new(Instant::now(), 0));
        let mut tx = ProbeMachine::new(Direction::Tx, 1, 9000, clock.clone());
        tx.state = ProbeState::Probing;
        tx.probe_packets_sent = PROBE_PACKET_COUNT;
        tx.probe_packets_acked = 0;

        assert_eq!(tx.step(None).outgoing, None); // primes the retry deadline

        for _ in 0..TX_COMMAND_MAX_RETRIES {
            clock.advance(Duration::from_millis(TX_COMMAND_ACK_TIMEOUT_MSEC));
            let step = tx.step(None);
            assert!(matches!(step.outgoing, None));
            assert_eq!(tx.probe_packets_sent, 0); // resend window reopened
            tx.probe_packets_sent = PROBE_PACKET_COUNT; // simulate the resend completing
        }

        clock.advance(Duration::from_millis(TX_COMMAND_ACK_TIMEOUT_MSEC));
        let step = tx.step(None);
        assert_eq!(step.event, Some(ProbeEvent::Destroyed));
        assert_eq!(tx.state(), ProbeState::Destroy);
    }
}
