//! Probe handshake convergence under simulated packet loss, driven through
//! [`Endpoint::step_probe`] (not the bare `ProbeMachine` the unit tests in
//! `probe.rs` exercise), so the retry/timeout machinery is checked together
//! with the reset/ack bookkeeping `Endpoint` layers on top of it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use fabric_proto::control::ControlPacket;
use fabric_transport::config::{ConnectionConfig, DataType, Direction};
use fabric_transport::endpoint::{Endpoint, EndpointHandle};
use fabric_transport::sync::Signal;
use fabric_transport::time::ManualTimeProvider;
use fabric_transport::ProbeState;

fn endpoint(direction: Direction, clock: Arc<ManualTimeProvider>) -> Endpoint {
    let cfg = ConnectionConfig::new(direction, DataType::Video, "cam0", 1).with_time_provider(clock);
    Endpoint::new(EndpointHandle(0), 0, cfg, Arc::new(Signal::new()))
}

#[test]
fn handshake_converges_with_every_control_packet_delivered() {
    let clock = Arc::new(ManualTimeProvider::new(Instant::now(), 0));
    let mut tx = endpoint(Direction::Tx, clock.clone());
    let mut rx = endpoint(Direction::Rx, clock.clone());

    let mut tx_out: Option<ControlPacket> = None;
    let mut rx_out: Option<ControlPacket> = None;
    for _ in 0..64 {
        if tx.probe_state() == ProbeState::Connected && rx.probe_state() == ProbeState::Connected {
            return;
        }
        let tx_step = tx.step_probe(rx_out.as_ref());
        let rx_step = rx.step_probe(tx_out.as_ref());
        tx_out = tx_step.outgoing;
        rx_out = rx_step.outgoing;
        clock.advance(Duration::from_millis(10));
    }
    panic!("handshake did not converge: tx={:?} rx={:?}", tx.probe_state(), rx.probe_state());
}

#[test]
fn handshake_converges_despite_every_third_packet_each_way_dropped() {
    // A lossy relay between two real endpoints: every third packet tx->rx
    // and every third packet rx->tx vanishes, exercising the retry/timeout
    // paths in both `Resetting` and `Probing` together rather than in
    // isolation.
    let clock = Arc::new(ManualTimeProvider::new(Instant::now(), 0));
    let mut tx = endpoint(Direction::Tx, clock.clone());
    let mut rx = endpoint(Direction::Rx, clock.clone());

    let mut tx_out: Option<ControlPacket> = None;
    let mut rx_out: Option<ControlPacket> = None;
    let mut tx_to_rx_count = 0usize;
    let mut rx_to_tx_count = 0usize;

    for _ in 0..4000 {
        if tx.probe_state() == ProbeState::Connected && rx.probe_state() == ProbeState::Connected {
            return;
        }

        let rx_input = tx_out.take().and_then(|packet| {
            tx_to_rx_count += 1;
            if tx_to_rx_count % 3 == 0 {
                None
            } else {
                Some(packet)
            }
        });
        let tx_input = rx_out.take().and_then(|packet| {
            rx_to_tx_count += 1;
            if rx_to_tx_count % 3 == 0 {
                None
            } else {
                Some(packet)
            }
        });

        let tx_step = tx.step_probe(tx_input.as_ref());
        let rx_step = rx.step_probe(rx_input.as_ref());
        tx_out = tx_step.outgoing;
        rx_out = rx_step.outgoing;

        clock.advance(Duration::from_millis(10));
    }
    panic!(
        "handshake did not converge under loss: tx={:?} rx={:?}",
        tx.probe_state(),
        rx.probe_state()
    );
}

#[test]
fn total_reset_ack_loss_still_proceeds_via_local_fallback() {
    // Neither side ever receives anything: each must still escape its own
    // reset wait via the local retry-exhaustion fallback rather than
    // deadlock forever waiting for a peer that's never heard from.
    let clock = Arc::new(ManualTimeProvider::new(Instant::now(), 0));
    let mut tx = endpoint(Direction::Tx, clock.clone());

    for _ in 0..2000 {
        if tx.probe_state() == ProbeState::FabricReset || tx.probe_state() == ProbeState::ResetDone {
            break;
        }
        tx.step_probe(None);
        clock.advance(Duration::from_millis(50));
    }
    assert_ne!(tx.probe_state(), ProbeState::Resetting, "tx never escaped the reset-ack wait");
}
