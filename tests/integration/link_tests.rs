//! Integration tests for the byte link: framing on the wire, receiver
//! resynchronisation, transmit results and retries.

use crate::mock_hw::{frame, inbound, Rig, DOG_ADDRESS};

use farmer::app::commands::FarmerCommand;
use farmer::app::events::FarmerEvent;
use farmer::comm::cipher::encrypt;
use farmer::comm::schema::PacketType;
use farmer::config::FarmerConfig;
use farmer::fsm::SessionState;

fn awaiting_ack() -> Rig {
    let mut rig = Rig::new(FarmerConfig::default());
    rig.farmer.handle_command(FarmerCommand::Pair).unwrap();
    rig.tick(20);
    assert_eq!(rig.farmer.state(), SessionState::AwaitingAck);
    rig.board_mut().take_written();
    rig
}

// ── Receive path ──────────────────────────────────────────────

#[test]
fn pair_request_shaped_frame_is_accepted_and_ignored() {
    let mut rig = Rig::new(FarmerConfig::default());
    rig.inject(&[0x7E, 0x00, 0x07, 0x01, 0x01, 0x00, 0xFF, 0xFF, 0x01, 0x39, 0xC5]);
    rig.drain_wire();

    let stats = rig.farmer.rx_stats();
    assert_eq!(stats.frames, 1);
    assert_eq!(stats.checksum_errors, 0);
    // An outbound-API frame means nothing to the session.
    assert_eq!(rig.farmer.state(), SessionState::Unpaired);
    assert_eq!(rig.count_events(|e| matches!(e, FarmerEvent::PacketReceived { .. })), 0);
}

#[test]
fn corrupted_checksum_is_dropped_silently() {
    let mut rig = awaiting_ack();
    let mut bad = inbound(DOG_ADDRESS, 0x02, &[]);
    *bad.last_mut().unwrap() ^= 0x01;
    rig.inject(&bad);
    rig.drain_wire();

    assert_eq!(rig.farmer.rx_stats().checksum_errors, 1);
    assert_eq!(rig.farmer.state(), SessionState::AwaitingAck);
}

#[test]
fn receiver_resyncs_after_line_noise() {
    let mut rig = awaiting_ack();
    rig.inject(&[0x00, 0x13, 0xFF, 0x42]);
    rig.inject(&inbound(DOG_ADDRESS, 0x02, &[]));
    rig.drain_wire();

    assert_eq!(rig.farmer.state(), SessionState::Paired);
    assert_eq!(rig.farmer.session().link().peer_address, DOG_ADDRESS);
    assert!(rig.count_events(|e| matches!(
        e,
        FarmerEvent::PacketReceived {
            packet_type: PacketType::Ack,
            source: DOG_ADDRESS
        }
    )) == 1);
}

#[test]
fn truncated_frame_times_out_and_next_frame_is_accepted() {
    let mut rig = awaiting_ack();
    let ack = inbound(DOG_ADDRESS, 0x02, &[]);
    rig.inject(&ack[..5]);
    rig.drain_wire();
    rig.tick(20);
    assert_eq!(rig.farmer.rx_stats().timeouts, 1);

    rig.inject(&ack);
    rig.drain_wire();
    assert_eq!(rig.farmer.rx_stats().frames, 1);
    assert_eq!(rig.farmer.state(), SessionState::Paired);
}

#[test]
fn unknown_packet_types_and_apis_are_ignored() {
    let mut rig = awaiting_ack();
    rig.inject(&inbound(DOG_ADDRESS, 0x09, &[]));
    rig.inject(&frame(&[0x55, 0x01, 0x02]));
    rig.drain_wire();

    assert_eq!(rig.farmer.rx_stats().frames, 2);
    assert_eq!(rig.farmer.state(), SessionState::AwaitingAck);
    assert_eq!(rig.count_events(|e| matches!(e, FarmerEvent::ServiceError { .. })), 0);
}

#[test]
fn modem_status_is_reported() {
    let mut rig = Rig::new(FarmerConfig::default());
    rig.inject(&frame(&[0x8A, 0x00]));
    rig.drain_wire();
    assert_eq!(rig.count_events(|e| *e == FarmerEvent::RadioStatus { status: 0 }), 1);
}

// ── Transmit path ─────────────────────────────────────────────

#[test]
fn control_frame_is_key_stream_encoded_on_the_wire() {
    let mut rig = Rig::paired();
    let seen = rig.dog().controls_seen();
    assert!(rig.until(|r| r.dog().controls_seen() > seen, 400));

    // Take the peer off the wire and watch the next control go out.
    rig.dog = None;
    rig.board_mut().take_written();
    let keys = rig.farmer.session().link().keys.clone();
    let idx = keys.index();

    let mut wire = Vec::new();
    for _ in 0..400 {
        rig.tick(1);
        wire.extend(rig.board_mut().take_written());
        if wire.len() >= 13 {
            break;
        }
    }
    assert_eq!(&wire[..3], &[0x7E, 0x00, 0x09]);
    assert_eq!(wire[3], 0x01, "outbound API");
    assert_eq!(&wire[5..7], &DOG_ADDRESS.to_be_bytes());
    assert_eq!(wire[8], encrypt(PacketType::Control as u8, keys.key(), idx));
    assert_eq!(rig.farmer.session().link().keys.index(), (idx + 4) % 32);
    assert_eq!(farmer::link::parse_frame(&wire[..13]).map(<[u8]>::len), Some(9));
}

#[test]
fn failed_delivery_is_retried_until_it_lands() {
    let mut rig = Rig::with_dog(FarmerConfig::default());
    rig.dog_mut().drop_next = 1;
    rig.farmer.handle_command(FarmerCommand::Pair).unwrap();

    assert!(rig.until(|r| r.farmer.state() == SessionState::Paired, 600));
    assert_eq!(
        rig.count_events(|e| *e == FarmerEvent::TransmitFailed { status: 1, attempt: 0 }),
        1
    );
    // The original request and one resend reached the DOG.
    assert!(rig.dog().frames_heard() >= 2);
    assert_eq!(rig.farmer.comm().attempt(), 0);
}

#[test]
fn retries_stop_after_the_configured_limit() {
    let mut rig = Rig::with_dog(FarmerConfig::default());
    rig.dog_mut().drop_next = 10;
    rig.farmer.handle_command(FarmerCommand::Pair).unwrap();
    rig.tick(1000);

    assert_eq!(rig.count_events(|e| matches!(e, FarmerEvent::TransmitFailed { .. })), 4);
    assert_eq!(rig.count_events(|e| *e == FarmerEvent::TransmitGaveUp { attempts: 3 }), 1);
    assert_eq!(rig.dog().frames_heard(), 4);

    rig.tick(2000);
    assert_eq!(rig.farmer.state(), SessionState::Unpaired);
}

#[test]
fn back_to_back_requests_are_serialised() {
    let mut rig = Rig::new(FarmerConfig::default());
    rig.farmer.handle_command(FarmerCommand::EnterDebug).unwrap();
    for _ in 0..3 {
        rig.farmer
            .handle_command(FarmerCommand::DebugSend(PacketType::PairRequest))
            .unwrap();
    }
    rig.tick(60);

    let wire = rig.board_mut().take_written();
    assert_eq!(wire.len(), 3 * 11);
    for chunk in wire.chunks(11) {
        assert_eq!(farmer::link::parse_frame(chunk).map(<[u8]>::len), Some(7));
    }
}

#[test]
fn transmit_result_for_an_unknown_frame_is_ignored() {
    let mut rig = Rig::paired();
    let failed = rig.count_events(|e| matches!(e, FarmerEvent::TransmitFailed { .. }));

    // Frame id 0 is never issued.
    rig.inject(&frame(&[0x89, 0x00, 0x02]));
    rig.drain_wire();
    assert_eq!(rig.count_events(|e| matches!(e, FarmerEvent::TransmitFailed { .. })), failed);
    assert_eq!(rig.farmer.comm().attempt(), 0);

    // Nothing was resent, so the DOG keeps decoding controls.
    for _ in 0..3 {
        let seen = rig.dog().controls_seen();
        assert!(rig.until(|r| r.dog().controls_seen() > seen, 400));
        assert_eq!(rig.dog().last_control().unwrap().packet_type, PacketType::Control as u8);
    }
}

#[test]
fn each_outbound_frame_carries_a_fresh_frame_id() {
    let mut rig = Rig::new(FarmerConfig::default());
    rig.farmer.handle_command(FarmerCommand::EnterDebug).unwrap();
    for _ in 0..3 {
        rig.farmer
            .handle_command(FarmerCommand::DebugSend(PacketType::PairRequest))
            .unwrap();
    }
    rig.tick(60);

    let wire = rig.board_mut().take_written();
    let ids: Vec<u8> = wire.chunks(11).map(|chunk| chunk[4]).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}
