//! Integration tests for the pairing, liveness and control pipeline:
//! inputs → session → codec → wire → DOG, and back.

use crate::mock_hw::{inbound, Rig, DOG_ADDRESS};

use farmer::app::commands::FarmerCommand;
use farmer::app::events::FarmerEvent;
use farmer::comm::schema::PacketType;
use farmer::config::FarmerConfig;
use farmer::fsm::SessionState;
use farmer::pins::AnalogChannel;

// ── Pairing ───────────────────────────────────────────────────

#[test]
fn touch_release_pairs_with_dog_and_shares_key() {
    let mut rig = Rig::with_dog(FarmerConfig::default());
    // Power-up lockout of the touch debouncer.
    rig.tick(130);

    rig.board_mut().press_touch(true);
    rig.tick(130);
    rig.board_mut().press_touch(false);
    rig.tick(1);
    assert_eq!(rig.farmer.state(), SessionState::AwaitingAck);

    assert!(rig.until(|r| r.dog().is_paired(), 400));
    assert_eq!(rig.farmer.state(), SessionState::Paired);
    assert!(rig.board().paired_led());

    let link = rig.farmer.session().link();
    assert_eq!(link.peer_address, DOG_ADDRESS);
    assert_eq!(rig.dog().keys().key(), link.keys.key());
    assert_ne!(link.keys.key(), &[0u8; 32]);
}

#[test]
fn state_changes_are_emitted_in_order() {
    let rig = Rig::paired();
    let changes: Vec<_> = rig
        .board()
        .events()
        .iter()
        .filter_map(|e| match e {
            FarmerEvent::StateChanged { from, to } => Some((*from, *to)),
            _ => None,
        })
        .collect();
    assert_eq!(
        changes,
        vec![
            (SessionState::Unpaired, SessionState::AwaitingAck),
            (SessionState::AwaitingAck, SessionState::Paired),
        ]
    );
}

#[test]
fn wrong_dog_tag_is_never_acked() {
    let mut rig = Rig::new(FarmerConfig::default());
    rig.dog = Some(farmer::adapters::sim::SimDog::new(DOG_ADDRESS, 7));
    rig.farmer.handle_command(FarmerCommand::Pair).unwrap();
    rig.tick(500);
    assert_eq!(rig.farmer.state(), SessionState::AwaitingAck);
    assert!(!rig.dog().is_paired());
}

#[test]
fn unanswered_pairing_gives_up_after_lost_comm_window() {
    let mut rig = Rig::new(FarmerConfig::default());
    rig.farmer.handle_command(FarmerCommand::Pair).unwrap();
    rig.tick(1);
    assert_eq!(rig.farmer.state(), SessionState::AwaitingAck);

    rig.tick(2900);
    assert_eq!(rig.farmer.state(), SessionState::AwaitingAck);
    rig.tick(40);
    assert_eq!(rig.farmer.state(), SessionState::Unpaired);

    // Only the pairing request ever went out.
    let sent = rig.count_events(|e| matches!(e, FarmerEvent::PacketSent { .. }));
    assert_eq!(sent, 1);
    assert!(!rig.board().paired_led());
}

// ── Control stream ────────────────────────────────────────────

#[test]
fn dog_decrypts_control_packets() {
    let mut rig = Rig::paired();
    rig.board_mut().set_analog(AnalogChannel::AccelFrontBack, 0x0ABC);
    rig.board_mut().set_analog(AnalogChannel::AccelRightLeft, 0x0123);

    let seen = rig.dog().controls_seen();
    assert!(rig.until(|r| r.dog().controls_seen() >= seen + 3, 1200));

    let sample = rig.dog().last_control().unwrap();
    assert_eq!(sample.packet_type, PacketType::Control as u8);
    assert_eq!(sample.accel_front_back, 0xAB);
    assert_eq!(sample.accel_right_left, 0x12);
    assert_eq!(sample.controls, 0);
}

#[test]
fn control_cadence_follows_inter_message_timer() {
    let mut rig = Rig::paired();
    let seen = rig.dog().controls_seen();
    rig.tick(300 * 5);
    let delta = rig.dog().controls_seen() - seen;
    assert!((4..=6).contains(&delta), "{delta} controls in five periods");
}

#[test]
fn nose_release_toggles_peripheral_bit() {
    let mut rig = Rig::paired();
    rig.tick(250);

    rig.board_mut().press_nose(true);
    rig.tick(250);
    rig.board_mut().press_nose(false);
    rig.tick(1);
    assert!(rig.farmer.session().link().peripheral_on);

    // A control already on the wire may still carry the old bit.
    let seen = rig.dog().controls_seen();
    assert!(rig.until(|r| r.dog().controls_seen() > seen + 1, 700));
    assert_eq!(rig.dog().last_control().unwrap().controls, 0x01);
}

#[test]
fn dog_initiated_reset_keeps_streams_in_step() {
    let mut rig = Rig::paired();
    for _ in 0..3 {
        let seen = rig.dog().controls_seen();
        assert!(rig.until(|r| r.dog().controls_seen() > seen, 400));
    }

    let board = rig.farmer.board_mut();
    rig.dog.as_mut().unwrap().send_reset(board).unwrap();
    rig.drain_wire();
    assert_eq!(rig.farmer.session().link().keys.index(), 0);

    for _ in 0..3 {
        let seen = rig.dog().controls_seen();
        assert!(rig.until(|r| r.dog().controls_seen() > seen, 400));
        assert_eq!(rig.dog().last_control().unwrap().packet_type, PacketType::Control as u8);
    }
}

// ── Reports and liveness ──────────────────────────────────────

#[test]
fn reports_drive_peer_status_and_keep_session_alive() {
    let mut rig = Rig::paired();
    rig.dog_mut().telemetry = [0x01, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];

    // Far longer than the lost-comm window; reports keep refreshing it.
    rig.tick(3 * 2928);
    assert_eq!(rig.farmer.state(), SessionState::Paired);
    assert!(rig.board().peer_led());
    assert_eq!(rig.farmer.telemetry(), &rig.dog().telemetry);

    rig.dog_mut().telemetry[0] = 0x00;
    let seen = rig.dog().controls_seen();
    assert!(rig.until(|r| r.dog().controls_seen() > seen, 400));
    rig.tick(40);
    assert!(!rig.board().peer_led());
}

#[test]
fn silent_dog_unpairs_exactly_once() {
    let mut rig = Rig::paired();
    rig.tick(600);
    rig.dog_mut().silent = true;

    rig.tick(2928 + 400);
    assert_eq!(rig.farmer.state(), SessionState::Unpaired);
    assert!(!rig.board().paired_led());
    assert!(!rig.farmer.session().link().paired);

    rig.tick(5000);
    let unpairs = rig.count_events(|e| {
        matches!(
            e,
            FarmerEvent::StateChanged {
                from: SessionState::Paired,
                to: SessionState::Unpaired
            }
        )
    });
    assert_eq!(unpairs, 1);
}

#[test]
fn reports_from_other_addresses_do_not_refresh_liveness() {
    let mut rig = Rig::paired();
    rig.dog_mut().silent = true;

    for _ in 0..12 {
        rig.inject(&inbound(0x1111, 0x00, &[0x01; 12]));
        rig.tick(300);
    }
    assert_eq!(rig.farmer.state(), SessionState::Unpaired);
}

#[test]
fn session_timer_ends_the_game() {
    let config = FarmerConfig {
        session_ticks: Some(2000),
        ..FarmerConfig::default()
    };
    let mut rig = Rig::with_dog(config);
    rig.farmer.handle_command(FarmerCommand::Pair).unwrap();
    assert!(rig.until(|r| r.farmer.state() == SessionState::Paired, 400));

    rig.tick(1990);
    assert_eq!(rig.farmer.state(), SessionState::Paired);
    rig.tick(20);
    assert_eq!(rig.farmer.state(), SessionState::Unpaired);
}

// ── Commands ──────────────────────────────────────────────────

#[test]
fn unpair_command_drops_session_and_key() {
    let mut rig = Rig::paired();
    rig.farmer.handle_command(FarmerCommand::Unpair).unwrap();
    rig.tick(1);
    assert_eq!(rig.farmer.state(), SessionState::Unpaired);
    assert!(!rig.board().paired_led());
    assert_eq!(rig.farmer.session().link().keys.key(), &[0u8; 32]);

    // Pairing again works and issues a different key.
    let old = *rig.dog().keys().key();
    rig.farmer.handle_command(FarmerCommand::Pair).unwrap();
    assert!(rig.until(|r| r.farmer.state() == SessionState::Paired, 400));
    assert!(rig.until(|r| r.dog().keys().key() != &old, 200));
}

#[test]
fn debug_mode_sends_requested_packets() {
    let mut rig = Rig::new(FarmerConfig::default());
    rig.farmer.handle_command(FarmerCommand::EnterDebug).unwrap();
    rig.tick(1);
    assert_eq!(rig.farmer.state(), SessionState::Debug);

    rig.farmer
        .handle_command(FarmerCommand::DebugSend(PacketType::ResetEncryption))
        .unwrap();
    rig.tick(20);
    assert_eq!(
        rig.count_events(|e| matches!(
            e,
            FarmerEvent::PacketSent {
                packet_type: PacketType::ResetEncryption,
                len: 10
            }
        )),
        1
    );

    // Control needs a session key; it is refused, not sent.
    rig.farmer
        .handle_command(FarmerCommand::DebugSend(PacketType::Control))
        .unwrap();
    rig.tick(20);
    assert_eq!(rig.count_events(|e| matches!(e, FarmerEvent::ServiceError { .. })), 1);

    rig.farmer.handle_command(FarmerCommand::ExitDebug).unwrap();
    rig.tick(1);
    assert_eq!(rig.farmer.state(), SessionState::Unpaired);
}
