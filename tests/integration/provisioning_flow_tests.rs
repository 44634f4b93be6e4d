//! Boot and provisioning flows: beaconing, OOB challenges, joining.

use moisture_node::adapters::sim::{AutoProvision, StackCommand};
use moisture_node::app::friendship::FriendshipState;
use moisture_node::app::ports::DisplayRow;
use moisture_node::app::settings::SETTINGS_KEY;
use moisture_node::app::ports::StoragePort;
use moisture_node::config::NodeConfig;
use moisture_node::events::{OobAction, StackEvent};
use moisture_node::fsm::LifecycleState;
use moisture_node::scheduler::TimerHandle;

use crate::mock_hw::Node;

fn blink_fire() -> StackEvent {
    StackEvent::SoftTimerFired {
        handle: TimerHandle::BLINK,
    }
}

// ── Boot ──────────────────────────────────────────────────────

#[test]
fn factory_fresh_boot_starts_beaconing() {
    let mut node = Node::unprovisioned();
    node.boot().unwrap();

    assert_eq!(node.lifecycle(), LifecycleState::Unprovisioned);
    assert_eq!(node.sink.lifecycle_path(), vec![LifecycleState::Unprovisioned]);
    assert!(matches!(node.commands()[0], StackCommand::InitNode(_)));
    assert_eq!(node.commands()[1], StackCommand::StartBeaconing);
    assert_eq!(node.commands()[2], StackCommand::ModelServerInit);

    assert_eq!(node.board.display(DisplayRow::BtAddr1), "Soil Moisture");
    assert_eq!(node.board.display(DisplayRow::BtAddr2), "00:0B:57:12:34:56");
    assert_eq!(node.board.display(DisplayRow::Connection), "Beaconing...");
    assert!(!node.service.moisture().is_registered());
}

#[test]
fn first_boot_writes_default_settings() {
    let mut node = Node::unprovisioned();
    node.boot().unwrap();

    let mut buf = [0u8; 4];
    let len = node.board.read(SETTINGS_KEY, &mut buf).unwrap();
    assert_eq!(&buf[..len], &[0xFF, 0x7F]);
    assert_eq!(node.service.moisture().alarm_threshold(), 0x7FFF);
}

#[test]
fn init_node_offers_every_auth_method() {
    let mut node = Node::unprovisioned();
    node.boot().unwrap();

    let StackCommand::InitNode(auth) = node.commands()[0] else {
        panic!("first command should be init_node");
    };
    assert!(auth.static_oob);
    assert!(auth.output_blink);
    assert!(auth.output_numeric);
    assert_eq!(auth.output_size, 4);
}

#[test]
fn provisioned_boot_goes_straight_to_network_ready() {
    let mut node = Node::provisioned();
    node.boot().unwrap();

    assert_eq!(node.lifecycle(), LifecycleState::NetworkReady);
    assert_eq!(node.sink.lifecycle_path(), vec![LifecycleState::NetworkReady]);
    assert_eq!(node.count(|c| *c == StackCommand::StartBeaconing), 0);
    assert_eq!(node.board.display(DisplayRow::Connection), "Ready");
    assert_eq!(node.board.display(DisplayRow::ClientAddr), "0x0105");
    assert!(node.service.moisture().is_registered());
    assert!(node.board.stack.timer_armed(TimerHandle::MEASUREMENT));
}

// ── Numeric OOB ───────────────────────────────────────────────

#[test]
fn numeric_challenge_is_shown_until_provisioned() {
    let mut node = Node::unprovisioned();
    node.boot().unwrap();

    node.dispatch(StackEvent::ProvisioningStarted).unwrap();
    assert_eq!(node.lifecycle(), LifecycleState::Provisioning);
    assert_eq!(node.board.display(DisplayRow::Connection), "Provisioning...");

    node.dispatch(StackEvent::display_oob(OobAction::Numeric, &[0, 0, 0x12, 0x34]))
        .unwrap();
    assert_eq!(node.board.display(DisplayRow::Passkey), "4660");

    node.inject(StackEvent::Provisioned).unwrap();
    assert_eq!(node.lifecycle(), LifecycleState::NetworkReady);
    assert_eq!(node.board.display(DisplayRow::Passkey), "");
    assert_eq!(node.board.display(DisplayRow::Connection), "Ready");
    assert_eq!(node.board.display(DisplayRow::ClientAddr), "0x0105");
    assert_eq!(
        node.sink.lifecycle_path(),
        vec![
            LifecycleState::Unprovisioned,
            LifecycleState::Provisioning,
            LifecycleState::NetworkReady,
        ]
    );
}

#[test]
fn numeric_width_follows_config() {
    let config = NodeConfig {
        numeric_oob_digits: 6,
        ..NodeConfig::default()
    };
    let mut node = Node::new(config);
    node.boot().unwrap();
    node.dispatch(StackEvent::ProvisioningStarted).unwrap();
    node.dispatch(StackEvent::display_oob(OobAction::Numeric, &[0x00, 0x2A]))
        .unwrap();
    assert_eq!(node.board.display(DisplayRow::Passkey), "000042");
}

#[test]
fn scripted_numeric_join_ends_in_low_power() {
    let mut node = Node::unprovisioned();
    node.board
        .stack
        .set_auto_provision(Some(AutoProvision::Numeric(0x1234)));
    node.boot().unwrap();

    assert_eq!(node.lifecycle(), LifecycleState::NetworkReady);
    assert!(node.board.stack.is_provisioned());
    assert_eq!(node.count(|c| *c == StackCommand::RegisterHandler(0)), 1);
    assert_eq!(node.service.friendship().state(), FriendshipState::Established);
}

#[test]
fn join_without_provisioning_start_still_becomes_ready() {
    let mut node = Node::unprovisioned();
    node.boot().unwrap();

    node.inject(StackEvent::Provisioned).unwrap();

    assert_eq!(node.lifecycle(), LifecycleState::NetworkReady);
    assert!(node.service.moisture().is_registered());
    assert!(node.board.stack.timer_armed(TimerHandle::MEASUREMENT));
    assert_eq!(node.board.display(DisplayRow::Connection), "Ready");
}

// ── Static OOB ────────────────────────────────────────────────

#[test]
fn static_oob_answers_with_configured_secret() {
    let mut node = Node::unprovisioned();
    node.board.stack.set_auto_provision(Some(AutoProvision::Static));
    node.boot().unwrap();

    assert_eq!(
        node.count(|c| *c == StackCommand::StaticOob(vec![0x12, 0x34])),
        1
    );
    assert_eq!(node.lifecycle(), LifecycleState::NetworkReady);
}

// ── Blink OOB ─────────────────────────────────────────────────

#[test]
fn blink_challenge_pulses_the_lamp() {
    let mut node = Node::unprovisioned();
    node.boot().unwrap();
    node.dispatch(StackEvent::ProvisioningStarted).unwrap();

    node.dispatch(StackEvent::display_oob(OobAction::Blink, &[2]))
        .unwrap();
    assert!(node.board.lamp_on());
    assert!(node.service.connectivity().is_presenting_oob());
    assert!(node.board.stack.timer_armed(TimerHandle::BLINK));

    let mut trace = Vec::new();
    for _ in 0..4 {
        node.dispatch(blink_fire()).unwrap();
        trace.push(node.board.lamp_on());
    }
    assert_eq!(trace, vec![false, true, false, true]);
}

#[test]
fn failed_provisioning_stops_blinking_and_rebeacons() {
    let mut node = Node::unprovisioned();
    node.boot().unwrap();
    node.dispatch(StackEvent::ProvisioningStarted).unwrap();
    node.dispatch(StackEvent::display_oob(OobAction::Blink, &[3]))
        .unwrap();

    node.inject(StackEvent::ProvisioningFailed { reason: 0x0003 })
        .unwrap();

    assert_eq!(node.lifecycle(), LifecycleState::Unprovisioned);
    assert!(!node.board.lamp_on());
    assert!(!node.board.stack.timer_armed(TimerHandle::BLINK));
    assert!(!node.service.connectivity().is_presenting_oob());
    assert_eq!(node.count(|c| *c == StackCommand::StartBeaconing), 2);
    assert_eq!(node.board.display(DisplayRow::Connection), "Beaconing...");
}

#[test]
fn unsupported_oob_action_is_declined() {
    let mut node = Node::unprovisioned();
    node.boot().unwrap();
    node.dispatch(StackEvent::ProvisioningStarted).unwrap();

    node.dispatch(StackEvent::display_oob(OobAction::Unsupported(7), &[1]))
        .unwrap();
    assert!(!node.board.lamp_on());
    assert_eq!(node.board.display(DisplayRow::Passkey), "");
    assert_eq!(node.lifecycle(), LifecycleState::Provisioning);
}

#[test]
fn network_members_ignore_a_stray_provisioning_start() {
    let mut node = Node::provisioned();
    node.boot().unwrap();
    node.dispatch(StackEvent::ProvisioningStarted).unwrap();
    assert_eq!(node.lifecycle(), LifecycleState::NetworkReady);
}
