//! Factory reset, network-initiated reset and firmware update reboot.

use moisture_node::adapters::sim::StackCommand;
use moisture_node::app::events::NodeEvent;
use moisture_node::app::friendship::FriendshipState;
use moisture_node::app::ports::{RestartMode, StoragePort};
use moisture_node::app::settings::SETTINGS_KEY;
use moisture_node::config::NodeConfig;
use moisture_node::events::StackEvent;
use moisture_node::fsm::LifecycleState;
use moisture_node::scheduler::TimerHandle;

use crate::mock_hw::Node;

fn restarts(node: &Node, mode: RestartMode) -> usize {
    node.count(|c| *c == StackCommand::Restart(mode))
}

#[test]
fn holding_primary_at_boot_wipes_the_node() {
    let mut node = Node::provisioned();
    node.board.write(SETTINGS_KEY, &0x0400u16.to_le_bytes()).unwrap();
    node.board.wiring.primary.hold_for(3);

    node.boot().unwrap();

    assert_eq!(restarts(&node, RestartMode::Normal), 1);
    assert!(!node.board.stack.is_provisioned());
    assert_eq!(node.lifecycle(), LifecycleState::Unprovisioned);
    assert_eq!(
        node.sink.lifecycle_path(),
        vec![
            LifecycleState::Resetting,
            LifecycleState::Unprovisioned,
            LifecycleState::Booted,
            LifecycleState::Unprovisioned,
        ]
    );
    assert_eq!(node.service.moisture().alarm_threshold(), 0x7FFF);
    assert_eq!(node.count(|c| matches!(c, StackCommand::InitNode(_))), 1);
    assert_eq!(
        node.sink.count(|e| *e == NodeEvent::RestartRequested { dfu: false }),
        1
    );
}

#[test]
fn released_primary_boots_normally() {
    let mut node = Node::provisioned();
    node.boot().unwrap();
    assert_eq!(restarts(&node, RestartMode::Normal), 0);
    assert_eq!(node.lifecycle(), LifecycleState::NetworkReady);
}

#[test]
fn network_reset_erases_then_reboots_after_delay() {
    let mut node = Node::provisioned();
    node.boot().unwrap();
    node.inject(StackEvent::ConnectionOpened { handle: 1 }).unwrap();

    node.inject(StackEvent::NodeResetRequested).unwrap();
    assert_eq!(node.lifecycle(), LifecycleState::Unprovisioned);
    assert_eq!(node.count(|c| *c == StackCommand::CloseConnection(1)), 1);
    assert!(node.board.stack.timer_armed(TimerHandle::REBOOT));
    assert!(!node.board.nvs.contains(SETTINGS_KEY));
    assert_eq!(restarts(&node, RestartMode::Normal), 0);

    node.run_until(2_000).unwrap();
    assert_eq!(restarts(&node, RestartMode::Normal), 1);
    assert_eq!(node.lifecycle(), LifecycleState::Unprovisioned);
    assert!(!node.service.moisture().is_registered());
    assert_eq!(node.service.friendship().state(), FriendshipState::Idle);
    assert_eq!(node.service.friendship().connections(), 0);
}

#[test]
fn network_reset_stops_sampling_during_reboot_delay() {
    let config = NodeConfig {
        reboot_delay_ms: 12_000,
        ..NodeConfig::default()
    };
    let mut node = Node::new(config);
    node.board.stack.set_provisioned(true);
    node.board.set_moisture(Some(0x0900));
    node.boot().unwrap();
    node.board.stack.clear_commands();

    node.inject(StackEvent::NodeResetRequested).unwrap();
    assert_eq!(
        node.sink.lifecycle_path(),
        vec![
            LifecycleState::NetworkReady,
            LifecycleState::Resetting,
            LifecycleState::Unprovisioned,
        ]
    );
    assert!(!node.board.stack.timer_armed(TimerHandle::MEASUREMENT));

    node.run_until(11_000).unwrap();
    assert_eq!(node.lifecycle(), LifecycleState::Unprovisioned);
    assert_eq!(node.count(|c| matches!(c, StackCommand::PublishState { .. })), 0);
    assert!(node.sink.measurements().is_empty());
    assert!(!node.board.wiring.probe_power.is_driven_high());
    assert_eq!(restarts(&node, RestartMode::Normal), 0);

    node.run_until(12_000).unwrap();
    assert_eq!(restarts(&node, RestartMode::Normal), 1);
}

#[test]
fn dfu_request_closes_link_then_enters_bootloader() {
    let mut node = Node::provisioned();
    node.boot().unwrap();
    node.inject(StackEvent::ConnectionOpened { handle: 3 }).unwrap();

    node.inject(StackEvent::DfuRequested { connection: 3 }).unwrap();

    assert_eq!(node.count(|c| *c == StackCommand::CloseConnection(3)), 1);
    assert_eq!(restarts(&node, RestartMode::Dfu), 1);
    assert!(node.board.stack.in_dfu());
    assert_eq!(
        node.sink.count(|e| *e == NodeEvent::RestartRequested { dfu: true }),
        1
    );
}

#[test]
fn ordinary_disconnect_does_not_restart() {
    let mut node = Node::provisioned();
    node.boot().unwrap();
    node.inject(StackEvent::ConnectionOpened { handle: 3 }).unwrap();
    node.inject(StackEvent::ConnectionClosed { handle: 3 }).unwrap();
    assert_eq!(restarts(&node, RestartMode::Dfu), 0);
    assert_eq!(restarts(&node, RestartMode::Normal), 0);
}
