//! Low-power friendship supervision.

use core::time::Duration;

use moisture_node::adapters::sim::StackCommand;
use moisture_node::app::events::NodeEvent;
use moisture_node::app::friendship::FriendshipState;
use moisture_node::app::ports::DisplayRow;
use moisture_node::events::StackEvent;
use moisture_node::scheduler::TimerHandle;

use crate::mock_hw::Node;

fn establish_attempts(node: &Node) -> usize {
    node.count(|c| *c == StackCommand::EstablishFriendship)
}

#[test]
fn joined_node_becomes_low_power() {
    let mut node = Node::provisioned();
    node.boot().unwrap();

    assert_eq!(node.count(|c| *c == StackCommand::LpnInit), 1);
    assert_eq!(
        node.count(|c| *c
            == StackCommand::LpnConfigure {
                queue_depth: 4,
                poll_timeout: Duration::from_secs(30),
            }),
        1
    );
    assert_eq!(establish_attempts(&node), 1);
    assert_eq!(node.service.friendship().state(), FriendshipState::Established);
    assert!(node.service.friendship().is_low_power());

    let phases: Vec<_> = node
        .sink
        .events
        .iter()
        .filter_map(|e| match e {
            NodeEvent::FriendshipChanged(s) => Some(*s),
            _ => None,
        })
        .collect();
    assert_eq!(
        phases,
        vec![FriendshipState::Establishing, FriendshipState::Established]
    );
}

#[test]
fn unprovisioned_node_never_polls() {
    let mut node = Node::unprovisioned();
    node.boot().unwrap();
    node.inject(StackEvent::ConnectionOpened { handle: 1 }).unwrap();
    node.inject(StackEvent::ConnectionClosed { handle: 1 }).unwrap();

    assert_eq!(node.count(|c| *c == StackCommand::LpnInit), 0);
    assert_eq!(node.service.friendship().state(), FriendshipState::Idle);
}

#[test]
fn connection_suspends_low_power_until_closed() {
    let mut node = Node::provisioned();
    node.boot().unwrap();

    node.inject(StackEvent::ConnectionOpened { handle: 1 }).unwrap();
    assert_eq!(node.count(|c| *c == StackCommand::LpnDeinit), 1);
    assert_eq!(node.service.friendship().state(), FriendshipState::Idle);
    assert_eq!(node.service.friendship().connections(), 1);

    node.inject(StackEvent::ConnectionClosed { handle: 1 }).unwrap();
    assert_eq!(node.count(|c| *c == StackCommand::LpnInit), 2);
    assert_eq!(node.service.friendship().state(), FriendshipState::Established);
}

#[test]
fn low_power_waits_for_last_connection() {
    let mut node = Node::provisioned();
    node.boot().unwrap();

    node.inject(StackEvent::ConnectionOpened { handle: 1 }).unwrap();
    node.inject(StackEvent::ConnectionOpened { handle: 2 }).unwrap();
    node.inject(StackEvent::ConnectionClosed { handle: 1 }).unwrap();
    assert_eq!(node.count(|c| *c == StackCommand::LpnInit), 1);
    assert_eq!(node.service.friendship().state(), FriendshipState::Idle);

    node.inject(StackEvent::ConnectionClosed { handle: 2 }).unwrap();
    assert_eq!(node.count(|c| *c == StackCommand::LpnInit), 2);
}

#[test]
fn failed_attempts_retry_after_backoff() {
    let mut node = Node::provisioned();
    node.board.stack.set_friend_available(false);
    node.boot().unwrap();

    assert_eq!(establish_attempts(&node), 1);
    assert!(node.board.stack.timer_armed(TimerHandle::BEFRIEND));

    node.run_until(18_999).unwrap();
    assert_eq!(establish_attempts(&node), 1);

    node.run_until(40_000).unwrap();
    assert_eq!(establish_attempts(&node), 3);
    assert_eq!(node.service.friendship().state(), FriendshipState::Idle);
}

#[test]
fn connection_cancels_pending_retry() {
    let mut node = Node::provisioned();
    node.board.stack.set_friend_available(false);
    node.boot().unwrap();

    node.inject(StackEvent::ConnectionOpened { handle: 1 }).unwrap();
    assert!(!node.board.stack.timer_armed(TimerHandle::BEFRIEND));
    node.run_until(40_000).unwrap();
    assert_eq!(establish_attempts(&node), 1);
}

#[test]
fn lost_friend_is_replaced_immediately() {
    let mut node = Node::provisioned();
    node.boot().unwrap();

    node.inject(StackEvent::FriendshipTerminated { reason: 0x0001 })
        .unwrap();
    assert_eq!(establish_attempts(&node), 2);
    assert_eq!(node.service.friendship().state(), FriendshipState::Established);
}

#[test]
fn stay_awake_button_overrides_low_power() {
    let mut node = Node::provisioned();
    node.board.wiring.secondary.hold();
    node.boot().unwrap();

    assert!(node.service.friendship().stay_awake());
    assert_eq!(node.count(|c| *c == StackCommand::LpnDeinit), 1);
    assert_eq!(node.service.friendship().state(), FriendshipState::Idle);
    assert!(!node.service.friendship().is_low_power());
    assert_eq!(node.board.display(DisplayRow::Action), "Forced Awake");

    node.board.wiring.secondary.release();
    node.inject(StackEvent::ConnectionOpened { handle: 1 }).unwrap();
    node.inject(StackEvent::ConnectionClosed { handle: 1 }).unwrap();
    assert_eq!(node.count(|c| *c == StackCommand::LpnInit), 1);
}
