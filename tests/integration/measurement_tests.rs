//! Measurement cycle, alarm publication, threshold writes and fatal paths.

use core::time::Duration;

use moisture_node::adapters::sim::StackCommand;
use moisture_node::app::events::NodeEvent;
use moisture_node::app::moisture::{MeasurementPhase, ALARM_SENTINEL};
use moisture_node::app::ports::{Button, DisplayRow, StoragePort, TimerPort};
use moisture_node::app::settings::SETTINGS_KEY;
use moisture_node::error::FatalKind;
use moisture_node::events::{ClientRequest, StackEvent};
use moisture_node::scheduler::{TimerHandle, TimerMode, TIMER_SLOTS};

use crate::mock_hw::Node;

fn fired(handle: TimerHandle) -> StackEvent {
    StackEvent::SoftTimerFired { handle }
}

fn set_level(level: i16, response_required: bool) -> StackEvent {
    StackEvent::ModelClientRequest(ClientRequest {
        element_index: 0,
        client_address: 0x0201,
        appkey_index: 0,
        level,
        response_required,
    })
}

fn publish_trace(node: &Node) -> Vec<StackCommand> {
    node.commands()
        .iter()
        .filter(|c| {
            matches!(
                c,
                StackCommand::UpdateState { .. } | StackCommand::PublishState { .. }
            )
        })
        .cloned()
        .collect()
}

fn ready_node() -> Node {
    let mut node = Node::provisioned();
    node.boot().unwrap();
    node
}

// ── Periodic cycle ────────────────────────────────────────────

#[test]
fn periodic_measurement_reports_and_publishes() {
    let mut node = Node::provisioned();
    node.board.set_moisture(Some(0x0500));
    node.boot().unwrap();
    node.run_until(11_000).unwrap();

    assert_eq!(node.sink.measurements(), vec![(0x0500, false), (0x0500, false)]);
    assert_eq!(node.updated_levels(), vec![ALARM_SENTINEL, 0x0500, 0x0500]);
    assert_eq!(node.count(|c| matches!(c, StackCommand::PublishState { .. })), 2);
    assert_eq!(node.board.display(DisplayRow::Reading), "Moist: 0x0500");
    assert!(!node.board.wiring.probe_power.is_driven_high());
    assert_eq!(node.service.moisture().last_reading(), Some(0x0500));
}

#[test]
fn no_measurements_before_joining() {
    let mut node = Node::unprovisioned();
    node.board.set_moisture(Some(0x0500));
    node.boot().unwrap();
    node.run_until(30_000).unwrap();

    assert!(node.sink.measurements().is_empty());
    assert!(!node.board.stack.timer_armed(TimerHandle::MEASUREMENT));
}

#[test]
fn alarm_publishes_sentinel_before_reading() {
    let mut node = ready_node();
    node.dispatch(set_level(1, false)).unwrap();
    assert_eq!(node.service.moisture().alarm_threshold(), 0x0400);

    node.board.set_moisture(Some(0x0800));
    node.board.stack.clear_commands();
    node.run_until(5_010).unwrap();

    assert_eq!(node.sink.measurements(), vec![(0x0800, true)]);
    assert_eq!(
        publish_trace(&node),
        vec![
            StackCommand::UpdateState { element: 0, level: ALARM_SENTINEL },
            StackCommand::PublishState { element: 0 },
            StackCommand::UpdateState { element: 0, level: 0x0800 },
            StackCommand::PublishState { element: 0 },
        ]
    );
}

#[test]
fn reading_at_threshold_counts_as_alarm() {
    let mut node = ready_node();
    node.dispatch(set_level(2, false)).unwrap();
    node.board.set_moisture(Some(0x0800));
    node.run_until(5_010).unwrap();
    assert_eq!(node.sink.measurements(), vec![(0x0800, true)]);
}

// ── Mutual exclusion ──────────────────────────────────────────

#[test]
fn tick_while_settling_is_ignored() {
    let mut node = ready_node();
    node.board.set_moisture(Some(0x0300));

    node.dispatch(fired(TimerHandle::MEASUREMENT)).unwrap();
    assert_eq!(node.service.moisture().phase(), MeasurementPhase::PowerSettling);
    assert!(node.board.wiring.probe_power.is_driven_high());

    node.dispatch(fired(TimerHandle::MEASUREMENT)).unwrap();
    assert_eq!(node.service.moisture().phase(), MeasurementPhase::PowerSettling);

    node.dispatch(fired(TimerHandle::SOIL_SETTLE)).unwrap();
    assert_eq!(node.service.moisture().phase(), MeasurementPhase::Idle);
    assert_eq!(node.sink.measurements(), vec![(0x0300, false)]);
    assert!(!node.board.wiring.probe_power.is_driven_high());
}

#[test]
fn stray_settle_timer_is_ignored() {
    let mut node = ready_node();
    node.board.set_moisture(Some(0x0300));
    node.dispatch(fired(TimerHandle::SOIL_SETTLE)).unwrap();
    assert!(node.sink.measurements().is_empty());
}

#[test]
fn failed_conversion_is_not_fatal() {
    let mut node = ready_node();
    node.board.set_moisture(None);

    node.dispatch(fired(TimerHandle::MEASUREMENT)).unwrap();
    node.dispatch(fired(TimerHandle::SOIL_SETTLE)).unwrap();

    assert!(node.sink.measurements().is_empty());
    assert_eq!(node.service.moisture().phase(), MeasurementPhase::Idle);
    assert!(!node.board.wiring.probe_power.is_driven_high());
}

#[test]
fn publish_failure_does_not_stop_sampling() {
    let mut node = ready_node();
    node.board.stack.set_fail_publish(true);
    node.board.set_moisture(Some(0x0100));
    node.run_until(10_010).unwrap();
    assert_eq!(node.sink.measurements().len(), 2);
}

// ── Threshold writes ──────────────────────────────────────────

#[test]
fn threshold_burst_is_saved_once() {
    let mut node = ready_node();
    let writes_before = node.board.nvs.write_count();

    for level in 1..=3 {
        node.dispatch(set_level(level, true)).unwrap();
    }
    assert!(node.service.moisture().settings().is_dirty());
    node.run_until(10_000).unwrap();

    assert_eq!(node.board.nvs.write_count(), writes_before + 1);
    let mut buf = [0u8; 2];
    node.board.read(SETTINGS_KEY, &mut buf).unwrap();
    assert_eq!(u16::from_le_bytes(buf), 0x0C00);
    assert_eq!(
        node.sink.count(|e| matches!(e, NodeEvent::ThresholdChanged { .. })),
        3
    );
    assert_eq!(
        node.sink
            .count(|e| *e == NodeEvent::SettingsPersisted { threshold: 0x0C00 }),
        1
    );
}

#[test]
fn client_request_is_answered_with_new_threshold() {
    let mut node = ready_node();
    node.dispatch(set_level(4, true)).unwrap();

    assert_eq!(
        node.count(|c| *c
            == StackCommand::Respond {
                element: 0,
                client: 0x0201,
                appkey_index: 0,
                level: 0x0E00,
            }),
        1
    );
    assert_eq!(node.board.display(DisplayRow::Action), "New: 0x0E00");
}

#[test]
fn client_is_answered_even_without_a_toast_slot() {
    let mut node = ready_node();
    let free = TIMER_SLOTS - node.board.stack.armed_timers();
    // Leave exactly one slot, which the settings debounce takes.
    for i in 0..free - 1 {
        node.board
            .stack
            .arm(
                TimerHandle(100 + i as u8),
                Duration::from_secs(3_600),
                TimerMode::OneShot,
            )
            .unwrap();
    }

    node.dispatch(set_level(4, true)).unwrap();

    assert_eq!(node.service.moisture().alarm_threshold(), 0x0E00);
    assert!(node.board.stack.timer_armed(TimerHandle::SAVE));
    assert!(!node.board.stack.timer_armed(TimerHandle::TOAST));
    assert_eq!(
        node.count(|c| *c
            == StackCommand::Respond {
                element: 0,
                client: 0x0201,
                appkey_index: 0,
                level: 0x0E00,
            }),
        1
    );
    assert_eq!(node.board.display(DisplayRow::Action), "");
}

#[test]
fn unchanged_threshold_is_not_rewritten() {
    let mut node = ready_node();
    node.dispatch(set_level(7, false)).unwrap();

    assert!(!node.board.stack.timer_armed(TimerHandle::SAVE));
    assert_eq!(
        node.sink.count(|e| matches!(e, NodeEvent::ThresholdChanged { .. })),
        0
    );
    assert_eq!(node.count(|c| matches!(c, StackCommand::Respond { .. })), 0);
}

#[test]
fn negative_level_selects_lowest_threshold() {
    let mut node = ready_node();
    node.dispatch(set_level(-5, false)).unwrap();
    assert_eq!(node.service.moisture().alarm_threshold(), 0x0000);
}

#[test]
fn model_requests_before_registration_are_dropped() {
    let mut node = Node::unprovisioned();
    node.boot().unwrap();
    node.dispatch(set_level(1, true)).unwrap();
    assert_eq!(node.service.moisture().alarm_threshold(), 0x7FFF);
    assert_eq!(node.count(|c| matches!(c, StackCommand::Respond { .. })), 0);
}

// ── Forced transmit ───────────────────────────────────────────

#[test]
fn button_forces_alarm_transmit_once_per_press() {
    let mut node = ready_node();
    node.board.stack.clear_commands();

    assert!(node.board.press(Button::Primary));
    assert!(!node.board.press(Button::Primary));
    node.run().unwrap();

    assert_eq!(node.updated_levels(), vec![ALARM_SENTINEL]);
    assert_eq!(node.count(|c| matches!(c, StackCommand::PublishState { .. })), 1);
    assert_eq!(node.board.display(DisplayRow::Action), "Forced TX");
    assert!(node.board.hw.latch(Button::Primary).is_armed());
}

#[test]
fn forced_transmit_toast_clears() {
    let mut node = ready_node();
    node.board.press(Button::Primary);
    node.run_until(3_000).unwrap();
    assert_eq!(node.board.display(DisplayRow::Action), "");
}

#[test]
fn forced_transmit_needs_network() {
    let mut node = Node::unprovisioned();
    node.boot().unwrap();
    node.board.stack.clear_commands();

    node.board.press(Button::Primary);
    node.run().unwrap();

    assert!(node.updated_levels().is_empty());
    assert!(node.board.hw.latch(Button::Primary).is_armed());
}

// ── Fatal paths ───────────────────────────────────────────────

#[test]
fn timer_exhaustion_is_fatal_and_logged() {
    let mut node = Node::provisioned();
    for i in 0..TIMER_SLOTS {
        node.board
            .stack
            .arm(
                TimerHandle(100 + i as u8),
                Duration::from_secs(3_600),
                TimerMode::OneShot,
            )
            .unwrap();
    }

    let fatal = node.boot().unwrap_err();
    assert_eq!(fatal.kind, FatalKind::TimerTableFull);
    assert_eq!(fatal.op, "measurement");
    assert_eq!(fatal.param, u32::from(TimerHandle::MEASUREMENT.0));
    assert_eq!(node.sink.count(|e| *e == NodeEvent::Fatal(fatal)), 1);

    let log = node.service.fatal_log().read_all(&node.board);
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].op.as_str(), "measurement");
    assert_eq!(log[0].kind, FatalKind::TimerTableFull as u8);
}

#[test]
fn model_allocation_failure_is_fatal() {
    let mut node = Node::provisioned();
    node.board.stack.set_fail_model_alloc(true);

    let fatal = node.boot().unwrap_err();
    assert_eq!(fatal.kind, FatalKind::ModelAllocation);
    assert_eq!(fatal.param, 8);
    assert!(!node.service.moisture().is_registered());
}
