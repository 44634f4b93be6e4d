//! Test harness around the simulated board.
//!
//! [`Node`] bundles a [`NodeService`] with a [`SimBoard`] and a sink that
//! records every emitted event, so tests can drive the node one event at
//! a time or let it run to the simulation horizon.

use moisture_node::adapters::sim::{SimBoard, StackCommand};
use moisture_node::app::events::NodeEvent;
use moisture_node::app::ports::EventSink;
use moisture_node::app::service::NodeService;
use moisture_node::config::NodeConfig;
use moisture_node::error::FatalError;
use moisture_node::events::StackEvent;
use moisture_node::fsm::LifecycleState;

// ── Recording sink ────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<NodeEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn count(&self, pred: impl Fn(&NodeEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    /// Lifecycle states entered, in order.
    pub fn lifecycle_path(&self) -> Vec<LifecycleState> {
        self.events
            .iter()
            .filter_map(|e| match e {
                NodeEvent::LifecycleChanged { to, .. } => Some(*to),
                _ => None,
            })
            .collect()
    }

    pub fn measurements(&self) -> Vec<(u16, bool)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                NodeEvent::Measurement { raw, alarm } => Some((*raw, *alarm)),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &NodeEvent) {
        self.events.push(event.clone());
    }
}

// ── Node harness ──────────────────────────────────────────────

pub struct Node {
    pub service: NodeService,
    pub board: SimBoard,
    pub sink: RecordingSink,
}

#[allow(dead_code)]
impl Node {
    pub fn new(config: NodeConfig) -> Self {
        let mut board = SimBoard::new(&config).expect("sim flash");
        let mut service = NodeService::new(config);
        service.start(&mut board);
        Self {
            service,
            board,
            sink: RecordingSink::default(),
        }
    }

    /// Factory-fresh node.
    pub fn unprovisioned() -> Self {
        Self::new(NodeConfig::default())
    }

    /// Node whose flash already holds network membership.
    pub fn provisioned() -> Self {
        let mut node = Self::unprovisioned();
        node.board.stack.set_provisioned(true);
        node
    }

    /// Queue `Boot` and run until the stack goes quiet.
    pub fn boot(&mut self) -> Result<u64, FatalError> {
        self.board.stack.push_event(StackEvent::Boot);
        self.run()
    }

    pub fn run(&mut self) -> Result<u64, FatalError> {
        self.service.run(&mut self.board, &mut self.sink)
    }

    /// Run with timers allowed to fire up to `ms` of virtual time.
    pub fn run_until(&mut self, ms: u64) -> Result<u64, FatalError> {
        self.board.stack.set_horizon(ms);
        self.run()
    }

    /// Queue one event and run until quiet.
    pub fn inject(&mut self, event: StackEvent) -> Result<u64, FatalError> {
        self.board.stack.push_event(event);
        self.run()
    }

    /// Dispatch one event directly, bypassing the stack queue.
    pub fn dispatch(&mut self, event: StackEvent) -> Result<(), FatalError> {
        self.service
            .dispatch(&event, &mut self.board, &mut self.sink)
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.service.lifecycle()
    }

    pub fn commands(&self) -> &[StackCommand] {
        self.board.stack.commands()
    }

    pub fn count(&self, pred: impl Fn(&StackCommand) -> bool) -> usize {
        self.board.stack.count(pred)
    }

    /// Levels passed to `update_state`, in order.
    pub fn updated_levels(&self) -> Vec<i16> {
        self.commands()
            .iter()
            .filter_map(|c| match c {
                StackCommand::UpdateState { level, .. } => Some(*level),
                _ => None,
            })
            .collect()
    }
}
