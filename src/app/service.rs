//! Node service: the hexagonal core and event dispatcher.
//!
//! [`NodeService`] owns every component's state and routes each inbound
//! [`StackEvent`] to all of them in a fixed order.  All I/O flows through
//! port traits injected at call sites, making the whole node testable
//! against the simulation adapters.
//!
//! ```text
//!                      ┌──────────────────────────────┐
//!  wait_event() ─────▶ │          NodeService         │ ──▶ EventSink
//!                      │  1. Connectivity (+ OOB)     │
//!  NodePorts ◀──────── │  2. Moisture (+ settings)    │
//!                      │  3. Friendship               │
//!                      └──────────────────────────────┘
//! ```
//!
//! Handlers run to completion, one event at a time.  A fatal error stops
//! the dispatch, is written to the fatal log and returned to the caller;
//! every other error is logged and the next component still runs.

use log::{debug, error, info, warn};

use crate::config::NodeConfig;
use crate::diagnostics::{FatalEntry, FatalLog};
use crate::error::{Error, FatalError, Result};
use crate::events::{Signals, StackEvent};
use crate::fsm::LifecycleState;

use super::connectivity::Connectivity;
use super::events::NodeEvent;
use super::friendship::FriendshipManager;
use super::moisture::MoistureServer;
use super::ports::{Button, EventSink, ModelHandler, NodePorts};

// ───────────────────────────────────────────────────────────────
// NodeService
// ───────────────────────────────────────────────────────────────

pub struct NodeService {
    config: NodeConfig,
    connectivity: Connectivity,
    moisture: MoistureServer,
    friendship: FriendshipManager,
    fatal_log: FatalLog,
    dispatched: u64,
}

impl NodeService {
    /// Construct the service from a validated configuration.
    pub fn new(config: NodeConfig) -> Self {
        Self {
            connectivity: Connectivity::new(&config),
            moisture: MoistureServer::new(&config),
            friendship: FriendshipManager::new(&config),
            fatal_log: FatalLog::new(),
            dispatched: 0,
            config,
        }
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Read-only view of the lifecycle owned by the connectivity component.
    pub fn lifecycle(&self) -> LifecycleState {
        self.connectivity.state()
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn moisture(&self) -> &MoistureServer {
        &self.moisture
    }

    pub fn friendship(&self) -> &FriendshipManager {
        &self.friendship
    }

    pub fn fatal_log(&self) -> &FatalLog {
        &self.fatal_log
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    // ── Start-up ──────────────────────────────────────────────

    /// Work done before the event loop: fatal log index and the blocking
    /// sensor self-test.  A failed self-test is logged, not fatal.
    pub fn start(&mut self, hw: &mut impl NodePorts) {
        self.fatal_log.init(&*hw);
        if let Err(e) = self.moisture.self_test(hw) {
            warn!("NodeService: sensor self-test failed ({})", e);
        }
        info!("NodeService: started");
    }

    // ── Dispatch ──────────────────────────────────────────────

    /// Block on the stack and dispatch until the event source runs dry.
    /// Returns the number of events handled.
    pub fn run(
        &mut self,
        hw: &mut impl NodePorts,
        sink: &mut impl EventSink,
    ) -> core::result::Result<u64, FatalError> {
        let start = self.dispatched;
        while let Some(event) = hw.wait_event() {
            self.dispatch(&event, hw, sink)?;
        }
        Ok(self.dispatched - start)
    }

    /// Route one event to every component.
    pub fn dispatch(
        &mut self,
        event: &StackEvent,
        hw: &mut impl NodePorts,
        sink: &mut impl EventSink,
    ) -> core::result::Result<(), FatalError> {
        self.dispatched += 1;
        debug!("NodeService: {:?}", event);

        let result = self.connectivity.handle_event(event, hw, sink);
        self.settle("Connectivity", result, hw, sink)?;

        let lifecycle = self.connectivity.state();
        let result = match event {
            StackEvent::ModelClientRequest(request) if self.moisture.is_registered() => {
                self.moisture.on_client_request(request, hw, sink)
            }
            StackEvent::ModelStateChanged(change) if self.moisture.is_registered() => {
                self.moisture.on_state_changed(change);
                Ok(())
            }
            StackEvent::ModelClientRequest(_) | StackEvent::ModelStateChanged(_) => {
                debug!("NodeService: model event before registration, dropped");
                Ok(())
            }
            _ => self.moisture.handle_event(event, lifecycle, hw, sink),
        };
        self.settle("Moisture", result, hw, sink)?;

        let sampling = self.moisture.is_registered();
        let result = self
            .friendship
            .handle_event(event, lifecycle, sampling, hw, sink);
        self.settle("Friendship", result, hw, sink)?;

        if let StackEvent::ExternalSignal { signals } = event {
            if signals.contains(Signals::BUTTON0) {
                hw.rearm_button(Button::Primary);
            }
            if signals.contains(Signals::BUTTON1) {
                hw.rearm_button(Button::Secondary);
            }
        }
        Ok(())
    }

    /// Classify a component result.
    fn settle(
        &mut self,
        component: &str,
        result: Result<()>,
        hw: &mut impl NodePorts,
        sink: &mut impl EventSink,
    ) -> core::result::Result<(), FatalError> {
        match result {
            Ok(()) => Ok(()),
            Err(Error::Fatal(fatal)) => {
                error!("{}: {}", component, fatal);
                self.fatal_log
                    .record(hw, &FatalEntry::new(self.dispatched, &fatal));
                sink.emit(&NodeEvent::Fatal(fatal));
                Err(fatal)
            }
            Err(e) => {
                warn!("{}: {}", component, e);
                Ok(())
            }
        }
    }
}
