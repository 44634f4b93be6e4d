//! Provisioning and connectivity.
//!
//! Owns the node's [`LifecycleState`] and mediates the OOB-authenticated
//! join.  Every lifecycle transition happens inside
//! [`Connectivity::handle_event`]; other components only read the state.

use core::fmt::Write as _;
use core::time::Duration;

use log::{error, info, warn};

use crate::config::NodeConfig;
use crate::error::{Error, Result};
use crate::events::{Signals, StackEvent};
use crate::fsm::context::LifecycleContext;
use crate::fsm::states::build_state_table;
use crate::fsm::{Lifecycle, LifecycleState};
use crate::scheduler::{TimerHandle, TimerMode};

use super::events::NodeEvent;
use super::oob::OobPresenter;
use super::ports::{AuthConfig, Button, DisplayRow, EventSink, NodePorts, RestartMode};

pub struct Connectivity {
    lifecycle: Lifecycle,
    ctx: LifecycleContext,
    oob: OobPresenter,
    auth: AuthConfig,
    static_secret: heapless::Vec<u8, 16>,
    reboot_delay: Duration,
    /// Open GATT connection, closed before a network-initiated restart.
    connection: Option<u8>,
    dfu_pending: bool,
}

impl Connectivity {
    pub fn new(config: &NodeConfig) -> Self {
        Self {
            lifecycle: Lifecycle::new(build_state_table()),
            ctx: LifecycleContext::default(),
            oob: OobPresenter::new(config),
            auth: AuthConfig {
                static_oob: true,
                output_blink: true,
                output_numeric: true,
                output_size: config.numeric_oob_digits,
            },
            static_secret: config.static_oob_key.clone(),
            reboot_delay: config.reboot_delay(),
            connection: None,
            dfu_pending: false,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.current_state()
    }

    pub fn is_presenting_oob(&self) -> bool {
        self.oob.is_blinking()
    }

    pub fn handle_event(
        &mut self,
        event: &StackEvent,
        hw: &mut impl NodePorts,
        sink: &mut impl EventSink,
    ) -> Result<()> {
        match event {
            StackEvent::Boot => self.on_boot(hw, sink),
            StackEvent::NodeInitialized { provisioned } => {
                self.on_node_initialized(*provisioned, hw, sink)
            }
            StackEvent::ProvisioningStarted => {
                self.transition(LifecycleState::Provisioning, hw, sink);
                Ok(())
            }
            StackEvent::StaticOobRequested => hw
                .static_oob_response(&self.static_secret)
                .map_err(|e| Error::rejected("static_oob_response", e)),
            StackEvent::DisplayOobRequested { action, payload } => {
                self.oob.present(*action, payload, hw).map(|_| ())
            }
            StackEvent::ProvisioningFailed { reason } => {
                warn!("Connectivity: provisioning failed (0x{:04X})", reason);
                self.oob.stop(hw);
                self.transition(LifecycleState::Unprovisioned, hw, sink);
                self.start_beaconing(hw)
            }
            StackEvent::Provisioned => {
                info!("Connectivity: provisioned");
                self.oob.stop(hw);
                if !self.transition(LifecycleState::NetworkReady, hw, sink)
                    && self.state() != LifecycleState::NetworkReady
                {
                    error!("Connectivity: joined while {:?}, not ready", self.state());
                }
                Ok(())
            }
            StackEvent::NodeResetRequested => self.on_reset_requested(hw, sink),
            StackEvent::ConnectionOpened { handle } => {
                self.connection = Some(*handle);
                Ok(())
            }
            StackEvent::ConnectionClosed { handle } => {
                if self.connection == Some(*handle) {
                    self.connection = None;
                }
                if self.dfu_pending {
                    info!("Connectivity: link closed, entering DFU");
                    sink.emit(&NodeEvent::RestartRequested { dfu: true });
                    hw.restart(RestartMode::Dfu);
                }
                Ok(())
            }
            StackEvent::DfuRequested { connection } => {
                info!("Connectivity: DFU requested on connection {}", connection);
                self.dfu_pending = true;
                hw.close_connection(*connection)
                    .map_err(|e| Error::rejected("close_connection", e))
            }
            StackEvent::SoftTimerFired { handle } if *handle == TimerHandle::BLINK => {
                self.oob.on_blink_timer(hw)
            }
            StackEvent::SoftTimerFired { handle } if *handle == TimerHandle::REBOOT => {
                hw.display_write("Rebooting...", DisplayRow::Connection);
                sink.emit(&NodeEvent::RestartRequested { dfu: false });
                hw.restart(RestartMode::Normal);
                Ok(())
            }
            StackEvent::ExternalSignal { signals } => self.on_signals(*signals, hw),
            _ => Ok(()),
        }
    }

    // ── Boot ──────────────────────────────────────────────────

    fn on_boot(&mut self, hw: &mut impl NodePorts, sink: &mut impl EventSink) -> Result<()> {
        self.connection = None;
        self.dfu_pending = false;
        self.oob.stop(hw);

        let from = self.lifecycle.current_state();
        self.lifecycle.boot(&mut self.ctx);
        if from != LifecycleState::Booted {
            sink.emit(&NodeEvent::LifecycleChanged {
                from,
                to: LifecycleState::Booted,
            });
        }
        self.apply(hw);

        let address = format_bt_address(&hw.device_address());
        hw.display_write("Soil Moisture", DisplayRow::BtAddr1);
        hw.display_write(&address, DisplayRow::BtAddr2);
        hw.display_write("", DisplayRow::ClientAddr);
        hw.display_write("", DisplayRow::Passkey);
        hw.display_write("", DisplayRow::Action);

        if hw.button_state(Button::Primary) {
            self.factory_reset(hw, sink);
            return Ok(());
        }

        hw.init_node(self.auth)
            .map_err(|e| Error::rejected("init_node", e))
    }

    /// Erase, then hold until the reset button is released and restart.
    fn factory_reset(&mut self, hw: &mut impl NodePorts, sink: &mut impl EventSink) {
        info!("Connectivity: factory reset");
        self.transition(LifecycleState::Resetting, hw, sink);
        self.transition(LifecycleState::Unprovisioned, hw, sink);

        // Blocks until the operator lets go; no events are serviced.
        while hw.button_state(Button::Primary) {
            core::hint::spin_loop();
        }

        hw.display_write("Rebooting...", DisplayRow::Connection);
        sink.emit(&NodeEvent::RestartRequested { dfu: false });
        hw.restart(RestartMode::Normal);
    }

    fn on_node_initialized(
        &mut self,
        provisioned: bool,
        hw: &mut impl NodePorts,
        sink: &mut impl EventSink,
    ) -> Result<()> {
        info!("Connectivity: node initialised, provisioned={}", provisioned);
        let result = if provisioned {
            self.transition(LifecycleState::NetworkReady, hw, sink);
            Ok(())
        } else {
            self.transition(LifecycleState::Unprovisioned, hw, sink);
            self.start_beaconing(hw)
        };
        hw.raise_signal(Signals::BOOT);
        result
    }

    fn start_beaconing(&mut self, hw: &mut impl NodePorts) -> Result<()> {
        hw.start_beaconing()
            .map_err(|e| Error::rejected("start_beaconing", e))?;
        hw.display_write("Beaconing...", DisplayRow::Connection);
        Ok(())
    }

    // ── Reset ─────────────────────────────────────────────────

    fn on_reset_requested(
        &mut self,
        hw: &mut impl NodePorts,
        sink: &mut impl EventSink,
    ) -> Result<()> {
        info!("Connectivity: reset requested by the network");
        self.transition(LifecycleState::Resetting, hw, sink);
        self.transition(LifecycleState::Unprovisioned, hw, sink);

        if let Some(handle) = self.connection.take() {
            if let Err(e) = hw.close_connection(handle) {
                warn!("Connectivity: close_connection failed ({})", e);
            }
        }

        hw.display_write("Rebooting...", DisplayRow::Connection);
        hw.arm(TimerHandle::REBOOT, self.reboot_delay, TimerMode::OneShot)
            .map_err(|e| Error::timer("reboot_delay", TimerHandle::REBOOT, e))
    }

    // ── Signals ───────────────────────────────────────────────

    fn on_signals(&mut self, signals: Signals, hw: &mut impl NodePorts) -> Result<()> {
        if signals.contains(Signals::BOOT) {
            hw.raise_signal(Signals::POST_BOOT);
        }
        if signals.contains(Signals::NETWORK_READY) {
            let address = hw
                .element_address()
                .map_err(|e| Error::rejected("element_address", e))?;
            let mut text = heapless::String::<8>::new();
            let _ = write!(text, "0x{:04X}", address);
            hw.display_write(&text, DisplayRow::ClientAddr);
        }
        Ok(())
    }

    // ── Lifecycle plumbing ────────────────────────────────────

    fn transition(
        &mut self,
        next: LifecycleState,
        hw: &mut impl NodePorts,
        sink: &mut impl EventSink,
    ) -> bool {
        let from = self.lifecycle.current_state();
        let moved = self.lifecycle.transition(next, &mut self.ctx);
        if moved {
            sink.emit(&NodeEvent::LifecycleChanged { from, to: next });
        }
        self.apply(hw);
        moved
    }

    /// Carry out what the state handlers asked for.
    fn apply(&mut self, hw: &mut impl NodePorts) {
        let req = self.ctx.take();
        if req.end_oob {
            self.oob.stop(hw);
            hw.display_write("", DisplayRow::Passkey);
        }
        if req.erase_storage {
            if let Err(e) = hw.erase_all() {
                error!("Connectivity: erase failed ({})", e);
            }
        }
        if let Some(status) = req.status {
            hw.display_write(status, DisplayRow::Connection);
        }
        if req.announce_ready {
            hw.raise_signal(Signals::NETWORK_READY);
        }
    }
}

/// `AA:BB:CC:DD:EE:FF`, most significant byte first.
pub fn format_bt_address(address: &[u8; 6]) -> heapless::String<17> {
    let mut s = heapless::String::new();
    for (i, b) in address.iter().enumerate() {
        if i > 0 {
            let _ = s.push(':');
        }
        let _ = write!(s, "{:02X}", b);
    }
    s
}
