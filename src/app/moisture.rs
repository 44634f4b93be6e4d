//! Moisture sampling and alarm publication.
//!
//! ```text
//!          MEASUREMENT tick            SOIL_SETTLE fire
//!   Idle ───────────────────▶ PowerSettling ───────────▶ Converting ──▶ Idle
//!    ▲    power probe,                       convert,         │
//!    │    arm settle timer                   power down       │
//!    └──────────────────── publish (alarm sentinel first) ◀───┘
//! ```
//!
//! The probe and ADC belong to this component for the whole cycle and are
//! released before the phase returns to `Idle`.  A tick that arrives while
//! a cycle is in flight is dropped.

use core::fmt::Write as _;
use core::time::Duration;

use log::{debug, info, warn};

use crate::config::NodeConfig;
use crate::error::{Error, FatalError, FatalKind, Result};
use crate::events::{ClientRequest, Signals, StackEvent, StateChange};
use crate::fsm::LifecycleState;
use crate::scheduler::{TimerHandle, TimerMode};

use super::events::NodeEvent;
use super::ports::{
    DisplayRow, EventSink, ModelHandler, ModelPort, NodePorts, SoilSensorPort, TimerPort,
};
use super::settings::SettingsStore;
use super::toast;

/// Level published when a reading reaches the alarm threshold.
pub const ALARM_SENTINEL: i16 = 0x7FFF;

/// Client level index → raw alarm threshold.  Monotonic; the last entry
/// disables the alarm (12-bit readings never reach it).
pub const THRESHOLD_TABLE: [u16; 8] = [
    0x0000, 0x0400, 0x0800, 0x0C00, 0x0E00, 0x0F00, 0x0FFF, 0x7FFF,
];

/// Translate a client level index, clamping out-of-range indices to the
/// table bounds.
pub fn threshold_for_index(level: i16) -> u16 {
    let index = usize::try_from(level).unwrap_or(0);
    THRESHOLD_TABLE[index.min(THRESHOLD_TABLE.len() - 1)]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementPhase {
    Idle,
    PowerSettling,
    Converting,
}

pub struct MoistureServer {
    settings: SettingsStore,
    phase: MeasurementPhase,
    registered: bool,
    element: u16,
    model_slots: u8,
    period: Duration,
    settle: Duration,
    toast: Duration,
    last_reading: Option<u16>,
}

impl MoistureServer {
    pub fn new(config: &NodeConfig) -> Self {
        Self {
            settings: SettingsStore::new(config),
            phase: MeasurementPhase::Idle,
            registered: false,
            element: config.element_index,
            model_slots: config.model_slots,
            period: config.measurement_period(),
            settle: config.sensor_settle(),
            toast: config.toast(),
            last_reading: None,
        }
    }

    pub fn phase(&self) -> MeasurementPhase {
        self.phase
    }

    /// Models registered and sampling running.
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub fn alarm_threshold(&self) -> u16 {
        self.settings.alarm_threshold()
    }

    pub fn last_reading(&self) -> Option<u16> {
        self.last_reading
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    /// Blocking probe check, run once before the event loop starts.
    pub fn self_test(&mut self, hw: &mut impl SoilSensorPort) -> Result<u16> {
        hw.sensor_init()?;
        let raw = hw.read_sync()?;
        info!("Moisture: self-test reading 0x{:04X}", raw);
        Ok(raw)
    }

    pub fn handle_event(
        &mut self,
        event: &StackEvent,
        lifecycle: LifecycleState,
        hw: &mut impl NodePorts,
        sink: &mut impl EventSink,
    ) -> Result<()> {
        match event {
            StackEvent::Boot => {
                self.phase = MeasurementPhase::Idle;
                self.registered = false;
                Ok(())
            }
            StackEvent::NodeResetRequested => {
                self.stop_sampling(hw);
                Ok(())
            }
            StackEvent::ExternalSignal { signals } => {
                if signals.contains(Signals::BOOT) {
                    self.on_boot(hw)?;
                }
                if signals.contains(Signals::NETWORK_READY) {
                    self.on_network_ready(hw)?;
                }
                if signals.contains(Signals::BUTTON0) {
                    self.force_transmit(lifecycle, hw)?;
                }
                Ok(())
            }
            StackEvent::SoftTimerFired { handle } => match *handle {
                TimerHandle::MEASUREMENT => self.on_tick(lifecycle, hw),
                TimerHandle::SOIL_SETTLE => self.on_settled(hw, sink),
                TimerHandle::SAVE => {
                    let saved = self.settings.on_save_timer(hw)?;
                    sink.emit(&NodeEvent::SettingsPersisted {
                        threshold: saved.alarm_threshold,
                    });
                    Ok(())
                }
                TimerHandle::TOAST => {
                    toast::clear(hw);
                    Ok(())
                }
                _ => Ok(()),
            },
            _ => Ok(()),
        }
    }

    fn on_boot(&mut self, hw: &mut impl NodePorts) -> Result<()> {
        self.settings.load(hw)?;
        hw.model_server_init()
            .map_err(|e| Error::rejected("model_server_init", e))
    }

    fn on_network_ready(&mut self, hw: &mut impl NodePorts) -> Result<()> {
        if !self.settings.is_loaded() {
            self.settings.load(hw)?;
        }

        if !self.registered {
            hw.model_library_init(self.model_slots).map_err(|e| {
                warn!("Moisture: model library init returned 0x{:04X}", e.0);
                FatalError {
                    op: "model_library_init",
                    kind: FatalKind::ModelAllocation,
                    param: u32::from(self.model_slots),
                }
            })?;
            hw.register_handler(self.element)
                .map_err(|e| Error::rejected("register_handler", e))?;
            self.registered = true;
            info!("Moisture: level server registered on element {}", self.element);
        }

        let threshold = level_of(self.settings.alarm_threshold());
        if let Err(e) = hw.update_state(self.element, threshold) {
            warn!("Moisture: update_state failed ({})", e);
        }

        hw.arm(TimerHandle::MEASUREMENT, self.period, TimerMode::Repeating)
            .map_err(|e| Error::timer("measurement", TimerHandle::MEASUREMENT, e))
    }

    // ── Measurement cycle ─────────────────────────────────────

    fn on_tick(
        &mut self,
        lifecycle: LifecycleState,
        hw: &mut (impl SoilSensorPort + TimerPort),
    ) -> Result<()> {
        if self.phase != MeasurementPhase::Idle {
            debug!("Moisture: tick during {:?}, ignored", self.phase);
            return Ok(());
        }
        if lifecycle != LifecycleState::NetworkReady {
            debug!("Moisture: tick in {:?}, ignored", lifecycle);
            return Ok(());
        }

        hw.start_async_read()?;
        if let Err(e) = hw.arm(TimerHandle::SOIL_SETTLE, self.settle, TimerMode::OneShot) {
            self.release_probe(hw);
            return Err(Error::timer("sensor_settle", TimerHandle::SOIL_SETTLE, e));
        }
        self.phase = MeasurementPhase::PowerSettling;
        Ok(())
    }

    /// Power the probe down and return to `Idle`.
    fn release_probe(&mut self, hw: &mut impl SoilSensorPort) {
        if let Err(e) = hw.sensor_init() {
            warn!("Moisture: probe power-down failed ({})", e);
        }
        self.phase = MeasurementPhase::Idle;
    }

    /// Network membership erased: no more sampling or pending writes.
    fn stop_sampling(&mut self, hw: &mut (impl SoilSensorPort + TimerPort)) {
        hw.cancel(TimerHandle::MEASUREMENT);
        hw.cancel(TimerHandle::SOIL_SETTLE);
        hw.cancel(TimerHandle::SAVE);
        if self.phase != MeasurementPhase::Idle {
            self.release_probe(hw);
        }
        self.registered = false;
        info!("Moisture: sampling stopped for reset");
    }

    fn on_settled(&mut self, hw: &mut impl NodePorts, sink: &mut impl EventSink) -> Result<()> {
        if self.phase != MeasurementPhase::PowerSettling {
            return Ok(());
        }

        self.phase = MeasurementPhase::Converting;
        let reading = hw.finish_async_read();
        self.phase = MeasurementPhase::Idle;

        let raw = reading?;
        self.last_reading = Some(raw);
        self.report(raw, hw, sink);
        Ok(())
    }

    fn report(&mut self, raw: u16, hw: &mut impl NodePorts, sink: &mut impl EventSink) {
        let alarm = raw >= self.settings.alarm_threshold();
        debug!("Moisture: raw=0x{:04X} alarm={}", raw, alarm);

        let mut text = heapless::String::<16>::new();
        let _ = write!(text, "Moist: 0x{:04X}", raw);
        hw.display_write(&text, DisplayRow::Reading);
        sink.emit(&NodeEvent::Measurement { raw, alarm });

        if !self.registered {
            return;
        }
        if alarm {
            self.publish(ALARM_SENTINEL, hw);
        }
        self.publish(level_of(raw), hw);
    }

    fn force_transmit(&mut self, lifecycle: LifecycleState, hw: &mut impl NodePorts) -> Result<()> {
        if lifecycle != LifecycleState::NetworkReady || !self.registered {
            debug!("Moisture: force transmit ignored in {:?}", lifecycle);
            return Ok(());
        }
        info!("Moisture: forced transmit");
        self.publish(ALARM_SENTINEL, hw);
        toast::show(hw, "Forced TX", self.toast)
    }

    /// Update the model state, then publish it.  Best effort.
    fn publish(&self, level: i16, hw: &mut impl ModelPort) {
        if let Err(e) = hw.update_state(self.element, level) {
            warn!("Moisture: update_state({}) failed ({})", level, e);
            return;
        }
        if let Err(e) = hw.publish_state(self.element) {
            warn!("Moisture: publish({}) failed ({})", level, e);
        }
    }
}

impl ModelHandler for MoistureServer {
    fn on_client_request(
        &mut self,
        request: &ClientRequest,
        hw: &mut impl NodePorts,
        sink: &mut impl EventSink,
    ) -> Result<()> {
        let value = threshold_for_index(request.level);
        let old = self.settings.alarm_threshold();
        info!(
            "Moisture: client 0x{:04X} requests level {} -> 0x{:04X}",
            request.client_address, request.level, value
        );

        let changed = self.settings.set_alarm_threshold(value, hw)?;
        if changed {
            sink.emit(&NodeEvent::ThresholdChanged { old, new: value });
        }

        if request.response_required {
            if let Err(e) = hw.respond(
                self.element,
                request.client_address,
                request.appkey_index,
                level_of(self.settings.alarm_threshold()),
            ) {
                warn!("Moisture: response to 0x{:04X} failed ({})", request.client_address, e);
            }
        }

        if changed {
            let mut text = heapless::String::<16>::new();
            let _ = write!(text, "New: 0x{:04X}", value);
            if let Err(e) = toast::show(hw, &text, self.toast) {
                warn!("Moisture: threshold toast not shown ({})", e);
            }
        }
        Ok(())
    }

    fn on_state_changed(&mut self, change: &StateChange) {
        debug!(
            "Moisture: element {} level {} -> {}",
            change.element_index, change.current, change.target
        );
    }
}

fn level_of(raw: u16) -> i16 {
    i16::try_from(raw).unwrap_or(i16::MAX)
}
