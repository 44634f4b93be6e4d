//! OOB authentication presenter.
//!
//! Renders a provisioning challenge to the person holding the device:
//!
//! - **Blink**: `n` lamp pulses, a long gap, repeat.  One logical timer
//!   ([`TimerHandle::BLINK`]); every fire advances exactly one phase.
//! - **Numeric**: the challenge number, zero-padded, on the passkey row.
//!
//! ```text
//!  n = 3:   ▇▇▁▁▇▇▁▁▇▇▁▁▁▁▁▁▁▁▁▁▁▁▁▁▇▇▁▁▇▇ ...
//!           on off on off on  group gap   on off
//! ```

use core::fmt::Write as _;
use core::time::Duration;

use log::{info, warn};

use crate::config::NodeConfig;
use crate::error::{Error, Result};
use crate::events::OobAction;
use crate::scheduler::{TimerHandle, TimerMode};

use super::ports::{DisplayPort, DisplayRow, IndicatorPort, TimerPort};

// ═══════════════════════════════════════════════════════════════
//  Blink sequencer
// ═══════════════════════════════════════════════════════════════

/// Timer-driven lamp pulse generator.
#[derive(Debug)]
pub struct BlinkSequencer {
    target_count: u8,
    remaining: u8,
    lamp_on: bool,
    active: bool,
    on_time: Duration,
    off_time: Duration,
    group_gap: Duration,
}

impl BlinkSequencer {
    pub fn new(config: &NodeConfig) -> Self {
        Self {
            target_count: 0,
            remaining: 0,
            lamp_on: false,
            active: false,
            on_time: config.blink_on(),
            off_time: config.blink_off(),
            group_gap: config.blink_group_gap(),
        }
    }

    /// Start presenting `count` pulses per group.  `0` holds the lamp on.
    /// A sequence already running is stopped first.
    pub fn start(&mut self, count: u8, hw: &mut (impl TimerPort + IndicatorPort)) -> Result<()> {
        self.stop(hw);
        self.target_count = count;
        self.remaining = count;
        self.active = true;

        if count == 0 {
            hw.set_lamp(true);
            self.lamp_on = true;
            return Ok(());
        }
        self.step(hw)
    }

    /// Advance one phase.  Called on every blink timer fire.
    pub fn step(&mut self, hw: &mut (impl TimerPort + IndicatorPort)) -> Result<()> {
        if !self.active || self.target_count == 0 {
            return Ok(());
        }

        let hold = if self.lamp_on {
            hw.set_lamp(false);
            self.lamp_on = false;
            if self.remaining == 0 {
                self.remaining = self.target_count;
                self.group_gap
            } else {
                self.off_time
            }
        } else {
            hw.set_lamp(true);
            self.lamp_on = true;
            self.remaining -= 1;
            self.on_time
        };

        hw.arm(TimerHandle::BLINK, hold, TimerMode::OneShot)
            .map_err(|e| Error::timer("oob_blink", TimerHandle::BLINK, e))
    }

    /// Cancel the timer and force the lamp off.  Safe when idle.
    pub fn stop(&mut self, hw: &mut (impl TimerPort + IndicatorPort)) {
        hw.cancel(TimerHandle::BLINK);
        hw.set_lamp(false);
        self.lamp_on = false;
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn target_count(&self) -> u8 {
        self.target_count
    }
}

// ═══════════════════════════════════════════════════════════════
//  Numeric rendering
// ═══════════════════════════════════════════════════════════════

/// Low-order 16 bits of a numeric challenge: the last two payload bytes,
/// most significant first.
pub fn numeric_code(payload: &[u8]) -> Option<u16> {
    match payload {
        [.., hi, lo] => Some(u16::from_be_bytes([*hi, *lo])),
        [lo] => Some(u16::from(*lo)),
        [] => None,
    }
}

/// Zero-padded decimal rendering, at least `digits` wide.
pub fn format_numeric(code: u16, digits: u8) -> heapless::String<8> {
    let mut s = heapless::String::new();
    let _ = write!(s, "{:0width$}", code, width = usize::from(digits));
    s
}

// ═══════════════════════════════════════════════════════════════
//  Presenter
// ═══════════════════════════════════════════════════════════════

pub struct OobPresenter {
    blink: BlinkSequencer,
    digits: u8,
}

impl OobPresenter {
    pub fn new(config: &NodeConfig) -> Self {
        Self {
            blink: BlinkSequencer::new(config),
            digits: config.numeric_oob_digits,
        }
    }

    /// Render a display-OOB challenge.  Returns `Ok(false)` when the
    /// challenge is declined (unsupported action, empty payload).
    pub fn present(
        &mut self,
        action: OobAction,
        payload: &[u8],
        hw: &mut (impl TimerPort + IndicatorPort + DisplayPort),
    ) -> Result<bool> {
        match action {
            OobAction::Blink => {
                let Some(&count) = payload.last() else {
                    warn!("Connectivity: blink OOB without a count");
                    return Ok(false);
                };
                info!("Connectivity: blink OOB, {} pulses", count);
                self.blink.start(count, hw)?;
                Ok(true)
            }
            OobAction::Numeric => {
                let Some(code) = numeric_code(payload) else {
                    warn!("Connectivity: numeric OOB without a payload");
                    return Ok(false);
                };
                let text = format_numeric(code, self.digits);
                info!("Connectivity: numeric OOB {}", text);
                hw.display_write(&text, DisplayRow::Passkey);
                Ok(true)
            }
            OobAction::Unsupported(code) => {
                warn!("Connectivity: unsupported OOB action {}, not answering", code);
                Ok(false)
            }
        }
    }

    pub fn on_blink_timer(&mut self, hw: &mut (impl TimerPort + IndicatorPort)) -> Result<()> {
        self.blink.step(hw)
    }

    pub fn stop(&mut self, hw: &mut (impl TimerPort + IndicatorPort)) {
        self.blink.stop(hw);
    }

    pub fn is_blinking(&self) -> bool {
        self.blink.is_active()
    }
}
