//! OOB indicator LED.
//!
//! A single GPIO-driven LED, active high.  Used to blink provisioning
//! challenges; otherwise off.

use embedded_hal::digital::OutputPin;
use log::warn;

pub struct IndicatorLed<P> {
    pin: P,
    on: bool,
    switches: u32,
}

impl<P: OutputPin> IndicatorLed<P> {
    pub fn new(pin: P) -> Self {
        Self {
            pin,
            on: false,
            switches: 0,
        }
    }

    pub fn set(&mut self, on: bool) {
        let result = if on {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        if result.is_err() {
            warn!("IndicatorLed: GPIO write failed");
            return;
        }
        if on != self.on {
            self.switches = self.switches.wrapping_add(1);
        }
        self.on = on;
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    /// Number of on/off changes since construction.
    pub fn switches(&self) -> u32 {
        self.switches
    }
}
