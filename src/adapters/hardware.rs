//! Hardware adapter: bridges board peripherals to the domain ports.
//!
//! Owns the indicator LED, both buttons and the soil probe, and exposes
//! them through [`IndicatorPort`], [`ButtonPort`] and [`SoilSensorPort`].
//! Generic over the embedded-hal pins so the same adapter drives the
//! ESP32 GPIOs and the simulator's pins.

use embedded_hal::digital::{InputPin, OutputPin};

use crate::app::ports::{Button, ButtonPort, IndicatorPort, SoilSensorPort};
use crate::drivers::button::{ButtonInputs, EdgeLatch};
use crate::drivers::status_led::IndicatorLed;
use crate::error::SensorError;

/// Concrete adapter that combines the board I/O behind port traits.
pub struct HardwareAdapter<L, B0, B1, S> {
    led: IndicatorLed<L>,
    buttons: ButtonInputs<B0, B1>,
    soil: S,
}

impl<L, B0, B1, S> HardwareAdapter<L, B0, B1, S>
where
    L: OutputPin,
    B0: InputPin,
    B1: InputPin,
    S: SoilSensorPort,
{
    pub fn new(led: IndicatorLed<L>, buttons: ButtonInputs<B0, B1>, soil: S) -> Self {
        Self { led, buttons, soil }
    }

    /// Interrupt latch for `button`, handed to the GPIO ISR.
    pub fn latch(&self, button: Button) -> &EdgeLatch {
        self.buttons.latch(button)
    }

    pub fn led(&self) -> &IndicatorLed<L> {
        &self.led
    }

    pub fn soil(&self) -> &S {
        &self.soil
    }
}

// ── IndicatorPort implementation ──────────────────────────────

impl<L, B0, B1, S> IndicatorPort for HardwareAdapter<L, B0, B1, S>
where
    L: OutputPin,
{
    fn set_lamp(&mut self, on: bool) {
        self.led.set(on);
    }
}

// ── ButtonPort implementation ─────────────────────────────────

impl<L, B0, B1, S> ButtonPort for HardwareAdapter<L, B0, B1, S>
where
    B0: InputPin,
    B1: InputPin,
{
    fn button_state(&mut self, button: Button) -> bool {
        self.buttons.is_pressed(button)
    }

    fn rearm_button(&mut self, button: Button) {
        self.buttons.latch(button).rearm();
    }
}

// ── SoilSensorPort implementation ─────────────────────────────

impl<L, B0, B1, S> SoilSensorPort for HardwareAdapter<L, B0, B1, S>
where
    S: SoilSensorPort,
{
    fn sensor_init(&mut self) -> Result<(), SensorError> {
        self.soil.sensor_init()
    }

    fn start_async_read(&mut self) -> Result<(), SensorError> {
        self.soil.start_async_read()
    }

    fn finish_async_read(&mut self) -> Result<u16, SensorError> {
        self.soil.finish_async_read()
    }

    fn read_sync(&mut self) -> Result<u16, SensorError> {
        self.soil.read_sync()
    }
}
