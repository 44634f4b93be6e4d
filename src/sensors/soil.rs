//! Resistive soil moisture probe driver.
//!
//! The probe is powered from a GPIO so it only draws current (and only
//! corrodes) while a reading is taken.  A read is two-phase:
//!
//! 1. `start_async_read` drives the power pin high; the caller arms a
//!    settle timer and returns to the dispatcher.
//! 2. `finish_async_read` enables the ADC, converts once, then disables
//!    the ADC and powers the probe down, on the error path too.
//!
//! `read_sync` does both with a blocking delay and is used once, before
//! the event loop starts.

use core::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use log::debug;

use crate::app::ports::SoilSensorPort;
use crate::error::SensorError;

use super::AdcChannel;

/// 12-bit converter full scale.
pub const ADC_MAX: u16 = 0x0FFF;

pub struct SoilSensor<P, A, D> {
    power: P,
    adc: A,
    delay: D,
    settle: Duration,
    powered: bool,
    total_reads: u32,
}

impl<P, A, D> SoilSensor<P, A, D>
where
    P: OutputPin,
    A: AdcChannel,
    D: DelayNs,
{
    pub fn new(power: P, adc: A, delay: D, settle: Duration) -> Self {
        Self {
            power,
            adc,
            delay,
            settle,
            powered: false,
            total_reads: 0,
        }
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    pub fn total_reads(&self) -> u32 {
        self.total_reads
    }

    fn power_on(&mut self) -> Result<(), SensorError> {
        self.power.set_high().map_err(|_| SensorError::GpioFailed)?;
        self.powered = true;
        Ok(())
    }

    fn power_off(&mut self) -> Result<(), SensorError> {
        self.powered = false;
        self.power.set_low().map_err(|_| SensorError::GpioFailed)
    }

    fn convert(&mut self) -> Result<u16, SensorError> {
        self.adc.enable();
        let raw = self.adc.convert();
        self.adc.disable();
        let off = self.power_off();

        let raw = raw?.min(ADC_MAX);
        off?;
        self.total_reads = self.total_reads.saturating_add(1);
        debug!("Soil: raw=0x{:04X}", raw);
        Ok(raw)
    }
}

impl<P, A, D> SoilSensorPort for SoilSensor<P, A, D>
where
    P: OutputPin,
    A: AdcChannel,
    D: DelayNs,
{
    fn sensor_init(&mut self) -> Result<(), SensorError> {
        self.adc.disable();
        self.power_off()
    }

    fn start_async_read(&mut self) -> Result<(), SensorError> {
        self.power_on()
    }

    fn finish_async_read(&mut self) -> Result<u16, SensorError> {
        if !self.powered {
            return Err(SensorError::NotPowered);
        }
        self.convert()
    }

    fn read_sync(&mut self) -> Result<u16, SensorError> {
        self.power_on()?;
        self.delay.delay_us(self.settle.as_micros() as u32);
        self.convert()
    }
}
