//! Sensor subsystem.
//!
//! embedded-hal 1.0 has no ADC trait, so the one analog input the node
//! reads goes through [`AdcChannel`].  On hardware it wraps the vendor
//! single-shot ADC; on the host the simulator injects readings.

pub mod soil;

use crate::error::SensorError;

/// Single-shot ADC channel with a gateable clock.
pub trait AdcChannel {
    /// Enable the ADC clock and reference.
    fn enable(&mut self);

    /// Run one conversion.  The ADC must be enabled.
    fn convert(&mut self) -> Result<u16, SensorError>;

    /// Disable the ADC clock.
    fn disable(&mut self);
}
