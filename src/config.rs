//! Node configuration parameters
//!
//! All tunable timings and protocol parameters for the moisture node.
//! Defaults match the shipped firmware; the simulator can override them
//! from a JSON file.

use core::fmt;
use core::time::Duration;

use serde::{Deserialize, Serialize};

/// Core node configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    // --- OOB presentation ---
    /// Blink on-time (ms)
    pub blink_on_ms: u32,
    /// Gap between blinks within a group (ms)
    pub blink_off_ms: u32,
    /// Gap after each group of pulses (ms)
    pub blink_group_gap_ms: u32,
    /// Static OOB secret shared with the provisioner
    pub static_oob_key: heapless::Vec<u8, 16>,
    /// Digits rendered for a numeric OOB challenge
    pub numeric_oob_digits: u8,

    // --- Lifecycle ---
    /// Delay between a network-initiated reset and the restart (ms)
    pub reboot_delay_ms: u32,

    // --- Settings ---
    /// Quiet period before a changed threshold is written to flash (ms)
    pub save_debounce_ms: u32,
    /// Threshold used when flash holds no valid settings record
    pub default_alarm_level: u16,

    // --- Display ---
    /// How long an action toast stays on the display (ms)
    pub toast_ms: u32,

    // --- Low-power node ---
    /// Friend queue depth requested from the friend node
    pub lpn_queue_depth: u8,
    /// Poll timeout (ms)
    pub lpn_poll_timeout_ms: u32,
    /// Backoff before retrying a failed friendship (ms)
    pub befriend_retry_ms: u32,

    // --- Sampling ---
    /// Moisture sampling period (ms)
    pub measurement_period_ms: u32,
    /// Probe power-on settle time before conversion (ms)
    pub sensor_settle_ms: u32,
    /// Model element carrying the level server
    pub element_index: u16,
    /// Model slots allocated in the model library
    pub model_slots: u8,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let mut static_oob_key = heapless::Vec::new();
        let _ = static_oob_key.extend_from_slice(&[0x12, 0x34]);

        Self {
            // OOB
            blink_on_ms: 300,
            blink_off_ms: 300,
            blink_group_gap_ms: 7 * 300,
            static_oob_key,
            numeric_oob_digits: 4,

            // Lifecycle
            reboot_delay_ms: 2_000,

            // Settings
            save_debounce_ms: 10_000,
            default_alarm_level: 0x7FFF,

            // Display
            toast_ms: 3_000,

            // LPN
            lpn_queue_depth: 4,
            lpn_poll_timeout_ms: 30_000,
            befriend_retry_ms: 19_000,

            // Sampling
            measurement_period_ms: 5_000, // 0.2 Hz
            sensor_settle_ms: 10,
            element_index: 0,
            model_slots: 8,
        }
    }
}

impl NodeConfig {
    pub fn blink_on(&self) -> Duration {
        Duration::from_millis(self.blink_on_ms.into())
    }

    pub fn blink_off(&self) -> Duration {
        Duration::from_millis(self.blink_off_ms.into())
    }

    pub fn blink_group_gap(&self) -> Duration {
        Duration::from_millis(self.blink_group_gap_ms.into())
    }

    pub fn reboot_delay(&self) -> Duration {
        Duration::from_millis(self.reboot_delay_ms.into())
    }

    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms.into())
    }

    pub fn toast(&self) -> Duration {
        Duration::from_millis(self.toast_ms.into())
    }

    pub fn lpn_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.lpn_poll_timeout_ms.into())
    }

    pub fn befriend_retry(&self) -> Duration {
        Duration::from_millis(self.befriend_retry_ms.into())
    }

    pub fn measurement_period(&self) -> Duration {
        Duration::from_millis(self.measurement_period_ms.into())
    }

    pub fn sensor_settle(&self) -> Duration {
        Duration::from_millis(self.sensor_settle_ms.into())
    }

    /// Range-check every field.  Invalid values are rejected, never
    /// clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(50..=5_000).contains(&self.blink_on_ms) {
            return Err(ConfigError::ValidationFailed("blink_on_ms must be 50–5000"));
        }
        if !(50..=5_000).contains(&self.blink_off_ms) {
            return Err(ConfigError::ValidationFailed("blink_off_ms must be 50–5000"));
        }
        if self.blink_group_gap_ms <= self.blink_off_ms {
            return Err(ConfigError::ValidationFailed(
                "blink_group_gap_ms must be > blink_off_ms",
            ));
        }
        if self.static_oob_key.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "static_oob_key must not be empty",
            ));
        }
        if !(1..=8).contains(&self.numeric_oob_digits) {
            return Err(ConfigError::ValidationFailed(
                "numeric_oob_digits must be 1–8",
            ));
        }
        if !(100..=60_000).contains(&self.reboot_delay_ms) {
            return Err(ConfigError::ValidationFailed(
                "reboot_delay_ms must be 100–60000",
            ));
        }
        if !(1_000..=600_000).contains(&self.save_debounce_ms) {
            return Err(ConfigError::ValidationFailed(
                "save_debounce_ms must be 1000–600000",
            ));
        }
        if !(500..=60_000).contains(&self.toast_ms) {
            return Err(ConfigError::ValidationFailed("toast_ms must be 500–60000"));
        }
        if !(2..=128).contains(&self.lpn_queue_depth) {
            return Err(ConfigError::ValidationFailed(
                "lpn_queue_depth must be 2–128",
            ));
        }
        if !(1_000..=345_600_000).contains(&self.lpn_poll_timeout_ms) {
            return Err(ConfigError::ValidationFailed(
                "lpn_poll_timeout_ms must be 1000–345600000",
            ));
        }
        if !(1_000..=600_000).contains(&self.befriend_retry_ms) {
            return Err(ConfigError::ValidationFailed(
                "befriend_retry_ms must be 1000–600000",
            ));
        }
        if !(100..=3_600_000).contains(&self.measurement_period_ms) {
            return Err(ConfigError::ValidationFailed(
                "measurement_period_ms must be 100–3600000",
            ));
        }
        if self.sensor_settle_ms == 0 || self.sensor_settle_ms >= self.measurement_period_ms {
            return Err(ConfigError::ValidationFailed(
                "sensor_settle_ms must be > 0 and < measurement_period_ms",
            ));
        }
        if self.model_slots == 0 {
            return Err(ConfigError::ValidationFailed("model_slots must be > 0"));
        }
        Ok(())
    }
}

/// Errors from configuration loading and validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
