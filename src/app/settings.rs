//! Debounced settings persistence.
//!
//! The alarm threshold is the only durable setting.  Changes are applied
//! in memory immediately and written to flash once the save timer has been
//! quiet for the debounce interval, so a burst of client requests costs a
//! single flash write.
//!
//! Record layout under [`SETTINGS_KEY`]: `alarm_threshold` as `u16`
//! little-endian, two bytes.  Anything else is treated as absent.

use core::time::Duration;

use log::{info, warn};

use crate::config::NodeConfig;
use crate::error::{Error, Result};
use crate::scheduler::{TimerHandle, TimerMode};

use super::ports::{StorageError, StoragePort, TimerPort};

/// Flash key of the settings record.
pub const SETTINGS_KEY: u16 = 0x4001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistentSettings {
    pub alarm_threshold: u16,
}

impl PersistentSettings {
    pub const SIZE: usize = 2;

    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        self.alarm_threshold.to_le_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; Self::SIZE] = bytes.try_into().ok()?;
        Some(Self {
            alarm_threshold: u16::from_le_bytes(raw),
        })
    }
}

/// In-memory settings plus the debounce bookkeeping.
pub struct SettingsStore {
    current: PersistentSettings,
    default: PersistentSettings,
    debounce: Duration,
    loaded: bool,
    dirty: bool,
}

impl SettingsStore {
    pub fn new(config: &NodeConfig) -> Self {
        let default = PersistentSettings {
            alarm_threshold: config.default_alarm_level,
        };
        Self {
            current: default,
            default,
            debounce: config.save_debounce(),
            loaded: false,
            dirty: false,
        }
    }

    /// Read the record from flash.  A missing or wrongly sized record is
    /// replaced by the default, which is written back immediately.
    pub fn load(&mut self, storage: &mut impl StoragePort) -> Result<PersistentSettings> {
        let mut buf = [0u8; PersistentSettings::SIZE];
        let stored = match storage.read(SETTINGS_KEY, &mut buf) {
            Ok(len) if len == PersistentSettings::SIZE => PersistentSettings::from_bytes(&buf),
            Ok(len) => {
                warn!("Settings: record size {} != {}, using defaults", len, buf.len());
                None
            }
            Err(StorageError::NotFound) => {
                info!("Settings: no stored record, using defaults");
                None
            }
            Err(e) => {
                warn!("Settings: read failed ({}), using defaults", e);
                None
            }
        };

        self.loaded = true;
        self.dirty = false;
        match stored {
            Some(settings) => {
                info!(
                    "Settings: loaded alarm threshold 0x{:04X}",
                    settings.alarm_threshold
                );
                self.current = settings;
            }
            None => {
                self.current = self.default;
                storage.write(SETTINGS_KEY, &self.current.to_bytes())?;
            }
        }
        Ok(self.current)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn alarm_threshold(&self) -> u16 {
        self.current.alarm_threshold
    }

    /// Apply a new threshold and (re)arm the save timer.
    ///
    /// Returns `Ok(false)` without touching the timer when the value is
    /// unchanged.
    pub fn set_alarm_threshold(&mut self, value: u16, timers: &mut impl TimerPort) -> Result<bool> {
        if value == self.current.alarm_threshold {
            return Ok(false);
        }
        self.current.alarm_threshold = value;
        self.dirty = true;
        timers
            .arm(TimerHandle::SAVE, self.debounce, TimerMode::OneShot)
            .map_err(|e| Error::timer("settings_save", TimerHandle::SAVE, e))?;
        Ok(true)
    }

    /// Save timer fired: commit the in-memory record.
    pub fn on_save_timer(&mut self, storage: &mut impl StoragePort) -> Result<PersistentSettings> {
        storage.write(SETTINGS_KEY, &self.current.to_bytes())?;
        self.dirty = false;
        info!(
            "Settings: saved alarm threshold 0x{:04X}",
            self.current.alarm_threshold
        );
        Ok(self.current)
    }
}
