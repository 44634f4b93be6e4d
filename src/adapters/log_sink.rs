//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured node events to the
//! logger (UART on the device, `tracing-subscriber` in the simulator).

use log::{error, info};

use crate::app::events::NodeEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`NodeEvent`] to the console.
#[derive(Default)]
pub struct LogEventSink {
    emitted: u32,
}

impl LogEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emitted(&self) -> u32 {
        self.emitted
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &NodeEvent) {
        self.emitted = self.emitted.wrapping_add(1);
        match event {
            NodeEvent::LifecycleChanged { from, to } => {
                info!("STATE | {:?} -> {:?}", from, to);
            }
            NodeEvent::Measurement { raw, alarm } => {
                info!(
                    "SAMPLE | raw=0x{:04X} | {}",
                    raw,
                    if *alarm { "ALARM" } else { "ok" }
                );
            }
            NodeEvent::ThresholdChanged { old, new } => {
                info!("THRESH | 0x{:04X} -> 0x{:04X}", old, new);
            }
            NodeEvent::SettingsPersisted { threshold } => {
                info!("FLASH | threshold=0x{:04X} saved", threshold);
            }
            NodeEvent::FriendshipChanged(state) => {
                info!("LPN | {:?}", state);
            }
            NodeEvent::RestartRequested { dfu } => {
                info!("RESTART | {}", if *dfu { "dfu" } else { "normal" });
            }
            NodeEvent::Fatal(f) => {
                error!("FATAL | {}", f);
            }
        }
    }
}
