//! Soft timer multiplexer.
//!
//! One hardware countdown, many logical timers.  Each logical timer is
//! identified by a [`TimerHandle`] owned by exactly one component; the
//! table keeps at most one deadline per handle and hands back the
//! earliest expiry first.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Logical timers                           │
//! │                                                              │
//! │  ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌──────────┐   │
//! │  │ Blink (0) │  │ Save (10) │  │ Meas (13) │  │ Settle   │   │
//! │  │ one-shot  │  │ one-shot  │  │ repeating │  │ (30)     │   │
//! │  └─────┬─────┘  └─────┬─────┘  └─────┬─────┘  └─────┬────┘   │
//! │        │              │              │              │        │
//! │        ▼              ▼              ▼              ▼        │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │        SoftTimerTable (16 slots, nearest deadline)     │  │
//! │  └───────────────────────┬────────────────────────────────┘  │
//! │                          │                                   │
//! │                          ▼                                   │
//! │                StackEvent::SoftTimerFired                    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! On hardware the mesh stack owns this table; the simulator embeds the
//! same implementation so timing behaviour is identical in host tests.

use core::time::Duration;

use log::debug;

use crate::app::ports::TimerError;

/// Number of logical timer slots.
pub const TIMER_SLOTS: usize = 16;

/// Hardware soft timer clock (32.768 kHz crystal).
pub const TIMER_FREQUENCY_HZ: u64 = 32_768;

// ═══════════════════════════════════════════════════════════════
//  Handles and modes
// ═══════════════════════════════════════════════════════════════

/// Identity of one logical timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(pub u8);

impl TimerHandle {
    /// OOB blink sequencer phase timer.
    pub const BLINK: Self = Self(0);
    /// Delayed restart after a network-initiated reset.
    pub const REBOOT: Self = Self(1);
    /// Settings debounce.
    pub const SAVE: Self = Self(10);
    /// Clears the action row on the display.
    pub const TOAST: Self = Self(11);
    /// Friendship retry backoff.
    pub const BEFRIEND: Self = Self(12);
    /// Periodic moisture sampling.
    pub const MEASUREMENT: Self = Self(13);
    /// Sensor power-on settle.
    pub const SOIL_SETTLE: Self = Self(30);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    OneShot,
    Repeating,
}

/// Convert a duration to soft timer ticks, rounding down.
pub fn duration_to_ticks(d: Duration) -> u64 {
    (d.as_micros() as u64).saturating_mul(TIMER_FREQUENCY_HZ) / 1_000_000
}

// ═══════════════════════════════════════════════════════════════
//  Table
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy)]
struct Slot {
    handle: TimerHandle,
    deadline_ms: u64,
    period_ms: Option<u64>,
    /// Arming order, breaks deadline ties.
    seq: u64,
}

/// Fixed-capacity logical timer table.
pub struct SoftTimerTable {
    slots: [Option<Slot>; TIMER_SLOTS],
    next_seq: u64,
}

impl SoftTimerTable {
    pub fn new() -> Self {
        Self {
            slots: [None; TIMER_SLOTS],
            next_seq: 0,
        }
    }

    /// Arm `handle` to fire `delay` after `now_ms`.
    ///
    /// An already-armed handle has its deadline replaced.  A zero-length
    /// repeating period is rejected rather than spinning forever.
    pub fn arm(
        &mut self,
        now_ms: u64,
        handle: TimerHandle,
        delay: Duration,
        mode: TimerMode,
    ) -> Result<(), TimerError> {
        let delay_ms = delay.as_millis() as u64;
        let period_ms = match mode {
            TimerMode::OneShot => None,
            TimerMode::Repeating if delay_ms == 0 => return Err(TimerError::Rejected(0x0021)),
            TimerMode::Repeating => Some(delay_ms),
        };

        let index = match self.position(handle) {
            Some(i) => i,
            None => self
                .slots
                .iter()
                .position(Option::is_none)
                .ok_or(TimerError::Exhausted)?,
        };

        self.slots[index] = Some(Slot {
            handle,
            deadline_ms: now_ms + delay_ms,
            period_ms,
            seq: self.next_seq,
        });
        self.next_seq += 1;
        debug!(
            "Timers: armed {:?} for {} ms / {} ticks ({:?})",
            handle,
            delay_ms,
            duration_to_ticks(delay),
            mode
        );
        Ok(())
    }

    /// Cancel `handle`.  Cancelling an idle handle is a no-op.
    pub fn cancel(&mut self, handle: TimerHandle) {
        if let Some(i) = self.position(handle) {
            self.slots[i] = None;
        }
    }

    pub fn is_armed(&self, handle: TimerHandle) -> bool {
        self.position(handle).is_some()
    }

    pub fn armed_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Earliest outstanding deadline, i.e. what the hardware countdown
    /// should be programmed with.
    pub fn next_deadline(&self) -> Option<u64> {
        self.slots.iter().flatten().map(|s| s.deadline_ms).min()
    }

    /// Pop the earliest expired handle.  Repeating handles are re-armed
    /// one period past their previous deadline.
    pub fn pop_expired(&mut self, now_ms: u64) -> Option<TimerHandle> {
        let index = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.map(|s| (i, s)))
            .filter(|(_, s)| s.deadline_ms <= now_ms)
            .min_by_key(|(_, s)| (s.deadline_ms, s.seq))
            .map(|(i, _)| i)?;

        let slot = self.slots[index].take()?;
        if let Some(period) = slot.period_ms {
            self.slots[index] = Some(Slot {
                deadline_ms: slot.deadline_ms + period,
                seq: self.next_seq,
                ..slot
            });
            self.next_seq += 1;
        }
        Some(slot.handle)
    }

    /// Drop every timer (restart).
    pub fn clear(&mut self) {
        self.slots = [None; TIMER_SLOTS];
    }

    fn position(&self, handle: TimerHandle) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.is_some_and(|s| s.handle == handle))
    }
}

impl Default for SoftTimerTable {
    fn default() -> Self {
        Self::new()
    }
}
