//! Short-lived messages on the display's action row.

use core::time::Duration;

use crate::error::{Error, Result};
use crate::scheduler::{TimerHandle, TimerMode};

use super::ports::{DisplayPort, DisplayRow, TimerPort};

/// Show `text` on the action row and (re)arm the clear timer.
pub fn show(hw: &mut (impl DisplayPort + TimerPort), text: &str, duration: Duration) -> Result<()> {
    hw.display_write(text, DisplayRow::Action);
    hw.arm(TimerHandle::TOAST, duration, TimerMode::OneShot)
        .map_err(|e| Error::timer("toast", TimerHandle::TOAST, e))
}

/// Toast timer fired.
pub fn clear(hw: &mut impl DisplayPort) {
    hw.display_write("", DisplayRow::Action);
}
