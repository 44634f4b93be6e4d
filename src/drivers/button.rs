//! Push button inputs.
//!
//! ## Hardware
//!
//! Two active-low momentary switches with external pull-ups.  Each GPIO
//! fires an edge interrupt whose only job is [`EdgeLatch::on_edge`]: post
//! the button's signal bit and disarm itself.  The dispatcher re-arms the
//! latch once every component has seen the signal, so a bouncing contact
//! produces one signal per handled press.
//!
//! Level queries (`is_pressed`) read the pin directly; they are used at
//! boot (factory reset) and at the post-boot checkpoint (stay awake).

use core::sync::atomic::{AtomicBool, Ordering};

use embedded_hal::digital::InputPin;
use log::warn;

use crate::app::ports::Button;
use crate::events::{SignalRegister, Signals};

/// ISR-side state of one button interrupt.
pub struct EdgeLatch {
    armed: AtomicBool,
    signal: Signals,
}

impl EdgeLatch {
    pub const fn new(signal: Signals) -> Self {
        Self {
            armed: AtomicBool::new(true),
            signal,
        }
    }

    /// Interrupt body.  Returns whether a signal was posted.
    pub fn on_edge(&self, signals: &SignalRegister) -> bool {
        if self.armed.swap(false, Ordering::AcqRel) {
            signals.raise(self.signal);
            true
        } else {
            false
        }
    }

    pub fn rearm(&self) {
        self.armed.store(true, Ordering::Release);
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }
}

/// Both board buttons.
pub struct ButtonInputs<P0, P1> {
    primary: P0,
    secondary: P1,
    latches: [EdgeLatch; 2],
}

impl<P0: InputPin, P1: InputPin> ButtonInputs<P0, P1> {
    pub fn new(primary: P0, secondary: P1) -> Self {
        Self {
            primary,
            secondary,
            latches: [
                EdgeLatch::new(Signals::BUTTON0),
                EdgeLatch::new(Signals::BUTTON1),
            ],
        }
    }

    /// Active low; a read error counts as released.
    pub fn is_pressed(&mut self, button: Button) -> bool {
        let level = match button {
            Button::Primary => self.primary.is_low().map_err(drop),
            Button::Secondary => self.secondary.is_low().map_err(drop),
        };
        level.unwrap_or_else(|()| {
            warn!("Button: {:?} read failed", button);
            false
        })
    }

    pub fn latch(&self, button: Button) -> &EdgeLatch {
        &self.latches[button as usize]
    }
}
