//! Board peripheral drivers on embedded-hal pins.

pub mod button;
pub mod status_led;
