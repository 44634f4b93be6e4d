//! Character display adapter.
//!
//! Keeps the last text written to each [`DisplayRow`].  On the board the
//! buffer is pushed to the LCD after every write; in the simulator it is
//! printed at shutdown and inspected by tests.

use log::debug;

use crate::app::ports::{DisplayPort, DisplayRow};

/// Characters per row.  Longer text is truncated.
pub const ROW_WIDTH: usize = 24;

#[derive(Default)]
pub struct LcdBuffer {
    rows: [heapless::String<ROW_WIDTH>; DisplayRow::COUNT],
    writes: u32,
}

impl LcdBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(&self, row: DisplayRow) -> &str {
        self.rows[row as usize].as_str()
    }

    pub fn rows(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(heapless::String::as_str)
    }

    pub fn writes(&self) -> u32 {
        self.writes
    }
}

impl DisplayPort for LcdBuffer {
    fn display_write(&mut self, text: &str, row: DisplayRow) {
        let slot = &mut self.rows[row as usize];
        slot.clear();
        for c in text.chars() {
            if slot.push(c).is_err() {
                break;
            }
        }
        self.writes = self.writes.wrapping_add(1);
        debug!("LCD[{:?}] {}", row, slot);
    }
}
