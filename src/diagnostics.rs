//! Fatal error log.
//!
//! Stores up to 4 fatal entries in a flash ring buffer so resource
//! exhaustion can be diagnosed after the operator has restarted the node.
//! Each entry captures the dispatch sequence number, the failing
//! operation, the fatal kind and its parameter.  Entries are
//! `postcard`-encoded.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::app::ports::StoragePort;
use crate::error::FatalError;

const FATAL_RING_SLOTS: usize = 4;
const FATAL_INDEX_KEY: u16 = 0x4100;
const FATAL_SLOT_BASE: u16 = 0x4101;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FatalEntry {
    /// Events dispatched before the failure.
    pub sequence: u64,
    pub op: heapless::String<32>,
    pub kind: u8,
    pub param: u32,
}

impl FatalEntry {
    pub fn new(sequence: u64, err: &FatalError) -> Self {
        let mut op = heapless::String::new();
        let _ = op.push_str(&err.op[..err.op.len().min(32)]);
        Self {
            sequence,
            op,
            kind: err.kind as u8,
            param: err.param,
        }
    }
}

/// Flash-backed ring buffer for fatal entries.
#[derive(Default)]
pub struct FatalLog {
    write_index: usize,
}

impl FatalLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the write index from flash, or default to 0.
    pub fn init(&mut self, storage: &impl StoragePort) {
        let mut buf = [0u8; 4];
        if let Ok(4) = storage.read(FATAL_INDEX_KEY, &mut buf) {
            self.write_index = u32::from_le_bytes(buf) as usize % FATAL_RING_SLOTS;
        }
    }

    /// Write an entry to the next ring slot and advance the index.
    pub fn record(&mut self, storage: &mut impl StoragePort, entry: &FatalEntry) {
        let key = Self::slot_key(self.write_index);
        match postcard::to_allocvec(entry) {
            Ok(bytes) => {
                if let Err(e) = storage.write(key, &bytes) {
                    warn!("FatalLog: slot write failed ({})", e);
                }
            }
            Err(e) => warn!("FatalLog: encode failed ({})", e),
        }

        self.write_index = (self.write_index + 1) % FATAL_RING_SLOTS;
        let idx_bytes = (self.write_index as u32).to_le_bytes();
        if let Err(e) = storage.write(FATAL_INDEX_KEY, &idx_bytes) {
            warn!("FatalLog: index write failed ({})", e);
        }
    }

    /// Read all stored entries (up to 4), oldest slot first.
    pub fn read_all(&self, storage: &impl StoragePort) -> heapless::Vec<FatalEntry, FATAL_RING_SLOTS> {
        let mut entries = heapless::Vec::new();
        for i in 0..FATAL_RING_SLOTS {
            let mut buf = [0u8; 64];
            if let Ok(len) = storage.read(Self::slot_key(i), &mut buf) {
                if let Ok(entry) = postcard::from_bytes::<FatalEntry>(&buf[..len.min(buf.len())]) {
                    let _ = entries.push(entry);
                }
            }
        }
        entries
    }

    /// Erase all entries and reset the index.
    pub fn clear(&mut self, storage: &mut impl StoragePort) {
        for i in 0..FATAL_RING_SLOTS {
            let _ = storage.delete(Self::slot_key(i));
        }
        let _ = storage.delete(FATAL_INDEX_KEY);
        self.write_index = 0;
    }

    fn slot_key(index: usize) -> u16 {
        FATAL_SLOT_BASE + index as u16
    }
}
