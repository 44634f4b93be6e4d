//! Requests written by lifecycle state handlers.
//!
//! State handlers are plain `fn` pointers with no access to the ports.
//! They record what the transition needs here, and the connectivity
//! component applies it to the display, storage and signal register once
//! the transition has completed.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleContext {
    /// Text for the connection status row.
    pub status: Option<&'static str>,
    /// Raise the network-ready signal.
    pub announce_ready: bool,
    /// Stop any OOB presentation and clear the passkey row.
    pub end_oob: bool,
    /// Erase all durable storage.
    pub erase_storage: bool,
}

impl LifecycleContext {
    /// Hand back the accumulated requests and reset to empty.
    pub fn take(&mut self) -> Self {
        core::mem::take(self)
    }
}
