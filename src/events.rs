//! Inbound event feed and the interrupt signal register.
//!
//! Events are produced by:
//! - the mesh stack (boot, provisioning callbacks, connections, models)
//! - the soft timer multiplexer (one `SoftTimerFired` per elapsed deadline)
//! - ISRs (button edges), which only post bits into a [`SignalRegister`]
//!
//! The dispatcher blocks on the stack; pending signal bits come back out of
//! that same wait as a single `ExternalSignal` event carrying the bitmask.
//!
//! ```text
//! ┌─────────────┐     ┌────────────────┐
//! │ Button ISR  │────▶│ SignalRegister │──┐
//! │ Components  │────▶│  (atomic u32)  │  │   ┌──────────────┐    ┌────────────┐
//! └─────────────┘     └────────────────┘  ├──▶│ wait_event() │───▶│ Dispatcher │
//! ┌─────────────┐                         │   └──────────────┘    └────────────┘
//! │ Mesh stack  │─────────────────────────┘
//! └─────────────┘
//! ```

use core::sync::atomic::{AtomicU32, Ordering};

use heapless::Vec;

use crate::scheduler::TimerHandle;

/// Maximum OOB challenge payload carried by a display request.
pub const OOB_PAYLOAD_CAP: usize = 16;

// ═══════════════════════════════════════════════════════════════
//  Signal bits
// ═══════════════════════════════════════════════════════════════

/// Bitmask of pending external signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Signals(pub u32);

impl Signals {
    /// Primary push button edge (factory reset at boot, force transmit).
    pub const BUTTON0: Self = Self(1 << 1);
    /// Secondary push button edge (stay awake).
    pub const BUTTON1: Self = Self(1 << 2);
    /// Node initialised; components finish their boot work.
    pub const BOOT: Self = Self(1 << 4);
    /// Second boot stage, after every component has seen `BOOT`.
    pub const POST_BOOT: Self = Self(1 << 6);
    /// Node became a provisioned network member.
    pub const NETWORK_READY: Self = Self(1 << 7);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Signal register
// ═══════════════════════════════════════════════════════════════

/// Single-producer/single-consumer pending-signal register.
///
/// ISRs call [`raise`](Self::raise); the stack adapter calls
/// [`take`](Self::take) from the dispatcher context.  Nothing else is
/// shared between interrupt and handler context.
pub struct SignalRegister {
    pending: AtomicU32,
}

impl SignalRegister {
    pub const fn new() -> Self {
        Self {
            pending: AtomicU32::new(0),
        }
    }

    /// Post signal bits.  Safe from ISR context.
    pub fn raise(&self, signals: Signals) {
        self.pending.fetch_or(signals.bits(), Ordering::Release);
    }

    /// Atomically read and clear every pending bit.
    pub fn take(&self) -> Signals {
        Signals(self.pending.swap(0, Ordering::Acquire))
    }

    pub fn peek(&self) -> Signals {
        Signals(self.pending.load(Ordering::Acquire))
    }
}

impl Default for SignalRegister {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Stack events
// ═══════════════════════════════════════════════════════════════

/// Output action requested for a display-OOB challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OobAction {
    Blink,
    Numeric,
    /// Beep, vibrate, alphanumeric, ... carries the raw action code.
    Unsupported(u8),
}

impl OobAction {
    /// Decode the stack's output-action code.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Blink,
            3 => Self::Numeric,
            other => Self::Unsupported(other),
        }
    }
}

/// Inbound request from a remote level client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientRequest {
    pub element_index: u16,
    pub client_address: u16,
    pub appkey_index: u16,
    /// Application-level threshold index.
    pub level: i16,
    pub response_required: bool,
}

/// Local model state change reported by the model library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub element_index: u16,
    pub current: i16,
    pub target: i16,
}

/// Every event the dispatcher can receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackEvent {
    Boot,
    NodeInitialized { provisioned: bool },
    ProvisioningStarted,
    ProvisioningFailed { reason: u16 },
    Provisioned,
    StaticOobRequested,
    DisplayOobRequested {
        action: OobAction,
        payload: Vec<u8, OOB_PAYLOAD_CAP>,
    },
    NodeResetRequested,
    ConnectionOpened { handle: u8 },
    ConnectionClosed { handle: u8 },
    ModelClientRequest(ClientRequest),
    ModelStateChanged(StateChange),
    FriendshipEstablished { friend: u16 },
    FriendshipFailed { reason: u16 },
    FriendshipTerminated { reason: u16 },
    SoftTimerFired { handle: TimerHandle },
    ExternalSignal { signals: Signals },
    /// Write to the OTA control point; reboot into DFU once the link drops.
    DfuRequested { connection: u8 },
}

impl StackEvent {
    /// Build a display-OOB request, truncating oversized payloads.
    pub fn display_oob(action: OobAction, payload: &[u8]) -> Self {
        let start = payload.len().saturating_sub(OOB_PAYLOAD_CAP);
        let mut bytes = Vec::new();
        // Keep the tail: challenge digits live in the last bytes.
        let _ = bytes.extend_from_slice(&payload[start..]);
        Self::DisplayOobRequested {
            action,
            payload: bytes,
        }
    }
}
