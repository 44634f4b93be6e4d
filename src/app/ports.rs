//! Port traits: the hexagonal boundary between the node's components and
//! the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ NodeService (domain)
//! ```
//!
//! The mesh stack, the soft timer multiplexer, flash storage, the text
//! display and the board peripherals all sit behind these traits.  The
//! [`NodeService`](super::service::NodeService) consumes them via generics,
//! so the components never touch the vendor stack or registers directly.
//!
//! Every stack command returns a typed result; callers decide whether a
//! rejection is best-effort (publish, response) or fatal to the attempt
//! (provisioning path).

use core::fmt;
use core::time::Duration;

use crate::error::SensorError;
use crate::events::{ClientRequest, Signals, StackEvent, StateChange};
use crate::scheduler::{TimerHandle, TimerMode};

use super::events::NodeEvent;

// ───────────────────────────────────────────────────────────────
// Mesh stack port (domain ↔ vendor mesh stack)
// ───────────────────────────────────────────────────────────────

/// Authentication offered to the provisioner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthConfig {
    /// Static OOB secret is available.
    pub static_oob: bool,
    /// Output actions the node can render (blink, numeric).
    pub output_blink: bool,
    pub output_numeric: bool,
    /// Maximum digits for numeric output.
    pub output_size: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartMode {
    Normal,
    /// Reboot into the device firmware update bootloader.
    Dfu,
}

/// Non-success result code returned by a stack command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandError(pub u16);

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stack result 0x{:04X}", self.0)
    }
}

pub type StackResult<T = ()> = Result<T, CommandError>;

/// Node-level commands of the mesh stack.
pub trait MeshStackPort {
    /// Block until the next event.  Returns `None` only when the event
    /// source is exhausted (simulation horizon reached).
    fn wait_event(&mut self) -> Option<StackEvent>;

    /// Post internal signal bits; they come back as `ExternalSignal`.
    fn raise_signal(&mut self, signals: Signals);

    fn init_node(&mut self, auth: AuthConfig) -> StackResult;

    fn start_beaconing(&mut self) -> StackResult;

    fn static_oob_response(&mut self, secret: &[u8]) -> StackResult;

    /// Bluetooth device address, most significant byte first.
    fn device_address(&mut self) -> [u8; 6];

    /// Primary element unicast address.
    fn element_address(&mut self) -> StackResult<u16>;

    fn close_connection(&mut self, handle: u8) -> StackResult;

    /// Request a device restart.  On hardware this does not return.
    fn restart(&mut self, mode: RestartMode);
}

// ───────────────────────────────────────────────────────────────
// Low-power node port
// ───────────────────────────────────────────────────────────────

pub trait FriendshipPort {
    fn lpn_init(&mut self) -> StackResult;

    fn lpn_deinit(&mut self) -> StackResult;

    /// Friend queue depth and poll timeout.
    fn lpn_configure(&mut self, queue_depth: u8, poll_timeout: Duration) -> StackResult;

    /// Ask nearby friends for a friendship; the answer arrives as an event.
    fn establish_friendship(&mut self) -> StackResult;
}

// ───────────────────────────────────────────────────────────────
// Model port (domain ↔ generic level server model library)
// ───────────────────────────────────────────────────────────────

pub trait ModelPort {
    /// Generic server model init at boot.
    fn model_server_init(&mut self) -> StackResult;

    /// Allocate the model library's state for `slots` models.
    /// Failure here is an allocation failure, never a protocol error.
    fn model_library_init(&mut self, slots: u8) -> StackResult;

    /// Register the level-server handler for `element`.
    fn register_handler(&mut self, element: u16) -> StackResult;

    /// Push the model's current level without publishing.
    fn update_state(&mut self, element: u16, level: i16) -> StackResult;

    /// Publish the model's current level to its publish address.
    fn publish_state(&mut self, element: u16) -> StackResult;

    /// Answer a client request that demanded a response.
    fn respond(&mut self, element: u16, client: u16, appkey_index: u16, level: i16)
    -> StackResult;
}

/// Callbacks the model library delivers to the handler registered with
/// [`ModelPort::register_handler`].
pub trait ModelHandler {
    fn on_client_request(
        &mut self,
        request: &ClientRequest,
        hw: &mut impl NodePorts,
        sink: &mut impl EventSink,
    ) -> crate::error::Result<()>;

    fn on_state_changed(&mut self, change: &StateChange);
}

// ───────────────────────────────────────────────────────────────
// Timer port (domain ↔ soft timer multiplexer)
// ───────────────────────────────────────────────────────────────

/// Errors from [`TimerPort::arm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    /// No free logical timer slot.
    Exhausted,
    /// Stack rejected the request.
    Rejected(u16),
}

pub trait TimerPort {
    /// Arm `handle`.  An armed handle has its deadline replaced.
    fn arm(&mut self, handle: TimerHandle, delay: Duration, mode: TimerMode)
    -> Result<(), TimerError>;

    /// Cancel `handle`.  No-op when it is not armed.
    fn cancel(&mut self, handle: TimerHandle);
}

// ───────────────────────────────────────────────────────────────
// Storage port (domain ↔ persistent key/value flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage keyed by 16-bit flash keys.
///
/// Writes MUST be atomic per key; the ESP-IDF NVS API guarantees this
/// natively and the in-memory simulation trivially.
pub trait StoragePort {
    /// Read a value.  Returns the stored length, which may exceed
    /// `buf.len()`; only the first `buf.len()` bytes are copied.
    fn read(&self, key: u16, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, key: u16, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, key: u16) -> Result<(), StorageError>;

    /// Erase every key, including provisioning data.
    fn erase_all(&mut self) -> Result<(), StorageError>;
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Board ports (display, lamp, buttons, soil sensor)
// ───────────────────────────────────────────────────────────────

/// Text display rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DisplayRow {
    BtAddr1 = 0,
    BtAddr2 = 1,
    ClientAddr = 2,
    Passkey = 3,
    Connection = 4,
    Action = 5,
    Reading = 6,
}

impl DisplayRow {
    pub const COUNT: usize = 7;
}

pub trait DisplayPort {
    fn display_write(&mut self, text: &str, row: DisplayRow);
}

/// OOB indicator lamp.
pub trait IndicatorPort {
    fn set_lamp(&mut self, on: bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Button {
    /// PB0: factory reset when held at boot, force transmit afterwards.
    Primary = 0,
    /// PB1: stay awake when held at the post-boot checkpoint.
    Secondary = 1,
}

pub trait ButtonPort {
    /// Current physical state (true = pressed).
    fn button_state(&mut self, button: Button) -> bool;

    /// Re-enable the button's edge interrupt after its signal was handled.
    fn rearm_button(&mut self, button: Button);
}

/// Soil moisture probe with a switched power rail.
pub trait SoilSensorPort {
    fn sensor_init(&mut self) -> Result<(), SensorError>;

    /// Power the probe; the caller waits out the settle time.
    fn start_async_read(&mut self) -> Result<(), SensorError>;

    /// Convert, then power the probe and ADC down.  The probe is released
    /// even when the conversion fails.
    fn finish_async_read(&mut self) -> Result<u16, SensorError>;

    /// Blocking power-settle-convert.  Outside the run loop only.
    fn read_sync(&mut self) -> Result<u16, SensorError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`NodeEvent`]s through this port.
pub trait EventSink {
    fn emit(&mut self, event: &NodeEvent);
}

// ───────────────────────────────────────────────────────────────
// Aggregate
// ───────────────────────────────────────────────────────────────

/// Everything a handler may touch.  Handlers take `&mut impl NodePorts`
/// so a single board adapter satisfies every port without double borrows.
pub trait NodePorts:
    MeshStackPort
    + FriendshipPort
    + ModelPort
    + TimerPort
    + StoragePort
    + DisplayPort
    + IndicatorPort
    + ButtonPort
    + SoilSensorPort
{
}

impl<T> NodePorts for T where
    T: MeshStackPort
        + FriendshipPort
        + ModelPort
        + TimerPort
        + StoragePort
        + DisplayPort
        + IndicatorPort
        + ButtonPort
        + SoilSensorPort
{
}
