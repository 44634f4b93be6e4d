//! Host simulation of the mesh stack and the board.
//!
//! [`SimMeshStack`] plays the vendor stack: it queues the events a real
//! stack would raise in reply to commands, runs the soft timer table on a
//! virtual millisecond clock and records every command it receives.
//! [`SimBoard`] adds flash, the display and simulated pins, and
//! implements every port so a [`NodeService`](crate::app::service::NodeService)
//! runs unmodified against it.
//!
//! Virtual time only advances when the queue is empty and no signal is
//! pending; it then jumps to the earliest timer deadline.  Nothing fires
//! past the horizon, which is how a simulation run ends.

use core::cell::Cell;
use core::convert::Infallible;
use core::time::Duration;
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use log::{debug, info};

use crate::app::ports::{
    AuthConfig, Button, ButtonPort, CommandError, DisplayPort, DisplayRow, FriendshipPort,
    IndicatorPort, MeshStackPort, ModelPort, RestartMode, SoilSensorPort, StackResult,
    StorageError, StoragePort, TimerError, TimerPort,
};
use crate::config::NodeConfig;
use crate::drivers::button::ButtonInputs;
use crate::drivers::status_led::IndicatorLed;
use crate::error::SensorError;
use crate::events::{OobAction, SignalRegister, Signals, StackEvent};
use crate::scheduler::{SoftTimerTable, TimerHandle, TimerMode};
use crate::sensors::AdcChannel;
use crate::sensors::soil::SoilSensor;

use super::display::LcdBuffer;
use super::hardware::HardwareAdapter;
use super::nvs::NvsAdapter;

/// Result codes the simulated stack answers with.
pub const ERR_INVALID_STATE: u16 = 0x0002;
pub const ERR_NO_MEMORY: u16 = 0x0A02;
pub const ERR_PUBLISH_FAILED: u16 = 0x0181;

/// Primary element address assigned by the simulated provisioner.
pub const SIM_ELEMENT_ADDRESS: u16 = 0x0105;
/// Friend node address reported when a friendship is established.
pub const SIM_FRIEND_ADDRESS: u16 = 0x0001;

const SIM_DEVICE_ADDRESS: [u8; 6] = [0x00, 0x0B, 0x57, 0x12, 0x34, 0x56];

// ── Command log ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackCommand {
    InitNode(AuthConfig),
    StartBeaconing,
    StaticOob(Vec<u8>),
    CloseConnection(u8),
    Restart(RestartMode),
    LpnInit,
    LpnDeinit,
    LpnConfigure { queue_depth: u8, poll_timeout: Duration },
    EstablishFriendship,
    ModelServerInit,
    ModelLibraryInit(u8),
    RegisterHandler(u16),
    UpdateState { element: u16, level: i16 },
    PublishState { element: u16 },
    Respond { element: u16, client: u16, appkey_index: u16, level: i16 },
}

/// What the simulated provisioner does once the node starts beaconing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoProvision {
    /// Ask for a numeric output challenge with this code.
    Numeric(u16),
    /// Ask for a blink challenge with this count.
    Blink(u8),
    /// Ask for the static secret.
    Static,
}

// ═══════════════════════════════════════════════════════════════
//  SimMeshStack
// ═══════════════════════════════════════════════════════════════

pub struct SimMeshStack {
    queue: VecDeque<StackEvent>,
    signals: SignalRegister,
    timers: SoftTimerTable,
    now_ms: u64,
    horizon_ms: u64,
    commands: Vec<StackCommand>,
    provisioned: bool,
    in_dfu: bool,
    auto_provision: Option<AutoProvision>,
    friend_available: bool,
    fail_publish: bool,
    fail_model_alloc: bool,
}

impl SimMeshStack {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            signals: SignalRegister::new(),
            timers: SoftTimerTable::new(),
            now_ms: 0,
            horizon_ms: 0,
            commands: Vec::new(),
            provisioned: false,
            in_dfu: false,
            auto_provision: None,
            friend_available: true,
            fail_publish: false,
            fail_model_alloc: false,
        }
    }

    // ── Scripting ─────────────────────────────────────────────

    pub fn push_event(&mut self, event: StackEvent) {
        self.queue.push_back(event);
    }

    /// Stop firing timers after `ms` of virtual time.
    pub fn set_horizon(&mut self, ms: u64) {
        self.horizon_ms = ms;
    }

    pub fn set_provisioned(&mut self, provisioned: bool) {
        self.provisioned = provisioned;
    }

    pub fn set_auto_provision(&mut self, script: Option<AutoProvision>) {
        self.auto_provision = script;
    }

    pub fn set_friend_available(&mut self, available: bool) {
        self.friend_available = available;
    }

    pub fn set_fail_publish(&mut self, fail: bool) {
        self.fail_publish = fail;
    }

    pub fn set_fail_model_alloc(&mut self, fail: bool) {
        self.fail_model_alloc = fail;
    }

    // ── Inspection ────────────────────────────────────────────

    pub fn signals(&self) -> &SignalRegister {
        &self.signals
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn is_provisioned(&self) -> bool {
        self.provisioned
    }

    pub fn in_dfu(&self) -> bool {
        self.in_dfu
    }

    pub fn commands(&self) -> &[StackCommand] {
        &self.commands
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn count(&self, pred: impl Fn(&StackCommand) -> bool) -> usize {
        self.commands.iter().filter(|c| pred(c)).count()
    }

    pub fn timer_armed(&self, handle: TimerHandle) -> bool {
        self.timers.is_armed(handle)
    }

    pub fn armed_timers(&self) -> usize {
        self.timers.armed_count()
    }

    /// Provisioning is wiped along with flash on a factory reset.
    pub fn forget_network(&mut self) {
        self.provisioned = false;
    }

    fn record(&mut self, command: StackCommand) {
        debug!("SimStack: {:?}", command);
        self.commands.push(command);
    }

    fn script_provisioning(&mut self, script: AutoProvision) {
        self.queue.push_back(StackEvent::ProvisioningStarted);
        match script {
            AutoProvision::Numeric(code) => {
                let [hi, lo] = code.to_be_bytes();
                self.queue.push_back(StackEvent::display_oob(
                    OobAction::Numeric,
                    &[0, 0, hi, lo],
                ));
            }
            AutoProvision::Blink(count) => {
                self.queue
                    .push_back(StackEvent::display_oob(OobAction::Blink, &[count]));
            }
            AutoProvision::Static => self.queue.push_back(StackEvent::StaticOobRequested),
        }
        self.queue.push_back(StackEvent::Provisioned);
    }
}

impl Default for SimMeshStack {
    fn default() -> Self {
        Self::new()
    }
}

// ── MeshStackPort implementation ──────────────────────────────

impl MeshStackPort for SimMeshStack {
    fn wait_event(&mut self) -> Option<StackEvent> {
        if self.in_dfu {
            return None;
        }

        let pending = self.signals.take();
        if !pending.is_empty() {
            return Some(StackEvent::ExternalSignal { signals: pending });
        }

        if let Some(event) = self.queue.pop_front() {
            if matches!(event, StackEvent::Provisioned) {
                self.provisioned = true;
            }
            return Some(event);
        }

        let deadline = self.timers.next_deadline()?;
        if deadline > self.horizon_ms {
            return None;
        }
        self.now_ms = self.now_ms.max(deadline);
        let handle = self.timers.pop_expired(self.now_ms)?;
        Some(StackEvent::SoftTimerFired { handle })
    }

    fn raise_signal(&mut self, signals: Signals) {
        self.signals.raise(signals);
    }

    fn init_node(&mut self, auth: AuthConfig) -> StackResult {
        self.record(StackCommand::InitNode(auth));
        self.queue.push_back(StackEvent::NodeInitialized {
            provisioned: self.provisioned,
        });
        Ok(())
    }

    fn start_beaconing(&mut self) -> StackResult {
        self.record(StackCommand::StartBeaconing);
        if let Some(script) = self.auto_provision {
            self.script_provisioning(script);
        }
        Ok(())
    }

    fn static_oob_response(&mut self, secret: &[u8]) -> StackResult {
        self.record(StackCommand::StaticOob(secret.to_vec()));
        Ok(())
    }

    fn device_address(&mut self) -> [u8; 6] {
        SIM_DEVICE_ADDRESS
    }

    fn element_address(&mut self) -> StackResult<u16> {
        if self.provisioned {
            Ok(SIM_ELEMENT_ADDRESS)
        } else {
            Err(CommandError(ERR_INVALID_STATE))
        }
    }

    fn close_connection(&mut self, handle: u8) -> StackResult {
        self.record(StackCommand::CloseConnection(handle));
        self.queue
            .push_back(StackEvent::ConnectionClosed { handle });
        Ok(())
    }

    fn restart(&mut self, mode: RestartMode) {
        self.record(StackCommand::Restart(mode));
        self.queue.clear();
        self.timers.clear();
        self.signals.take();
        match mode {
            RestartMode::Normal => {
                info!("SimStack: reboot at {} ms", self.now_ms);
                self.queue.push_back(StackEvent::Boot);
            }
            RestartMode::Dfu => {
                info!("SimStack: entering DFU at {} ms", self.now_ms);
                self.in_dfu = true;
            }
        }
    }
}

// ── FriendshipPort implementation ─────────────────────────────

impl FriendshipPort for SimMeshStack {
    fn lpn_init(&mut self) -> StackResult {
        self.record(StackCommand::LpnInit);
        Ok(())
    }

    fn lpn_deinit(&mut self) -> StackResult {
        self.record(StackCommand::LpnDeinit);
        self.queue.retain(|e| {
            !matches!(
                e,
                StackEvent::FriendshipEstablished { .. } | StackEvent::FriendshipFailed { .. }
            )
        });
        Ok(())
    }

    fn lpn_configure(&mut self, queue_depth: u8, poll_timeout: Duration) -> StackResult {
        self.record(StackCommand::LpnConfigure {
            queue_depth,
            poll_timeout,
        });
        Ok(())
    }

    fn establish_friendship(&mut self) -> StackResult {
        self.record(StackCommand::EstablishFriendship);
        let reply = if self.friend_available {
            StackEvent::FriendshipEstablished {
                friend: SIM_FRIEND_ADDRESS,
            }
        } else {
            StackEvent::FriendshipFailed { reason: 0x0001 }
        };
        self.queue.push_back(reply);
        Ok(())
    }
}

// ── ModelPort implementation ──────────────────────────────────

impl ModelPort for SimMeshStack {
    fn model_server_init(&mut self) -> StackResult {
        self.record(StackCommand::ModelServerInit);
        Ok(())
    }

    fn model_library_init(&mut self, slots: u8) -> StackResult {
        self.record(StackCommand::ModelLibraryInit(slots));
        if self.fail_model_alloc {
            return Err(CommandError(ERR_NO_MEMORY));
        }
        Ok(())
    }

    fn register_handler(&mut self, element: u16) -> StackResult {
        self.record(StackCommand::RegisterHandler(element));
        Ok(())
    }

    fn update_state(&mut self, element: u16, level: i16) -> StackResult {
        self.record(StackCommand::UpdateState { element, level });
        Ok(())
    }

    fn publish_state(&mut self, element: u16) -> StackResult {
        self.record(StackCommand::PublishState { element });
        if self.fail_publish {
            return Err(CommandError(ERR_PUBLISH_FAILED));
        }
        Ok(())
    }

    fn respond(&mut self, element: u16, client: u16, appkey_index: u16, level: i16) -> StackResult {
        self.record(StackCommand::Respond {
            element,
            client,
            appkey_index,
            level,
        });
        Ok(())
    }
}

// ── TimerPort implementation ──────────────────────────────────

impl TimerPort for SimMeshStack {
    fn arm(&mut self, handle: TimerHandle, delay: Duration, mode: TimerMode) -> Result<(), TimerError> {
        self.timers.arm(self.now_ms, handle, delay, mode)
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.timers.cancel(handle);
    }
}

// ═══════════════════════════════════════════════════════════════
//  Simulated pins
// ═══════════════════════════════════════════════════════════════

/// GPIO shared between the board and the test driving it.
///
/// As an input it can be held low for a number of reads and then released,
/// which is how a test models an operator letting go of a button.
#[derive(Clone, Default)]
pub struct SimPin {
    low: Rc<Cell<bool>>,
    low_reads_left: Rc<Cell<Option<u32>>>,
}

impl SimPin {
    /// A pin at its idle level: high, i.e. a released active-low button.
    pub fn released() -> Self {
        Self::default()
    }

    pub fn is_driven_high(&self) -> bool {
        !self.low.get()
    }

    /// Pull low until [`release`](Self::release).
    pub fn hold(&self) {
        self.low.set(true);
        self.low_reads_left.set(None);
    }

    /// Pull low for the next `reads` reads, then release.
    pub fn hold_for(&self, reads: u32) {
        self.low.set(reads > 0);
        self.low_reads_left.set(Some(reads));
    }

    pub fn release(&self) {
        self.low.set(false);
        self.low_reads_left.set(None);
    }

    fn sample_low(&self) -> bool {
        if let Some(left) = self.low_reads_left.get() {
            if left == 0 {
                self.release();
            } else {
                self.low_reads_left.set(Some(left - 1));
            }
        }
        self.low.get()
    }
}

impl ErrorType for SimPin {
    type Error = Infallible;
}

impl InputPin for SimPin {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(!self.sample_low())
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        Ok(self.sample_low())
    }
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.low.set(true);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.low.set(false);
        Ok(())
    }
}

/// ADC channel returning an injected reading; `None` makes conversions fail.
#[derive(Clone, Default)]
pub struct SimAdc {
    reading: Rc<Cell<Option<u16>>>,
    enabled: Rc<Cell<bool>>,
}

impl SimAdc {
    pub fn set_reading(&self, raw: Option<u16>) {
        self.reading.set(raw);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }
}

impl AdcChannel for SimAdc {
    fn enable(&mut self) {
        self.enabled.set(true);
    }

    fn convert(&mut self) -> Result<u16, SensorError> {
        if !self.enabled.get() {
            return Err(SensorError::AdcReadFailed);
        }
        self.reading.get().ok_or(SensorError::AdcReadFailed)
    }

    fn disable(&mut self) {
        self.enabled.set(false);
    }
}

pub struct NoopDelay;

impl DelayNs for NoopDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

// ═══════════════════════════════════════════════════════════════
//  SimBoard
// ═══════════════════════════════════════════════════════════════

pub type SimSoilSensor = SoilSensor<SimPin, SimAdc, NoopDelay>;
pub type SimHardware = HardwareAdapter<SimPin, SimPin, SimPin, SimSoilSensor>;

/// Test-side handles onto the simulated pins.
#[derive(Clone, Default)]
pub struct SimWiring {
    pub lamp: SimPin,
    pub primary: SimPin,
    pub secondary: SimPin,
    pub probe_power: SimPin,
    pub adc: SimAdc,
}

impl SimWiring {
    pub fn button(&self, button: Button) -> &SimPin {
        match button {
            Button::Primary => &self.primary,
            Button::Secondary => &self.secondary,
        }
    }
}

pub struct SimBoard {
    pub stack: SimMeshStack,
    pub nvs: NvsAdapter,
    pub lcd: LcdBuffer,
    pub hw: SimHardware,
    pub wiring: SimWiring,
    lamp_on: bool,
}

impl SimBoard {
    pub fn new(config: &NodeConfig) -> Result<Self, StorageError> {
        let wiring = SimWiring::default();
        let soil = SoilSensor::new(
            wiring.probe_power.clone(),
            wiring.adc.clone(),
            NoopDelay,
            config.sensor_settle(),
        );
        let hw = HardwareAdapter::new(
            IndicatorLed::new(wiring.lamp.clone()),
            ButtonInputs::new(wiring.primary.clone(), wiring.secondary.clone()),
            soil,
        );
        Ok(Self {
            stack: SimMeshStack::new(),
            nvs: NvsAdapter::new()?,
            lcd: LcdBuffer::new(),
            hw,
            wiring,
            lamp_on: false,
        })
    }

    /// Edge interrupt for `button`, as the GPIO ISR would deliver it.
    pub fn press(&mut self, button: Button) -> bool {
        self.hw.latch(button).on_edge(self.stack.signals())
    }

    pub fn set_moisture(&self, raw: Option<u16>) {
        self.wiring.adc.set_reading(raw);
    }

    pub fn lamp_on(&self) -> bool {
        self.lamp_on
    }

    pub fn display(&self, row: DisplayRow) -> &str {
        self.lcd.row(row)
    }
}

impl MeshStackPort for SimBoard {
    fn wait_event(&mut self) -> Option<StackEvent> {
        self.stack.wait_event()
    }

    fn raise_signal(&mut self, signals: Signals) {
        self.stack.raise_signal(signals);
    }

    fn init_node(&mut self, auth: AuthConfig) -> StackResult {
        self.stack.init_node(auth)
    }

    fn start_beaconing(&mut self) -> StackResult {
        self.stack.start_beaconing()
    }

    fn static_oob_response(&mut self, secret: &[u8]) -> StackResult {
        self.stack.static_oob_response(secret)
    }

    fn device_address(&mut self) -> [u8; 6] {
        self.stack.device_address()
    }

    fn element_address(&mut self) -> StackResult<u16> {
        self.stack.element_address()
    }

    fn close_connection(&mut self, handle: u8) -> StackResult {
        self.stack.close_connection(handle)
    }

    fn restart(&mut self, mode: RestartMode) {
        self.lamp_on = false;
        self.stack.restart(mode);
    }
}

impl FriendshipPort for SimBoard {
    fn lpn_init(&mut self) -> StackResult {
        self.stack.lpn_init()
    }

    fn lpn_deinit(&mut self) -> StackResult {
        self.stack.lpn_deinit()
    }

    fn lpn_configure(&mut self, queue_depth: u8, poll_timeout: Duration) -> StackResult {
        self.stack.lpn_configure(queue_depth, poll_timeout)
    }

    fn establish_friendship(&mut self) -> StackResult {
        self.stack.establish_friendship()
    }
}

impl ModelPort for SimBoard {
    fn model_server_init(&mut self) -> StackResult {
        self.stack.model_server_init()
    }

    fn model_library_init(&mut self, slots: u8) -> StackResult {
        self.stack.model_library_init(slots)
    }

    fn register_handler(&mut self, element: u16) -> StackResult {
        self.stack.register_handler(element)
    }

    fn update_state(&mut self, element: u16, level: i16) -> StackResult {
        self.stack.update_state(element, level)
    }

    fn publish_state(&mut self, element: u16) -> StackResult {
        self.stack.publish_state(element)
    }

    fn respond(&mut self, element: u16, client: u16, appkey_index: u16, level: i16) -> StackResult {
        self.stack.respond(element, client, appkey_index, level)
    }
}

impl TimerPort for SimBoard {
    fn arm(&mut self, handle: TimerHandle, delay: Duration, mode: TimerMode) -> Result<(), TimerError> {
        self.stack.arm(handle, delay, mode)
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.stack.cancel(handle);
    }
}

impl StoragePort for SimBoard {
    fn read(&self, key: u16, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.nvs.read(key, buf)
    }

    fn write(&mut self, key: u16, data: &[u8]) -> Result<(), StorageError> {
        self.nvs.write(key, data)
    }

    fn delete(&mut self, key: u16) -> Result<(), StorageError> {
        self.nvs.delete(key)
    }

    fn erase_all(&mut self) -> Result<(), StorageError> {
        self.stack.forget_network();
        self.nvs.erase_all()
    }
}

impl DisplayPort for SimBoard {
    fn display_write(&mut self, text: &str, row: DisplayRow) {
        self.lcd.display_write(text, row);
    }
}

impl IndicatorPort for SimBoard {
    fn set_lamp(&mut self, on: bool) {
        self.lamp_on = on;
        self.hw.set_lamp(on);
    }
}

impl ButtonPort for SimBoard {
    fn button_state(&mut self, button: Button) -> bool {
        self.hw.button_state(button)
    }

    fn rearm_button(&mut self, button: Button) {
        self.hw.rearm_button(button);
    }
}

impl SoilSensorPort for SimBoard {
    fn sensor_init(&mut self) -> Result<(), SensorError> {
        self.hw.sensor_init()
    }

    fn start_async_read(&mut self) -> Result<(), SensorError> {
        self.hw.start_async_read()
    }

    fn finish_async_read(&mut self) -> Result<u16, SensorError> {
        self.hw.finish_async_read()
    }

    fn read_sync(&mut self) -> Result<u16, SensorError> {
        self.hw.read_sync()
    }
}
