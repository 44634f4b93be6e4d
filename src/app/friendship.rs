//! Low-power friendship manager.
//!
//! Once the node is a network member with no direct connection open it
//! asks for a friend and drops into low-power polling.  A failed attempt
//! is retried once after a fixed backoff; a lost friendship is replaced
//! immediately.  Any open connection suspends low-power mode until the
//! last one closes.

use core::time::Duration;

use log::{debug, info, warn};

use crate::config::NodeConfig;
use crate::error::{Error, Result};
use crate::events::{Signals, StackEvent};
use crate::fsm::LifecycleState;
use crate::scheduler::{TimerHandle, TimerMode};

use super::events::NodeEvent;
use super::ports::{Button, EventSink, NodePorts};
use super::toast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendshipState {
    Idle,
    Establishing,
    Established,
}

pub struct FriendshipManager {
    state: FriendshipState,
    connections: u8,
    stay_awake: bool,
    lpn_initialized: bool,
    queue_depth: u8,
    poll_timeout: Duration,
    retry_delay: Duration,
    toast: Duration,
}

impl FriendshipManager {
    pub fn new(config: &NodeConfig) -> Self {
        Self {
            state: FriendshipState::Idle,
            connections: 0,
            stay_awake: false,
            lpn_initialized: false,
            queue_depth: config.lpn_queue_depth,
            poll_timeout: config.lpn_poll_timeout(),
            retry_delay: config.befriend_retry(),
            toast: config.toast(),
        }
    }

    pub fn state(&self) -> FriendshipState {
        self.state
    }

    pub fn connections(&self) -> u8 {
        self.connections
    }

    pub fn stay_awake(&self) -> bool {
        self.stay_awake
    }

    pub fn is_low_power(&self) -> bool {
        self.lpn_initialized
    }

    /// `sampling` is whether the moisture models are registered.
    pub fn handle_event(
        &mut self,
        event: &StackEvent,
        lifecycle: LifecycleState,
        sampling: bool,
        hw: &mut impl NodePorts,
        sink: &mut impl EventSink,
    ) -> Result<()> {
        match event {
            StackEvent::Boot => {
                self.state = FriendshipState::Idle;
                self.connections = 0;
                self.stay_awake = false;
                self.lpn_initialized = false;
                Ok(())
            }
            StackEvent::ExternalSignal { signals } => {
                if signals.contains(Signals::POST_BOOT) && hw.button_state(Button::Secondary) {
                    info!("Friendship: stay-awake override");
                    self.stay_awake = true;
                    self.suspend(hw, sink);
                    toast::show(hw, "Forced Awake", self.toast)?;
                }
                if signals.contains(Signals::NETWORK_READY) {
                    if self.connections == 0 && !self.stay_awake {
                        return self.become_lpn(hw, sink);
                    }
                    info!(
                        "Friendship: network ready, staying awake ({} connections)",
                        self.connections
                    );
                }
                Ok(())
            }
            StackEvent::ConnectionOpened { handle } => {
                self.connections = self.connections.saturating_add(1);
                info!(
                    "Friendship: connection {} opened ({} open)",
                    handle, self.connections
                );
                self.suspend(hw, sink);
                Ok(())
            }
            StackEvent::ConnectionClosed { handle } => {
                self.connections = self.connections.saturating_sub(1);
                info!(
                    "Friendship: connection {} closed ({} open)",
                    handle, self.connections
                );
                if self.connections == 0 && sampling && self.eligible(lifecycle) {
                    return self.become_lpn(hw, sink);
                }
                Ok(())
            }
            StackEvent::FriendshipEstablished { friend } => {
                if !self.lpn_initialized {
                    debug!("Friendship: stale establishment with 0x{:04X} ignored", friend);
                    return Ok(());
                }
                info!("Friendship: established with 0x{:04X}", friend);
                self.set_state(FriendshipState::Established, sink);
                Ok(())
            }
            StackEvent::FriendshipFailed { reason } => {
                warn!(
                    "Friendship: attempt failed (0x{:04X}), retrying in {} ms",
                    reason,
                    self.retry_delay.as_millis()
                );
                self.set_state(FriendshipState::Idle, sink);
                hw.arm(TimerHandle::BEFRIEND, self.retry_delay, TimerMode::OneShot)
                    .map_err(|e| Error::timer("befriend_retry", TimerHandle::BEFRIEND, e))
            }
            StackEvent::FriendshipTerminated { reason } => {
                warn!("Friendship: terminated (0x{:04X})", reason);
                self.set_state(FriendshipState::Idle, sink);
                if self.eligible(lifecycle) {
                    return self.establish(hw, sink);
                }
                Ok(())
            }
            StackEvent::SoftTimerFired { handle } if *handle == TimerHandle::BEFRIEND => {
                if self.eligible(lifecycle) && self.lpn_initialized {
                    return self.establish(hw, sink);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn eligible(&self, lifecycle: LifecycleState) -> bool {
        lifecycle == LifecycleState::NetworkReady && self.connections == 0 && !self.stay_awake
    }

    fn become_lpn(&mut self, hw: &mut impl NodePorts, sink: &mut impl EventSink) -> Result<()> {
        if !self.lpn_initialized {
            hw.lpn_init().map_err(|e| Error::rejected("lpn_init", e))?;
            self.lpn_initialized = true;
            hw.lpn_configure(self.queue_depth, self.poll_timeout)
                .map_err(|e| Error::rejected("lpn_configure", e))?;
        }
        self.establish(hw, sink)
    }

    fn establish(&mut self, hw: &mut impl NodePorts, sink: &mut impl EventSink) -> Result<()> {
        hw.establish_friendship()
            .map_err(|e| Error::rejected("establish_friendship", e))?;
        info!("Friendship: looking for a friend");
        self.set_state(FriendshipState::Establishing, sink);
        Ok(())
    }

    /// Leave low-power mode whatever phase it is in.
    fn suspend(&mut self, hw: &mut impl NodePorts, sink: &mut impl EventSink) {
        hw.cancel(TimerHandle::BEFRIEND);
        if self.lpn_initialized {
            if let Err(e) = hw.lpn_deinit() {
                warn!("Friendship: lpn_deinit failed ({})", e);
            }
            self.lpn_initialized = false;
        }
        self.set_state(FriendshipState::Idle, sink);
    }

    fn set_state(&mut self, state: FriendshipState, sink: &mut impl EventSink) {
        if self.state != state {
            self.state = state;
            sink.emit(&NodeEvent::FriendshipChanged(state));
        }
    }
}
