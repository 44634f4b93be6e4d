//! Outbound node events.
//!
//! Components emit these through the [`EventSink`](super::ports::EventSink)
//! port.  Adapters on the other side decide what to do with them: log to
//! serial, count them in a test, forward them over a debug link.

use crate::error::FatalError;
use crate::fsm::LifecycleState;

use super::friendship::FriendshipState;

/// Structured events emitted by the node's components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// The lifecycle moved between states.
    LifecycleChanged {
        from: LifecycleState,
        to: LifecycleState,
    },

    /// A moisture reading completed.
    Measurement { raw: u16, alarm: bool },

    /// The alarm threshold changed (not yet persisted).
    ThresholdChanged { old: u16, new: u16 },

    /// Settings were written to flash.
    SettingsPersisted { threshold: u16 },

    /// The low-power relationship changed phase.
    FriendshipChanged(FriendshipState),

    /// A restart was requested.
    RestartRequested { dfu: bool },

    /// Resource exhaustion; the node needs operator attention.
    Fatal(FatalError),
}
