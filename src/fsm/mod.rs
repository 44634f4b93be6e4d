//! Function-pointer lifecycle state machine engine.
//!
//! ```text
//! ┌───────────────────────────────────────────────────┐
//! │  StateTable                                       │
//! │  ┌───────────────┬────────────────┬────────────┐  │
//! │  │ State         │ on_enter       │ on_exit    │  │
//! │  ├───────────────┼────────────────┼────────────┤  │
//! │  │ Booted        │ fn(ctx)        │ -          │  │
//! │  │ Unprovisioned │ -              │ -          │  │
//! │  │ Provisioning  │ fn(ctx)        │ fn(ctx)    │  │
//! │  │ NetworkReady  │ fn(ctx)        │ -          │  │
//! │  │ Resetting     │ fn(ctx)        │ -          │  │
//! │  └───────────────┴────────────────┴────────────┘  │
//! └───────────────────────────────────────────────────┘
//! ```
//!
//! Transitions are requested by the connectivity component from inside its
//! event handler.  The engine checks the edge against the lifecycle graph,
//! runs `on_exit` for the current state and `on_enter` for the next, and
//! updates the current pointer.  Handlers only write requests into a
//! [`LifecycleContext`]; the caller applies them to the ports afterwards.

pub mod context;
pub mod states;

use context::LifecycleContext;
use log::{info, warn};

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Network-membership lifecycle of the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LifecycleState {
    Booted = 0,
    Unprovisioned = 1,
    Provisioning = 2,
    NetworkReady = 3,
    Resetting = 4,
}

impl LifecycleState {
    /// Total number of states, used to size the table array.
    pub const COUNT: usize = 5;

    /// Convert an index back to a state.  Out-of-range maps to `Booted`.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            1 => Self::Unprovisioned,
            2 => Self::Provisioning,
            3 => Self::NetworkReady,
            4 => Self::Resetting,
            0 => Self::Booted,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::Booted
            }
        }
    }

    /// Whether the lifecycle graph has an edge `self -> next`.
    pub fn can_transition(self, next: Self) -> bool {
        use LifecycleState::{Booted, NetworkReady, Provisioning, Resetting, Unprovisioned};
        matches!(
            (self, next),
            (_, Resetting)
                | (Booted, Unprovisioned | NetworkReady)
                | (Unprovisioned, Provisioning | NetworkReady)
                | (Provisioning, Unprovisioned | NetworkReady)
                | (Resetting, Unprovisioned)
        )
    }
}

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
pub type StateActionFn = fn(&mut LifecycleContext);

/// Static descriptor for a single lifecycle state.
pub struct StateDescriptor {
    pub id: LifecycleState,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Owns the state table and the current state.
pub struct Lifecycle {
    /// Fixed-size table indexed by `LifecycleState as usize`.
    table: [StateDescriptor; LifecycleState::COUNT],
    current: usize,
    transitions: u32,
}

impl Lifecycle {
    /// Construct the engine in `Booted`.
    pub fn new(table: [StateDescriptor; LifecycleState::COUNT]) -> Self {
        Self {
            table,
            current: LifecycleState::Booted as usize,
            transitions: 0,
        }
    }

    /// Boot entry: jump to `Booted` from wherever the previous run left
    /// off and run its `on_enter`.
    pub fn boot(&mut self, ctx: &mut LifecycleContext) {
        info!("Lifecycle: boot (was {})", self.table[self.current].name);
        self.current = LifecycleState::Booted as usize;
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Move to `next` if the lifecycle graph allows it.
    ///
    /// Returns `false` (and changes nothing) for self-transitions and for
    /// edges the graph does not contain.
    pub fn transition(&mut self, next: LifecycleState, ctx: &mut LifecycleContext) -> bool {
        let from = self.current_state();
        if from == next {
            return false;
        }
        if !from.can_transition(next) {
            warn!(
                "Lifecycle: ignoring {} -> {}",
                self.table[self.current].name,
                self.table[next as usize].name
            );
            return false;
        }

        info!(
            "Lifecycle: {} -> {}",
            self.table[self.current].name,
            self.table[next as usize].name
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }
        self.current = next as usize;
        self.transitions = self.transitions.wrapping_add(1);
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
        true
    }

    /// The current state's identity.
    pub fn current_state(&self) -> LifecycleState {
        self.table[self.current].id
    }

    pub fn state_name(&self) -> &'static str {
        self.table[self.current].name
    }

    /// Number of transitions performed since construction.
    pub fn transition_count(&self) -> u32 {
        self.transitions
    }
}
