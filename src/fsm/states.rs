//! Concrete lifecycle state handlers and table builder.
//!
//! ```text
//!  BOOTED ──[not provisioned]──▶ UNPROVISIONED ◀──[failed]── PROVISIONING
//!    │                                │                           │
//!    │                                └────────[started]─────────▶│
//!    │                                                            │
//!    └──────────[provisioned]──────▶ NETWORK_READY ◀─[succeeded]──┘
//!
//!  UNPROVISIONED ──[succeeded, start event missed]──▶ NETWORK_READY
//!  Any state ──[factory reset]──▶ RESETTING ──[erased]──▶ UNPROVISIONED
//! ```

use super::context::LifecycleContext;
use super::{LifecycleState, StateDescriptor};

/// Build the static state table.  Called once at startup.
pub fn build_state_table() -> [StateDescriptor; LifecycleState::COUNT] {
    [
        // Index 0: Booted
        StateDescriptor {
            id: LifecycleState::Booted,
            name: "Booted",
            on_enter: Some(booted_enter),
            on_exit: None,
        },
        // Index 1: Unprovisioned
        // Beaconing status is shown once advertising actually starts.
        StateDescriptor {
            id: LifecycleState::Unprovisioned,
            name: "Unprovisioned",
            on_enter: None,
            on_exit: None,
        },
        // Index 2: Provisioning
        StateDescriptor {
            id: LifecycleState::Provisioning,
            name: "Provisioning",
            on_enter: Some(provisioning_enter),
            on_exit: Some(provisioning_exit),
        },
        // Index 3: NetworkReady
        StateDescriptor {
            id: LifecycleState::NetworkReady,
            name: "NetworkReady",
            on_enter: Some(network_ready_enter),
            on_exit: None,
        },
        // Index 4: Resetting
        StateDescriptor {
            id: LifecycleState::Resetting,
            name: "Resetting",
            on_enter: Some(resetting_enter),
            on_exit: None,
        },
    ]
}

fn booted_enter(ctx: &mut LifecycleContext) {
    ctx.status = Some("Booting...");
}

fn provisioning_enter(ctx: &mut LifecycleContext) {
    ctx.status = Some("Provisioning...");
}

fn provisioning_exit(ctx: &mut LifecycleContext) {
    ctx.end_oob = true;
}

fn network_ready_enter(ctx: &mut LifecycleContext) {
    ctx.status = Some("Ready");
    ctx.announce_ready = true;
}

fn resetting_enter(ctx: &mut LifecycleContext) {
    ctx.status = Some("Factory Reset");
    ctx.erase_storage = true;
    ctx.end_oob = true;
}
