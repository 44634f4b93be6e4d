//! Soil moisture mesh node firmware library.
//!
//! Exposes the node's coordination logic for integration testing and for
//! the host simulator.  ESP-IDF-specific code is guarded by
//! `#[cfg(feature = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod fsm;
pub mod scheduler;

pub mod adapters;
pub mod drivers;
pub mod sensors;
