//! Integration test driver for the `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises one part of the node
//! against the simulated mesh stack and board.  All tests run on the host
//! with no real hardware required.

mod friendship_tests;
mod measurement_tests;
mod mock_hw;
mod provisioning_flow_tests;
mod reset_tests;
