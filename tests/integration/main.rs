//! Integration test driver for the `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against the simulated board.  All tests run on the host with no real
//! hardware required.

mod link_tests;
mod mock_hw;
mod session_tests;
