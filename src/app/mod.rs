//! Application core: the cooperative runtime and its boundary.
//!
//! [`service::Farmer`] owns the dispatcher, timers and every service.
//! All interaction with hardware happens through **port traits** defined
//! in [`ports`], keeping this layer testable without real peripherals.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
