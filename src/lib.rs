//! FARMER controller firmware library.
//!
//! Pairs with one DOG over a half-duplex radio UART and streams
//! key-stream encrypted control packets to it.  Everything runs on a
//! cooperative event dispatcher fed from interrupt context; hardware is
//! reached only through the port traits in [`app::ports`], so the whole
//! stack runs on the host against [`adapters::sim`].
//!
//! ```text
//! interrupt ─▶ link::receiver ─▶ comm ─▶ fsm (session) ─▶ comm ─▶ link::transmitter ─▶ interrupt
//! ```

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod comm;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod fsm;
pub mod input;
pub mod link;
pub mod pins;

pub use app::service::Farmer;
pub use config::FarmerConfig;
pub use error::{Error, Result};
