//! Port traits: the hexagonal boundary between the services and the board.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Farmer runtime (domain)
//! ```
//!
//! Driven adapters (UART, ADC and GPIO, tick counter, event sinks)
//! implement these traits.  The [`Farmer`](super::service::Farmer)
//! runtime consumes them via generics, so no service touches hardware
//! directly.

use crate::pins::{AnalogChannel, InputLine, OutputLine};

// ───────────────────────────────────────────────────────────────
// Serial port (radio UART)
// ───────────────────────────────────────────────────────────────

/// The half-duplex radio UART.
pub trait SerialPort {
    /// Next byte from the receive data register, if one is waiting.
    fn read_byte(&mut self) -> Option<u8>;

    /// Load one byte into the transmit data register.
    fn write_byte(&mut self, byte: u8);

    /// Enable or disable the transmit-complete interrupt.
    fn set_tx_interrupt(&mut self, enabled: bool);

    /// True once per finished byte while the transmit interrupt is
    /// enabled.  Reading clears the flag.
    fn take_tx_complete(&mut self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Sensor port (hardware → domain)
// ───────────────────────────────────────────────────────────────

pub trait SensorPort {
    /// 12-bit sample of `channel`.
    fn sample_analog(&mut self, channel: AnalogChannel) -> u16;

    /// Level of a digital input.  HIGH = released.
    fn read_digital(&mut self, line: InputLine) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Indicator port (domain → hardware)
// ───────────────────────────────────────────────────────────────

pub trait IndicatorPort {
    fn write_digital(&mut self, line: OutputLine, on: bool);
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

pub trait ClockPort {
    /// Free-running hardware tick count since power-up.
    fn elapsed_ticks(&self) -> u32;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The runtime emits structured [`FarmerEvent`](super::events::FarmerEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::FarmerEvent);
}

// ───────────────────────────────────────────────────────────────
// Whole board
// ───────────────────────────────────────────────────────────────

/// Everything the runtime needs from one board, behind one handle so a
/// step never holds two mutable borrows of the same adapter.
pub trait Board: SerialPort + SensorPort + IndicatorPort + ClockPort + EventSink {}

impl<T> Board for T where T: SerialPort + SensorPort + IndicatorPort + ClockPort + EventSink {}
