//! Hardware adapter — bridges real peripherals to the domain port traits.
//!
//! Digital lines are any `embedded-hal` 1.0 [`InputPin`] / [`OutputPin`].
//! The radio UART is any [`SerialPort`] driver; the ADC and the tick
//! counter are handed in as closures so a board crate can bind them to
//! whatever its HAL provides.  This is the only module that touches
//! peripherals.

use embedded_hal::digital::{InputPin, OutputPin};
use log::warn;

use crate::app::events::FarmerEvent;
use crate::app::ports::{ClockPort, EventSink, IndicatorPort, SensorPort, SerialPort};
use crate::pins::{AnalogChannel, InputLine, OutputLine, ADC_MAX};

use super::log_sink::LogEventSink;

/// The two button inputs.
pub struct Inputs<T, N> {
    pub touch: T,
    pub nose: N,
}

/// The two indicator outputs.
pub struct Outputs<L, P> {
    pub paired: L,
    pub peer_status: P,
}

/// Concrete adapter that combines all hardware behind port traits.
pub struct HardwareAdapter<U, A, C, T, N, L, P> {
    uart: U,
    adc: A,
    clock: C,
    inputs: Inputs<T, N>,
    outputs: Outputs<L, P>,
    sink: LogEventSink,
}

impl<U, A, C, T, N, L, P> HardwareAdapter<U, A, C, T, N, L, P>
where
    U: SerialPort,
    A: FnMut(AnalogChannel) -> u16,
    C: Fn() -> u32,
    T: InputPin,
    N: InputPin,
    L: OutputPin,
    P: OutputPin,
{
    pub fn new(uart: U, adc: A, clock: C, inputs: Inputs<T, N>, outputs: Outputs<L, P>) -> Self {
        Self {
            uart,
            adc,
            clock,
            inputs,
            outputs,
            sink: LogEventSink::new(),
        }
    }

    pub fn uart(&mut self) -> &mut U {
        &mut self.uart
    }
}

// ── SerialPort implementation ─────────────────────────────────

impl<U, A, C, T, N, L, P> SerialPort for HardwareAdapter<U, A, C, T, N, L, P>
where
    U: SerialPort,
{
    fn read_byte(&mut self) -> Option<u8> {
        self.uart.read_byte()
    }

    fn write_byte(&mut self, byte: u8) {
        self.uart.write_byte(byte);
    }

    fn set_tx_interrupt(&mut self, enabled: bool) {
        self.uart.set_tx_interrupt(enabled);
    }

    fn take_tx_complete(&mut self) -> bool {
        self.uart.take_tx_complete()
    }
}

// ── SensorPort implementation ─────────────────────────────────

impl<U, A, C, T, N, L, P> SensorPort for HardwareAdapter<U, A, C, T, N, L, P>
where
    A: FnMut(AnalogChannel) -> u16,
    T: InputPin,
    N: InputPin,
{
    fn sample_analog(&mut self, channel: AnalogChannel) -> u16 {
        (self.adc)(channel) & ADC_MAX
    }

    fn read_digital(&mut self, line: InputLine) -> bool {
        // A failed read counts as released so it cannot fake a press.
        let level = match line {
            InputLine::Touch => self.inputs.touch.is_high().map_err(|_| ()),
            InputLine::Nose => self.inputs.nose.is_high().map_err(|_| ()),
        };
        level.unwrap_or_else(|()| {
            warn!("hw: cannot read {:?}", line);
            true
        })
    }
}

// ── IndicatorPort implementation ──────────────────────────────

impl<U, A, C, T, N, L, P> IndicatorPort for HardwareAdapter<U, A, C, T, N, L, P>
where
    L: OutputPin,
    P: OutputPin,
{
    fn write_digital(&mut self, line: OutputLine, on: bool) {
        let ok = match line {
            OutputLine::PairedIndicator => set_pin(&mut self.outputs.paired, on),
            OutputLine::PeerStatus => set_pin(&mut self.outputs.peer_status, on),
        };
        if !ok {
            warn!("hw: cannot drive {:?}", line);
        }
    }
}

fn set_pin<O: OutputPin>(pin: &mut O, on: bool) -> bool {
    if on { pin.set_high().is_ok() } else { pin.set_low().is_ok() }
}

// ── ClockPort / EventSink ─────────────────────────────────────

impl<U, A, C, T, N, L, P> ClockPort for HardwareAdapter<U, A, C, T, N, L, P>
where
    C: Fn() -> u32,
{
    fn elapsed_ticks(&self) -> u32 {
        (self.clock)()
    }
}

impl<U, A, C, T, N, L, P> EventSink for HardwareAdapter<U, A, C, T, N, L, P> {
    fn emit(&mut self, event: &FarmerEvent) {
        self.sink.emit(event);
    }
}
