//! Interrupt-to-foreground event boundary.
//!
//! Interrupt handlers never touch service state.  They push a small
//! [`IsrEvent`] into a bounded channel and return; the foreground pump
//! drains the channel and turns each entry into a dispatcher event or a
//! timer tick.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌────────────────────┐
//! │ UART RX ISR │────▶│              │     │ ByteReceived → Rx  │
//! │ UART TX ISR │────▶│   IsrQueue   │────▶│ TxComplete   → Tx  │
//! │ Tick ISR    │────▶│  (64 deep)   │     │ Tick         → timers│
//! └─────────────┘     └──────────────┘     └────────────────────┘
//! ```

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::app::ports::SerialPort;

/// Maximum number of interrupt events in flight.
pub const ISR_QUEUE_CAP: usize = 64;

/// What an interrupt observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsrEvent {
    /// A byte arrived on the radio UART.
    ByteReceived(u8),
    /// The UART finished shifting out the byte last written.
    TxComplete,
    /// One hardware tick elapsed.
    Tick,
}

/// Bounded, never-blocking ISR → foreground queue.
pub struct IsrQueue {
    chan: Channel<CriticalSectionRawMutex, IsrEvent, ISR_QUEUE_CAP>,
}

impl IsrQueue {
    pub const fn new() -> Self {
        Self {
            chan: Channel::new(),
        }
    }

    /// Push from interrupt context.  Returns `false` if the queue is full
    /// (event dropped).
    pub fn push(&self, event: IsrEvent) -> bool {
        self.chan.try_send(event).is_ok()
    }

    /// Pop from the foreground.
    pub fn pop(&self) -> Option<IsrEvent> {
        self.chan.try_receive().ok()
    }

    pub fn len(&self) -> usize {
        self.chan.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chan.is_empty()
    }
}

impl Default for IsrQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide queue the interrupt vectors write into.
pub static ISR_QUEUE: IsrQueue = IsrQueue::new();

// ── Interrupt entry points ────────────────────────────────────

/// UART receive vector.
pub fn uart_rx_isr(byte: u8) -> bool {
    ISR_QUEUE.push(IsrEvent::ByteReceived(byte))
}

/// UART transmit-complete vector.
pub fn uart_tx_isr() -> bool {
    ISR_QUEUE.push(IsrEvent::TxComplete)
}

/// Hardware tick vector.
pub fn tick_isr() -> bool {
    ISR_QUEUE.push(IsrEvent::Tick)
}

/// One pass of the shared UART vector: drain the receive data register
/// and report a finished transmit, if any.  Returns the number of events
/// that could not be queued.
pub fn service_uart_interrupt<S: SerialPort + ?Sized>(serial: &mut S, queue: &IsrQueue) -> usize {
    let mut dropped = 0;
    while let Some(byte) = serial.read_byte() {
        if !queue.push(IsrEvent::ByteReceived(byte)) {
            dropped += 1;
        }
    }
    if serial.take_tx_complete() && !queue.push(IsrEvent::TxComplete) {
        dropped += 1;
    }
    dropped
}
