//! Frame transmitter service.
//!
//! Holds the single outbound frame buffer and drains it one byte per
//! transmit-complete interrupt.  The codec stages a frame with
//! [`FrameTransmitter::load`] and then posts `StartTransmit`; a second
//! frame cannot be staged until `TransmitComplete` has been posted back.

use log::{debug, trace, warn};

use super::MAX_FRAME_LEN;
use crate::app::ports::SerialPort;
use crate::dispatch::{Context, Event, EventKind, ServiceId};
use crate::error::LinkError;

/// Fixed outbound frame storage.
pub struct TxBuffer {
    bytes: [u8; MAX_FRAME_LEN],
    len: usize,
}

impl TxBuffer {
    pub const fn new() -> Self {
        Self {
            bytes: [0; MAX_FRAME_LEN],
            len: 0,
        }
    }

    fn load(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        if frame.is_empty() {
            return Err(LinkError::EmptyPayload);
        }
        if frame.len() > MAX_FRAME_LEN {
            return Err(LinkError::TooLong(frame.len()));
        }
        self.bytes[..frame.len()].copy_from_slice(frame);
        self.len = frame.len();
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

impl Default for TxBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Idle,
    /// A frame is loaded, waiting for `StartTransmit`.
    Staged,
    /// `next` bytes have been written to the UART.
    Sending { next: usize },
}

pub struct FrameTransmitter {
    state: TxState,
    buffer: TxBuffer,
    frames_sent: u32,
}

impl FrameTransmitter {
    pub const fn new() -> Self {
        Self {
            state: TxState::Idle,
            buffer: TxBuffer::new(),
            frames_sent: 0,
        }
    }

    /// Copy a complete frame into the outbound buffer.
    pub fn load(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        if self.is_busy() {
            return Err(LinkError::TransmitterBusy);
        }
        self.buffer.load(frame)?;
        self.state = TxState::Staged;
        Ok(())
    }

    /// Drop a staged frame that will never be started.  A frame already
    /// on the wire is left alone.
    pub fn abort(&mut self) {
        if self.state == TxState::Staged {
            debug!("tx: staged frame withdrawn");
            self.state = TxState::Idle;
        }
    }

    /// Service step.
    pub fn run<S: SerialPort + ?Sized>(
        &mut self,
        event: Event,
        cx: &mut Context<'_>,
        serial: &mut S,
    ) -> Event {
        match event.kind {
            EventKind::Init => {
                serial.set_tx_interrupt(false);
                self.state = TxState::Idle;
                Event::NONE
            }
            EventKind::StartTransmit => self.start(serial),
            EventKind::ByteSent => self.on_byte_sent(cx, serial),
            _ => Event::NONE,
        }
    }

    fn start<S: SerialPort + ?Sized>(&mut self, serial: &mut S) -> Event {
        if self.state != TxState::Staged {
            warn!("tx: start requested in {:?}", self.state);
            return Event::error(self.buffer.len as u16);
        }
        let frame = self.buffer.as_slice();
        debug!("tx: sending {} byte frame", frame.len());
        serial.write_byte(frame[0]);
        serial.set_tx_interrupt(true);
        self.state = TxState::Sending { next: 1 };
        Event::NONE
    }

    fn on_byte_sent<S: SerialPort + ?Sized>(&mut self, cx: &mut Context<'_>, serial: &mut S) -> Event {
        let TxState::Sending { next } = self.state else {
            trace!("tx: stray byte-sent in {:?}", self.state);
            return Event::NONE;
        };

        if next < self.buffer.len {
            serial.write_byte(self.buffer.bytes[next]);
            self.state = TxState::Sending { next: next + 1 };
            return Event::NONE;
        }

        serial.set_tx_interrupt(false);
        self.state = TxState::Idle;
        self.frames_sent = self.frames_sent.wrapping_add(1);
        match cx.post(ServiceId::Comm, Event::of(EventKind::TransmitComplete)) {
            Ok(()) => Event::NONE,
            Err(_) => Event::error(0),
        }
    }

    /// True once the final byte of the frame has been written to the UART.
    pub fn is_last_byte(&self) -> bool {
        matches!(self.state, TxState::Sending { next } if next == self.buffer.len)
    }

    /// True from `load` until the frame is fully on the wire.
    pub fn is_busy(&self) -> bool {
        self.state != TxState::Idle
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    /// The staged or last-sent frame.
    pub fn buffer(&self) -> &TxBuffer {
        &self.buffer
    }

    pub fn frames_sent(&self) -> u32 {
        self.frames_sent
    }
}

impl Default for FrameTransmitter {
    fn default() -> Self {
        Self::new()
    }
}
