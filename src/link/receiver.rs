//! Frame receiver service.
//!
//! Deframes the byte stream delivered by the UART interrupt, one
//! `ByteReceived` event at a time:
//!
//! ```text
//!  WaitStart ──0x7E──▶ WaitLengthHigh ──▶ WaitLengthLow ──▶ Receiving
//!      ▲                                       │ N∉1..=40      │
//!      └───────────────────────────────────────┴───────────────┘
//!              checksum byte / inter-byte timeout
//! ```
//!
//! A frame whose checksum balances is copied into the receive buffer and
//! announced to the codec as `PacketReceived(N)`.  Everything else
//! (noise before a delimiter, bad length, checksum mismatch, a stalled
//! frame) is dropped locally and only counted in [`RxStats`].
//!
//! A header announcing zero payload bytes counts as a bad length.  The
//! byte after it is not consumed as a checksum and no empty
//! `PacketReceived(0)` reaches the codec; the receiver simply hunts for
//! the next delimiter.

use log::{debug, trace, warn};

use super::{frame_length, MAX_PAYLOAD_LEN, START_DELIMITER};
use crate::dispatch::timers::TimerId;
use crate::dispatch::{Context, Event, EventKind, ServiceId};

/// Deframer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxState {
    WaitStart,
    WaitLengthHigh,
    WaitLengthLow { msb: u8 },
    Receiving { expected: usize, index: usize, sum: u8 },
}

/// Framing counters since boot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxStats {
    /// Frames accepted and handed to the codec.
    pub frames: u32,
    /// Frames dropped on checksum mismatch.
    pub checksum_errors: u32,
    /// Frames abandoned on inter-byte timeout.
    pub timeouts: u32,
    /// Headers announcing an empty or oversize payload.
    pub bad_length: u32,
}

pub struct FrameReceiver {
    state: RxState,
    scratch: [u8; MAX_PAYLOAD_LEN],
    buffer: [u8; MAX_PAYLOAD_LEN],
    buffer_len: usize,
    timeout_ticks: u32,
    stats: RxStats,
}

impl FrameReceiver {
    pub fn new(timeout_ticks: u32) -> Self {
        Self {
            state: RxState::WaitStart,
            scratch: [0; MAX_PAYLOAD_LEN],
            buffer: [0; MAX_PAYLOAD_LEN],
            buffer_len: 0,
            timeout_ticks,
            stats: RxStats::default(),
        }
    }

    /// Service step.
    pub fn run(&mut self, event: Event, cx: &mut Context<'_>) -> Event {
        match event.kind {
            EventKind::Init => {
                self.state = RxState::WaitStart;
                Event::NONE
            }
            EventKind::Timeout if event.is_timeout(TimerId::Receive) => {
                if self.state != RxState::WaitStart {
                    self.stats.timeouts += 1;
                    debug!("rx: inter-byte timeout in {:?}, frame dropped", self.state);
                    self.state = RxState::WaitStart;
                }
                Event::NONE
            }
            EventKind::ByteReceived => self.on_byte(event.param as u8, cx),
            _ => Event::NONE,
        }
    }

    fn on_byte(&mut self, byte: u8, cx: &mut Context<'_>) -> Event {
        trace!("rx: {:02X} in {:?}", byte, self.state);
        match self.state {
            RxState::WaitStart => {
                if byte == START_DELIMITER {
                    self.state = RxState::WaitLengthHigh;
                    cx.arm(TimerId::Receive, self.timeout_ticks);
                }
            }
            RxState::WaitLengthHigh => {
                self.state = RxState::WaitLengthLow { msb: byte };
                cx.arm(TimerId::Receive, self.timeout_ticks);
            }
            RxState::WaitLengthLow { msb } => {
                let expected = frame_length(msb, byte);
                if expected == 0 || expected > MAX_PAYLOAD_LEN {
                    self.stats.bad_length += 1;
                    debug!("rx: announced length {} rejected", expected);
                    self.state = RxState::WaitStart;
                } else {
                    self.state = RxState::Receiving {
                        expected,
                        index: 0,
                        sum: 0,
                    };
                    cx.arm(TimerId::Receive, self.timeout_ticks);
                }
            }
            RxState::Receiving {
                expected,
                index,
                sum,
            } => {
                if index == expected {
                    self.state = RxState::WaitStart;
                    return self.finish(expected, sum, byte, cx);
                }
                self.scratch[index] = byte;
                self.state = RxState::Receiving {
                    expected,
                    index: index + 1,
                    sum: sum.wrapping_add(byte),
                };
                cx.arm(TimerId::Receive, self.timeout_ticks);
            }
        }
        Event::NONE
    }

    fn finish(&mut self, len: usize, sum: u8, checksum: u8, cx: &mut Context<'_>) -> Event {
        if checksum != 0xFF - sum {
            self.stats.checksum_errors += 1;
            warn!(
                "rx: checksum mismatch (got {:02X}, want {:02X}), frame dropped",
                checksum,
                0xFF - sum
            );
            return Event::NONE;
        }

        self.buffer[..len].copy_from_slice(&self.scratch[..len]);
        self.buffer_len = len;
        self.stats.frames += 1;
        debug!("rx: frame of {} bytes accepted", len);

        match cx.post(ServiceId::Comm, Event::new(EventKind::PacketReceived, len as u16)) {
            Ok(()) => Event::NONE,
            Err(_) => Event::error(len as u16),
        }
    }

    /// Payload of the last accepted frame.  Overwritten by the next one.
    pub fn frame(&self) -> &[u8] {
        &self.buffer[..self.buffer_len]
    }

    pub fn state(&self) -> RxState {
        self.state
    }

    pub fn stats(&self) -> RxStats {
        self.stats
    }
}
