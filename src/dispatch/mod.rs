//! Cooperative event dispatcher.
//!
//! A fixed set of services, each with a priority and a bounded FIFO of
//! [`Event`]s.  The foreground loop repeatedly pops one event from the
//! highest-priority non-empty queue and hands it to that service's step
//! function, which runs to completion before the next event is looked at.
//!
//! ```text
//!            post()                       next()
//!  ISR pump ───────▶ ┌─────────────────┐ ───────▶ Receiver.run(ev)
//!  services ───────▶ │ Receiver    [..]│  (highest non-empty first)
//!  timers   ───────▶ │ Transmitter [..]│
//!  commands ───────▶ │ Comm        [..]│
//!                    │ Session     [..]│
//!                    │ Touch       [..]│
//!                    │ Nose        [..]│
//!                    └─────────────────┘
//! ```
//!
//! Within one queue events are delivered in posting order; across queues
//! ordering is by priority only, never by arrival time.

pub mod timers;

use heapless::Deque;
use log::warn;

use crate::error::PostError;
use timers::{TimerId, TimerService};

/// Depth of every service queue.
pub const QUEUE_DEPTH: usize = 16;

// ---------------------------------------------------------------------------
// Service identity
// ---------------------------------------------------------------------------

/// The fixed set of cooperative services.
/// Lower discriminant = higher priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ServiceId {
    /// Byte-level frame receiver.
    Receiver = 0,
    /// Byte-level frame transmitter.
    Transmitter = 1,
    /// Packet codec.
    Comm = 2,
    /// Pairing / liveness / control session.
    Session = 3,
    /// Touch sensor debounce.
    Touch = 4,
    /// Nose button debounce.
    Nose = 5,
}

impl ServiceId {
    pub const COUNT: usize = 6;

    /// Every service, highest priority first.
    pub const ALL: [ServiceId; Self::COUNT] = [
        Self::Receiver,
        Self::Transmitter,
        Self::Comm,
        Self::Session,
        Self::Touch,
        Self::Nose,
    ];

    /// Priority rank; 0 is serviced first.
    pub const fn priority(self) -> u8 {
        self as u8
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Event tags understood by the services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Sentinel step result: nothing to report.
    NoEvent,
    /// Step result: the service rejected the event.
    Error,
    /// Synthetic first event, posted to every service before the loop.
    Init,
    /// A timer expired; param = [`TimerId`].
    Timeout,

    // ── Link ──────────────────────────────────────────────
    /// Raw byte from the UART; param = byte.
    ByteReceived,
    /// The UART finished shifting out the last written byte.
    ByteSent,
    /// Transmitter: put the staged frame on the wire; param = frame length.
    StartTransmit,
    /// Transmitter finished the whole frame.
    TransmitComplete,

    // ── Codec ─────────────────────────────────────────────
    /// A checksummed frame sits in the receive buffer; param = payload length.
    PacketReceived,
    /// Build and send a packet; param = packet type byte.
    SendPacket,

    // ── Session ───────────────────────────────────────────
    /// Start pairing.
    Pair,
    /// Drop the session from any state.
    Unpair,
    /// Peer acknowledged pairing; param = peer address.
    AckReceived,
    /// Peer status report arrived; param = source address.
    ReportReceived,
    /// Peer asked to restart the key stream; param = source address.
    ResetEncryptionReceived,
    /// Flip the peripheral bit in the control byte.
    TogglePeripheral,
    /// Enter the manual-stimulus mode.
    EnterDebug,
    /// Leave the manual-stimulus mode.
    ExitDebug,
    /// Debug mode: send one packet; param = packet type byte.
    DebugSend,

    // ── Inputs ────────────────────────────────────────────
    /// Raw input edge: line went low; param = tick of detection.
    ButtonDown,
    /// Raw input edge: line went high; param = tick of detection.
    ButtonUp,
}

/// A tagged event with one small parameter.  Copied by value into queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub param: u16,
}

impl Event {
    /// "Nothing happened" step result.
    pub const NONE: Event = Event::new(EventKind::NoEvent, 0);

    pub const fn new(kind: EventKind, param: u16) -> Self {
        Self { kind, param }
    }

    /// An event without a meaningful parameter.
    pub const fn of(kind: EventKind) -> Self {
        Self::new(kind, 0)
    }

    /// Step result signalling a rejected event.
    pub const fn error(param: u16) -> Self {
        Self::new(EventKind::Error, param)
    }

    pub const fn timeout(timer: TimerId) -> Self {
        Self::new(EventKind::Timeout, timer as u16)
    }

    /// True if this is the expiry of `timer`.
    pub fn is_timeout(&self, timer: TimerId) -> bool {
        self.kind == EventKind::Timeout && self.param == timer as u16
    }

    pub fn is_error(&self) -> bool {
        self.kind == EventKind::Error
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Per-service FIFO queues, drained in priority order.
pub struct Dispatcher {
    queues: [Deque<Event, QUEUE_DEPTH>; ServiceId::COUNT],
    dropped: u32,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            queues: core::array::from_fn(|_| Deque::new()),
            dropped: 0,
        }
    }

    /// Queue `event` for `to`.  A full queue drops the event.
    pub fn post(&mut self, to: ServiceId, event: Event) -> Result<(), PostError> {
        match self.queues[to as usize].push_back(event) {
            Ok(()) => Ok(()),
            Err(_) => {
                self.dropped = self.dropped.wrapping_add(1);
                warn!("dispatch: {:?} queue full, dropped {:?}", to, event.kind);
                Err(PostError::QueueFull(to))
            }
        }
    }

    /// Post [`EventKind::Init`] to every service, highest priority first.
    pub fn post_init(&mut self) -> Result<(), PostError> {
        for id in ServiceId::ALL {
            self.post(id, Event::of(EventKind::Init))?;
        }
        Ok(())
    }

    /// Pop the next event from the highest-priority non-empty queue.
    pub fn next(&mut self) -> Option<(ServiceId, Event)> {
        ServiceId::ALL
            .into_iter()
            .find_map(|id| self.queues[id as usize].pop_front().map(|ev| (id, ev)))
    }

    /// Events waiting for `id`.
    pub fn pending(&self, id: ServiceId) -> usize {
        self.queues[id as usize].len()
    }

    /// True when every queue is empty.
    pub fn is_idle(&self) -> bool {
        self.queues.iter().all(Deque::is_empty)
    }

    /// Events dropped on full queues since boot.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Step context
// ---------------------------------------------------------------------------

/// What a service step may touch besides its own state: the queues and
/// the timer table.
pub struct Context<'a> {
    pub queue: &'a mut Dispatcher,
    pub timers: &'a mut TimerService,
}

impl<'a> Context<'a> {
    pub fn new(queue: &'a mut Dispatcher, timers: &'a mut TimerService) -> Self {
        Self { queue, timers }
    }

    pub fn post(&mut self, to: ServiceId, event: Event) -> Result<(), PostError> {
        self.queue.post(to, event)
    }

    /// (Re)start `timer`; any pending expiry of the same id is cancelled.
    pub fn arm(&mut self, timer: TimerId, ticks: u32) {
        self.timers.arm(timer, ticks);
    }

    /// Elapsed ticks since boot.
    pub fn now(&self) -> u32 {
        self.timers.now()
    }
}
