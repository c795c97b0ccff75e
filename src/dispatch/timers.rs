//! One-shot software timers driven by the hardware tick.
//!
//! Each [`TimerId`] has exactly one owning service.  Arming a running timer
//! restarts it; on expiry a single `Timeout(id)` event is posted to the
//! owner and the slot goes idle.  There is no cancel: services ignore
//! timeouts that no longer apply to their current state.

use log::warn;

use super::{Dispatcher, Event, ServiceId};

/// Timer slots, one per id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TimerId {
    /// Frame receiver inter-byte timeout.
    Receive = 0,
    /// Session liveness window.
    LostComm = 1,
    /// Session control-packet cadence.
    InterMessage = 2,
    /// Optional session length cap.
    Session = 3,
    /// Codec transmit-result retry backoff.
    TxRetry = 4,
    /// Touch input lockout.
    TouchDebounce = 5,
    /// Nose input lockout.
    NoseDebounce = 6,
}

impl TimerId {
    pub const COUNT: usize = 7;

    pub const ALL: [TimerId; Self::COUNT] = [
        Self::Receive,
        Self::LostComm,
        Self::InterMessage,
        Self::Session,
        Self::TxRetry,
        Self::TouchDebounce,
        Self::NoseDebounce,
    ];

    /// Service that receives this timer's expiry.
    pub const fn owner(self) -> ServiceId {
        match self {
            Self::Receive => ServiceId::Receiver,
            Self::LostComm | Self::InterMessage | Self::Session => ServiceId::Session,
            Self::TxRetry => ServiceId::Comm,
            Self::TouchDebounce => ServiceId::Touch,
            Self::NoseDebounce => ServiceId::Nose,
        }
    }

    /// Recover the id carried in a `Timeout` event parameter.
    pub fn from_param(param: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|t| *t as u16 == param)
    }
}

/// Tick counter plus one deadline slot per [`TimerId`].
pub struct TimerService {
    slots: [Option<u32>; TimerId::COUNT],
    now: u32,
}

impl TimerService {
    pub const fn new() -> Self {
        Self {
            slots: [None; TimerId::COUNT],
            now: 0,
        }
    }

    /// Start (or restart) `id` to expire `ticks` ticks from now.
    /// A zero length fires on the next tick.
    pub fn arm(&mut self, id: TimerId, ticks: u32) {
        self.slots[id as usize] = Some(self.now.wrapping_add(ticks.max(1)));
    }

    /// Advance time by one tick and post a timeout for each slot whose
    /// deadline has been reached.  An expiry whose owner queue is full
    /// stays armed and is offered again on the next tick.
    pub fn tick(&mut self, queue: &mut Dispatcher) {
        self.now = self.now.wrapping_add(1);
        for id in TimerId::ALL {
            let slot = &mut self.slots[id as usize];
            if *slot == Some(self.now) {
                if queue.post(id.owner(), Event::timeout(id)).is_ok() {
                    *slot = None;
                } else {
                    warn!("timers: {:?} owner queue full, expiry held", id);
                    *slot = Some(self.now.wrapping_add(1));
                }
            }
        }
    }

    /// Elapsed ticks since boot (wraps).
    pub fn now(&self) -> u32 {
        self.now
    }

    pub fn is_running(&self, id: TimerId) -> bool {
        self.slots[id as usize].is_some()
    }

    /// Ticks left before `id` fires, if running.
    pub fn remaining(&self, id: TimerId) -> Option<u32> {
        self.slots[id as usize].map(|deadline| deadline.wrapping_sub(self.now))
    }
}

impl Default for TimerService {
    fn default() -> Self {
        Self::new()
    }
}
