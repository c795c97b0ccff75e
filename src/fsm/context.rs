//! Shared mutable context threaded through every session handler.
//!
//! `SessionContext` is the blackboard the state handlers read from and
//! write to: session timing, the link material lent to the codec, the
//! key generator, and an outbox of [`SessionAction`]s.  Handlers never
//! touch queues, timers or pins directly; they describe what should
//! happen and the machine applies it after the step.

use heapless::Vec;
use log::warn;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::comm::cipher::KeyStream;
use crate::comm::schema::PacketType;
use crate::comm::SessionLink;
use crate::config::FarmerConfig;
use crate::dispatch::timers::TimerId;

/// Most actions one step can produce (paired entry emits five).
pub const OUTBOX_DEPTH: usize = 8;

// ---------------------------------------------------------------------------
// Actions (written by handlers; applied by the machine)
// ---------------------------------------------------------------------------

/// Side effects requested by a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    /// Ask the codec to build and send a packet.
    Send(PacketType),
    /// (Re)start a session timer.
    Arm(TimerId, u32),
    /// Drive the paired indicator (and clear peer status when off).
    SetIndicator(bool),
    /// Mirror the latest report telemetry onto the peer-status output.
    ShowTelemetry,
}

pub type Outbox = Vec<SessionAction, OUTBOX_DEPTH>;

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    pub lost_comm_ticks: u32,
    pub inter_message_ticks: u32,
    pub session_ticks: Option<u32>,
}

impl From<&FarmerConfig> for SessionTiming {
    fn from(c: &FarmerConfig) -> Self {
        Self {
            lost_comm_ticks: c.lost_comm_ticks,
            inter_message_ticks: c.inter_message_ticks,
            session_ticks: c.session_ticks,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionContext
// ---------------------------------------------------------------------------

pub struct SessionContext {
    pub timing: SessionTiming,
    pub link: SessionLink,
    rng: ChaCha8Rng,
    outbox: Outbox,
    dropped_actions: u32,
}

impl SessionContext {
    /// `seed` should mix whatever entropy the board offers at boot.
    pub fn new(config: &FarmerConfig, seed: u64) -> Self {
        Self {
            timing: SessionTiming::from(config),
            link: SessionLink::default(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            outbox: Vec::new(),
            dropped_actions: 0,
        }
    }

    /// Queue a side effect for after the step.
    pub fn push(&mut self, action: SessionAction) {
        if self.outbox.push(action).is_err() {
            self.dropped_actions += 1;
            warn!("session: outbox full, {:?} dropped", action);
        }
    }

    pub fn send(&mut self, ty: PacketType) {
        self.push(SessionAction::Send(ty));
    }

    pub fn arm(&mut self, timer: TimerId, ticks: u32) {
        self.push(SessionAction::Arm(timer, ticks));
    }

    /// Draw a fresh session key.  The index starts at 0.
    pub fn new_key(&mut self) {
        self.link.keys = KeyStream::generate(&mut self.rng);
    }

    /// Take everything the last step produced.
    pub fn take_actions(&mut self) -> Outbox {
        core::mem::take(&mut self.outbox)
    }

    pub fn dropped_actions(&self) -> u32 {
        self.dropped_actions
    }
}
