//! Inbound commands to the runtime.
//!
//! These are actions requested by the outside world (console key
//! checker, test harness, host tooling) that the
//! [`Farmer`](super::service::Farmer) runtime turns into session events.

use crate::comm::schema::PacketType;
use crate::dispatch::{Event, EventKind};

/// Commands that external producers can send into the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FarmerCommand {
    /// Start pairing (same as a touch-pad release).
    Pair,

    /// Drop the session from any state.
    Unpair,

    /// Toggle the peripheral bit (same as a nose-button release).
    TogglePeripheral,

    /// Enter the manual packet mode.
    EnterDebug,

    /// Leave the manual packet mode.
    ExitDebug,

    /// In debug mode, build and send one packet.
    DebugSend(PacketType),
}

impl FarmerCommand {
    /// The session event this command stands for.
    pub fn to_event(self) -> Event {
        match self {
            Self::Pair => Event::of(EventKind::Pair),
            Self::Unpair => Event::of(EventKind::Unpair),
            Self::TogglePeripheral => Event::of(EventKind::TogglePeripheral),
            Self::EnterDebug => Event::of(EventKind::EnterDebug),
            Self::ExitDebug => Event::of(EventKind::ExitDebug),
            Self::DebugSend(ty) => Event::new(EventKind::DebugSend, ty as u16),
        }
    }

    /// Console key binding: `d` pair, `u` unpair, `p` peripheral,
    /// `g` / `x` enter / exit debug, `0`-`5` debug-send that packet type.
    pub fn from_key(key: char) -> Option<Self> {
        match key.to_ascii_lowercase() {
            'd' => Some(Self::Pair),
            'u' => Some(Self::Unpair),
            'p' => Some(Self::TogglePeripheral),
            'g' => Some(Self::EnterDebug),
            'x' => Some(Self::ExitDebug),
            c => c
                .to_digit(10)
                .and_then(|d| PacketType::from_u8(d as u8))
                .map(Self::DebugSend),
        }
    }
}
