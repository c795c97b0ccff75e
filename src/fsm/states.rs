//! Session state handlers and table builder.
//!
//! Each state is three plain `fn` pointers: no closures, no dynamic
//! dispatch, no heap.
//!
//! ```text
//!  UNPAIRED ──[Pair]──▶ AWAITING_ACK ──[Ack]──▶ PAIRED
//!     ▲  │                   │                    │
//!     │  │            [lost-comm timeout]   [lost-comm / session
//!     │  │                   │               timeout, Unpair]
//!     ├──┼───────────────────┘                    │
//!     └──┼────────────────────────────────────────┘
//!        │
//!   [EnterDebug]──▶ DEBUG ──[ExitDebug]──▶ UNPAIRED
//!
//!  Any state ──[Unpair]──▶ UNPAIRED (handled by the machine)
//! ```

use log::{debug, info};

use super::context::{SessionAction, SessionContext};
use super::{SessionState, StateDescriptor};
use crate::comm::schema::PacketType;
use crate::dispatch::timers::TimerId;
use crate::dispatch::{Event, EventKind};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once at startup.
pub fn build_state_table() -> [StateDescriptor; SessionState::COUNT] {
    [
        // Index 0 — Unpaired
        StateDescriptor {
            id: SessionState::Unpaired,
            name: "Unpaired",
            on_enter: None,
            on_exit: None,
            on_event: unpaired_event,
        },
        // Index 1 — AwaitingAck
        StateDescriptor {
            id: SessionState::AwaitingAck,
            name: "AwaitingAck",
            on_enter: Some(awaiting_enter),
            on_exit: None,
            on_event: awaiting_event,
        },
        // Index 2 — Paired
        StateDescriptor {
            id: SessionState::Paired,
            name: "Paired",
            on_enter: Some(paired_enter),
            on_exit: Some(paired_exit),
            on_event: paired_event,
        },
        // Index 3 — Debug
        StateDescriptor {
            id: SessionState::Debug,
            name: "Debug",
            on_enter: Some(debug_enter),
            on_exit: None,
            on_event: debug_event,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  UNPAIRED
// ═══════════════════════════════════════════════════════════════════════════

fn unpaired_event(_ctx: &mut SessionContext, event: Event) -> Option<SessionState> {
    match event.kind {
        EventKind::Pair => Some(SessionState::AwaitingAck),
        EventKind::EnterDebug => Some(SessionState::Debug),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  AWAITING_ACK: pairing request sent, waiting for the DOG to answer
// ═══════════════════════════════════════════════════════════════════════════

fn awaiting_enter(ctx: &mut SessionContext) {
    ctx.send(PacketType::PairRequest);
    ctx.arm(TimerId::LostComm, ctx.timing.lost_comm_ticks);
}

fn awaiting_event(ctx: &mut SessionContext, event: Event) -> Option<SessionState> {
    match event.kind {
        EventKind::AckReceived => {
            ctx.link.peer_address = event.param;
            info!("AWAITING_ACK: ack from {:#06X}", event.param);
            Some(SessionState::Paired)
        }
        EventKind::Timeout if event.is_timeout(TimerId::LostComm) => {
            info!("AWAITING_ACK: no answer, pairing failed");
            Some(SessionState::Unpaired)
        }
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  PAIRED: key exchanged, streaming control packets
// ═══════════════════════════════════════════════════════════════════════════

fn paired_enter(ctx: &mut SessionContext) {
    ctx.new_key();
    ctx.link.paired = true;
    ctx.send(PacketType::KeyExchange);
    ctx.arm(TimerId::LostComm, ctx.timing.lost_comm_ticks);
    ctx.arm(TimerId::InterMessage, ctx.timing.inter_message_ticks);
    if let Some(ticks) = ctx.timing.session_ticks {
        ctx.arm(TimerId::Session, ticks);
    }
    ctx.push(SessionAction::SetIndicator(true));
    info!("PAIRED: peer {:#06X}, key issued", ctx.link.peer_address);
}

fn paired_exit(ctx: &mut SessionContext) {
    ctx.push(SessionAction::SetIndicator(false));
    ctx.link.reset();
}

fn paired_event(ctx: &mut SessionContext, event: Event) -> Option<SessionState> {
    match event.kind {
        EventKind::Timeout if event.is_timeout(TimerId::InterMessage) => {
            ctx.send(PacketType::Control);
            ctx.arm(TimerId::InterMessage, ctx.timing.inter_message_ticks);
            None
        }
        EventKind::Timeout if event.is_timeout(TimerId::LostComm) => {
            info!("PAIRED: peer silent, link lost");
            Some(SessionState::Unpaired)
        }
        EventKind::Timeout if event.is_timeout(TimerId::Session) => {
            info!("PAIRED: session time up");
            Some(SessionState::Unpaired)
        }
        EventKind::ReportReceived | EventKind::ResetEncryptionReceived | EventKind::AckReceived => {
            if event.param != ctx.link.peer_address {
                debug!("PAIRED: ignoring {:?} from {:#06X}", event.kind, event.param);
                return None;
            }
            match event.kind {
                EventKind::ReportReceived => ctx.push(SessionAction::ShowTelemetry),
                EventKind::ResetEncryptionReceived => {
                    debug!("PAIRED: key stream rewound");
                    ctx.link.keys.reset_index();
                }
                _ => {}
            }
            ctx.arm(TimerId::LostComm, ctx.timing.lost_comm_ticks);
            None
        }
        EventKind::TogglePeripheral => {
            ctx.link.peripheral_on = !ctx.link.peripheral_on;
            debug!("PAIRED: peripheral {}", if ctx.link.peripheral_on { "on" } else { "off" });
            None
        }
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  DEBUG: manual stimulus, outside the production graph
// ═══════════════════════════════════════════════════════════════════════════

fn debug_enter(_ctx: &mut SessionContext) {
    info!("DEBUG: manual packet mode");
}

fn debug_event(ctx: &mut SessionContext, event: Event) -> Option<SessionState> {
    match event.kind {
        EventKind::DebugSend => {
            match PacketType::from_u8(event.param as u8) {
                Some(ty) => ctx.send(ty),
                None => debug!("DEBUG: unknown packet type {:#04X}", event.param),
            }
            None
        }
        EventKind::ExitDebug => Some(SessionState::Unpaired),
        _ => None,
    }
}
