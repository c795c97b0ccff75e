//! Function-pointer finite state machine for the pairing session.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  StateTable                                                  │
//! │  ┌─────────────┬───────────┬──────────┬────────────────────┐ │
//! │  │ State       │ on_enter  │ on_exit  │ on_event           │ │
//! │  ├─────────────┼───────────┼──────────┼────────────────────┤ │
//! │  │ Unpaired    │     -     │    -     │ fn(ctx,ev)->Option │ │
//! │  │ AwaitingAck │ fn(ctx)   │    -     │ fn(ctx,ev)->Option │ │
//! │  │ Paired      │ fn(ctx)   │ fn(ctx)  │ fn(ctx,ev)->Option │ │
//! │  │ Debug       │ fn(ctx)   │    -     │ fn(ctx,ev)->Option │ │
//! │  └─────────────┴───────────┴──────────┴────────────────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each event is handed to `on_event` of the **current** state.  If it
//! returns `Some(next)`, the engine runs `on_exit` for the current state,
//! then `on_enter` for the next.  Handlers only write to the
//! [`SessionContext`]; the resulting [`SessionAction`]s are applied by
//! [`SessionMachine::run`] once the step is over, so the transition logic
//! is testable without queues, timers or pins.

pub mod context;
pub mod states;

use context::{Outbox, SessionAction, SessionContext};
use log::{info, warn};

use crate::app::events::FarmerEvent;
use crate::app::ports::{EventSink, IndicatorPort};
use crate::comm::schema::TELEMETRY_LEN;
use crate::comm::SessionLink;
use crate::config::FarmerConfig;
use crate::dispatch::{Context, Event, EventKind, ServiceId};
use crate::pins::OutputLine;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Session states.
/// Must stay in sync with the table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SessionState {
    Unpaired = 0,
    AwaitingAck = 1,
    Paired = 2,
    /// Manual stimulus mode, outside the production graph.
    Debug = 3,
}

impl SessionState {
    /// Total number of states; sizes the table array.
    pub const COUNT: usize = 4;

    /// Convert a table index back to a state.  Out-of-range indices
    /// assert in debug builds and fall back to `Unpaired` in release.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Unpaired,
            1 => Self::AwaitingAck,
            2 => Self::Paired,
            3 => Self::Debug,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::Unpaired
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
pub type StateActionFn = fn(&mut SessionContext);

/// Signature for the event handler.
/// Returns `Some(next)` to trigger a transition, or `None` to stay.
pub type StateEventFn = fn(&mut SessionContext, Event) -> Option<SessionState>;

/// One row of the state table.
pub struct StateDescriptor {
    pub id: SessionState,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_event: StateEventFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

pub struct Fsm {
    /// Fixed-size table indexed by `SessionState as usize`.
    table: [StateDescriptor; SessionState::COUNT],
    current: usize,
    events_handled: u64,
    transitions: u32,
}

impl Fsm {
    pub fn new(table: [StateDescriptor; SessionState::COUNT], initial: SessionState) -> Self {
        Self {
            table,
            current: initial as usize,
            events_handled: 0,
            transitions: 0,
        }
    }

    /// Run the initial `on_enter` for the starting state.
    pub fn start(&mut self, ctx: &mut SessionContext) {
        info!("FSM starting in state: {}", self.table[self.current].name);
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Deliver one event to the current state.
    pub fn handle(&mut self, ctx: &mut SessionContext, event: Event) {
        self.events_handled += 1;
        if let Some(next) = (self.table[self.current].on_event)(ctx, event) {
            if next as usize != self.current {
                self.transition(next, ctx);
            }
        }
    }

    /// Jump to `next` regardless of the current handler.
    pub fn force_transition(&mut self, next: SessionState, ctx: &mut SessionContext) {
        if next as usize != self.current {
            self.transition(next, ctx);
        }
    }

    pub fn current_state(&self) -> SessionState {
        SessionState::from_index(self.current)
    }

    pub fn events_handled(&self) -> u64 {
        self.events_handled
    }

    pub fn transitions(&self) -> u32 {
        self.transitions
    }

    fn transition(&mut self, next: SessionState, ctx: &mut SessionContext) {
        let next_idx = next as usize;
        info!(
            "FSM transition: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        self.current = next_idx;
        self.transitions = self.transitions.wrapping_add(1);

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}

// ---------------------------------------------------------------------------
// Session service
// ---------------------------------------------------------------------------

/// The session service: engine, blackboard and action application.
pub struct SessionMachine {
    fsm: Fsm,
    ctx: SessionContext,
}

impl SessionMachine {
    pub fn new(config: &FarmerConfig, seed: u64) -> Self {
        Self {
            fsm: Fsm::new(states::build_state_table(), SessionState::Unpaired),
            ctx: SessionContext::new(config, seed),
        }
    }

    /// Pure transition step: feed one event, get the side effects back.
    pub fn handle(&mut self, event: Event) -> Outbox {
        match event.kind {
            EventKind::Init => self.fsm.start(&mut self.ctx),
            EventKind::Unpair => {
                if self.fsm.current_state() != SessionState::Paired {
                    self.ctx.push(SessionAction::SetIndicator(false));
                }
                self.fsm.force_transition(SessionState::Unpaired, &mut self.ctx);
            }
            _ => self.fsm.handle(&mut self.ctx, event),
        }
        self.ctx.take_actions()
    }

    /// Service step: run [`handle`](Self::handle) and apply its actions.
    pub fn run<B>(
        &mut self,
        event: Event,
        cx: &mut Context<'_>,
        board: &mut B,
        telemetry: &[u8; TELEMETRY_LEN],
    ) -> Event
    where
        B: IndicatorPort + EventSink + ?Sized,
    {
        let from = self.state();
        let actions = self.handle(event);
        let to = self.state();
        if from != to {
            board.emit(&FarmerEvent::StateChanged { from, to });
        }

        let mut result = Event::NONE;
        for action in actions {
            match action {
                SessionAction::Send(ty) => {
                    if cx
                        .post(ServiceId::Comm, Event::new(EventKind::SendPacket, ty as u16))
                        .is_err()
                    {
                        warn!("session: {:?} request lost", ty);
                        result = Event::error(ty as u16);
                    }
                }
                SessionAction::Arm(timer, ticks) => cx.arm(timer, ticks),
                SessionAction::SetIndicator(on) => {
                    board.write_digital(OutputLine::PairedIndicator, on);
                    if !on {
                        board.write_digital(OutputLine::PeerStatus, false);
                    }
                }
                SessionAction::ShowTelemetry => {
                    board.write_digital(OutputLine::PeerStatus, telemetry[0] & 0x01 != 0);
                }
            }
        }
        result
    }

    pub fn state(&self) -> SessionState {
        self.fsm.current_state()
    }

    pub fn link(&self) -> &SessionLink {
        &self.ctx.link
    }

    /// Link material lent to the codec for one step.
    pub fn link_mut(&mut self) -> &mut SessionLink {
        &mut self.ctx.link
    }

    pub fn transitions(&self) -> u32 {
        self.fsm.transitions()
    }
}

#[cfg(test)]
mod tests {
    use super::context::SessionAction::{Arm, Send, SetIndicator, ShowTelemetry};
    use super::*;
    use crate::comm::schema::PacketType;
    use crate::dispatch::timers::TimerId;

    const PEER: u16 = 0x2085;

    fn machine() -> SessionMachine {
        let mut m = SessionMachine::new(&FarmerConfig::default(), 0x5EED);
        assert!(m.handle(Event::of(EventKind::Init)).is_empty());
        m
    }

    fn paired() -> SessionMachine {
        let mut m = machine();
        m.handle(Event::of(EventKind::Pair));
        m.handle(Event::new(EventKind::AckReceived, PEER));
        assert_eq!(m.state(), SessionState::Paired);
        m
    }

    #[test]
    fn starts_unpaired() {
        let m = machine();
        assert_eq!(m.state(), SessionState::Unpaired);
        assert!(!m.link().paired);
    }

    #[test]
    fn pair_sends_request_and_arms_lost_comm() {
        let mut m = machine();
        let out = m.handle(Event::of(EventKind::Pair));
        assert_eq!(m.state(), SessionState::AwaitingAck);
        assert_eq!(out.as_slice(), &[Send(PacketType::PairRequest), Arm(TimerId::LostComm, 2928)]);
    }

    #[test]
    fn unanswered_pairing_gives_up_silently() {
        let mut m = machine();
        m.handle(Event::of(EventKind::Pair));
        let out = m.handle(Event::timeout(TimerId::LostComm));
        assert_eq!(m.state(), SessionState::Unpaired);
        assert!(out.iter().all(|a| !matches!(a, Send(_))));
    }

    #[test]
    fn ack_issues_key_and_starts_session() {
        let mut m = machine();
        m.handle(Event::of(EventKind::Pair));
        let out = m.handle(Event::new(EventKind::AckReceived, PEER));

        assert_eq!(m.state(), SessionState::Paired);
        assert!(m.link().paired);
        assert_eq!(m.link().peer_address, PEER);
        assert_eq!(m.link().keys.index(), 0);
        assert_ne!(m.link().keys.key(), &[0u8; 32]);
        assert_eq!(
            out.as_slice(),
            &[
                Send(PacketType::KeyExchange),
                Arm(TimerId::LostComm, 2928),
                Arm(TimerId::InterMessage, 300),
                SetIndicator(true),
            ]
        );
    }

    #[test]
    fn session_timer_armed_when_configured() {
        let config = FarmerConfig {
            session_ticks: Some(5000),
            ..FarmerConfig::default()
        };
        let mut m = SessionMachine::new(&config, 1);
        m.handle(Event::of(EventKind::Init));
        m.handle(Event::of(EventKind::Pair));
        let out = m.handle(Event::new(EventKind::AckReceived, PEER));
        assert!(out.contains(&Arm(TimerId::Session, 5000)));

        m.handle(Event::timeout(TimerId::Session));
        assert_eq!(m.state(), SessionState::Unpaired);
    }

    #[test]
    fn each_pairing_draws_a_new_key() {
        let mut m = paired();
        let first = *m.link().keys.key();
        m.handle(Event::of(EventKind::Unpair));
        m.handle(Event::of(EventKind::Pair));
        m.handle(Event::new(EventKind::AckReceived, PEER));
        assert_ne!(m.link().keys.key(), &first);
    }

    #[test]
    fn inter_message_sends_control_and_rearms() {
        let mut m = paired();
        let out = m.handle(Event::timeout(TimerId::InterMessage));
        assert_eq!(out.as_slice(), &[Send(PacketType::Control), Arm(TimerId::InterMessage, 300)]);
    }

    #[test]
    fn report_refreshes_liveness_and_shows_telemetry() {
        let mut m = paired();
        let out = m.handle(Event::new(EventKind::ReportReceived, PEER));
        assert_eq!(out.as_slice(), &[ShowTelemetry, Arm(TimerId::LostComm, 2928)]);
    }

    #[test]
    fn reset_encryption_rewinds_index() {
        let mut m = paired();
        m.link_mut().keys.apply(0);
        m.link_mut().keys.apply(0);
        let out = m.handle(Event::new(EventKind::ResetEncryptionReceived, PEER));
        assert_eq!(m.link().keys.index(), 0);
        assert_eq!(out.as_slice(), &[Arm(TimerId::LostComm, 2928)]);
    }

    #[test]
    fn foreign_source_does_not_refresh_liveness() {
        let mut m = paired();
        m.link_mut().keys.apply(0);
        assert!(m.handle(Event::new(EventKind::ReportReceived, 0x1111)).is_empty());
        assert!(m.handle(Event::new(EventKind::ResetEncryptionReceived, 0x1111)).is_empty());
        assert_eq!(m.link().keys.index(), 1);
    }

    #[test]
    fn lost_comm_unpairs_and_clears() {
        let mut m = paired();
        let out = m.handle(Event::timeout(TimerId::LostComm));
        assert_eq!(m.state(), SessionState::Unpaired);
        assert_eq!(out.as_slice(), &[SetIndicator(false)]);
        assert!(!m.link().paired);
        assert_eq!(m.link().keys.key(), &[0u8; 32]);

        // A second, stale expiry changes nothing.
        assert!(m.handle(Event::timeout(TimerId::LostComm)).is_empty());
        assert_eq!(m.state(), SessionState::Unpaired);
    }

    #[test]
    fn unpair_accepted_everywhere() {
        for setup in [
            machine as fn() -> SessionMachine,
            || {
                let mut m = machine();
                m.handle(Event::of(EventKind::Pair));
                m
            },
            paired,
            || {
                let mut m = machine();
                m.handle(Event::of(EventKind::EnterDebug));
                m
            },
        ] {
            let mut m = setup();
            let out = m.handle(Event::of(EventKind::Unpair));
            assert_eq!(m.state(), SessionState::Unpaired);
            assert_eq!(out.as_slice(), &[SetIndicator(false)]);
        }
    }

    #[test]
    fn toggle_flips_peripheral_only_when_paired() {
        let mut m = machine();
        m.handle(Event::of(EventKind::TogglePeripheral));
        assert!(!m.link().peripheral_on);

        let mut m = paired();
        m.handle(Event::of(EventKind::TogglePeripheral));
        assert!(m.link().peripheral_on);
        m.handle(Event::of(EventKind::TogglePeripheral));
        assert!(!m.link().peripheral_on);
    }

    #[test]
    fn pair_while_paired_is_ignored() {
        let mut m = paired();
        assert!(m.handle(Event::of(EventKind::Pair)).is_empty());
        assert_eq!(m.state(), SessionState::Paired);
    }

    #[test]
    fn debug_mode_sends_on_request() {
        let mut m = machine();
        m.handle(Event::of(EventKind::EnterDebug));
        assert_eq!(m.state(), SessionState::Debug);

        let out = m.handle(Event::new(EventKind::DebugSend, PacketType::ResetEncryption as u16));
        assert_eq!(out.as_slice(), &[Send(PacketType::ResetEncryption)]);
        assert!(m.handle(Event::new(EventKind::DebugSend, 0x77)).is_empty());

        m.handle(Event::of(EventKind::ExitDebug));
        assert_eq!(m.state(), SessionState::Unpaired);
    }

    #[test]
    fn state_from_index_roundtrip() {
        for i in 0..SessionState::COUNT {
            assert_eq!(SessionState::from_index(i) as usize, i);
        }
    }
}
