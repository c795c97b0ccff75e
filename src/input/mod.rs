//! Input event sources.
//!
//! Raw digital lines are polled by [`EdgeChecker`]s, which post
//! `ButtonDown` / `ButtonUp` to a [`Debouncer`] service on every change.
//! The debouncer ignores edges during its lockout window and turns a
//! clean release into one semantic event for the session:
//!
//! | Line  | Release posts      |
//! |-------|--------------------|
//! | Touch | `Pair`             |
//! | Nose  | `TogglePeripheral` |

pub mod sensors;

use log::{debug, warn};

use crate::app::ports::SensorPort;
use crate::dispatch::timers::TimerId;
use crate::dispatch::{Context, Dispatcher, Event, EventKind, ServiceId};
use crate::error::PostError;
use crate::pins::InputLine;

// ---------------------------------------------------------------------------
// Edge checker
// ---------------------------------------------------------------------------

/// Polls one input line and posts an event to `target` on each change.
/// HIGH reads as released.
pub struct EdgeChecker {
    line: InputLine,
    target: ServiceId,
    last: bool,
}

impl EdgeChecker {
    pub const fn new(line: InputLine, target: ServiceId) -> Self {
        Self {
            line,
            target,
            last: true,
        }
    }

    /// Sample the line once.  Returns `Ok(true)` if an edge was posted.
    pub fn check<S: SensorPort + ?Sized>(
        &mut self,
        sensors: &mut S,
        queue: &mut Dispatcher,
        now: u32,
    ) -> Result<bool, PostError> {
        let level = sensors.read_digital(self.line);
        if level == self.last {
            return Ok(false);
        }
        self.last = level;
        let kind = if level { EventKind::ButtonUp } else { EventKind::ButtonDown };
        // The parameter carries the low half of the tick counter.
        queue
            .post(self.target, Event::new(kind, now as u16))
            .inspect_err(|_| warn!("input: {:?} edge lost", self.line))?;
        Ok(true)
    }

    pub fn line(&self) -> InputLine {
        self.line
    }

    pub fn target(&self) -> ServiceId {
        self.target
    }
}

// ---------------------------------------------------------------------------
// Debounce service
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    /// Lockout running; edges are ignored.
    Debouncing,
    /// Accepting the next edge.
    Ready,
}

/// Lockout-based debounce.  Every accepted edge restarts the lockout;
/// an accepted release also posts `on_release` to the session.
pub struct Debouncer {
    timer: TimerId,
    ticks: u32,
    on_release: EventKind,
    state: DebounceState,
}

impl Debouncer {
    pub const fn new(timer: TimerId, ticks: u32, on_release: EventKind) -> Self {
        Self {
            timer,
            ticks,
            on_release,
            state: DebounceState::Debouncing,
        }
    }

    /// Touch pad: a release asks to pair.
    pub const fn touch(ticks: u32) -> Self {
        Self::new(TimerId::TouchDebounce, ticks, EventKind::Pair)
    }

    /// Nose button: a release toggles the peripheral.
    pub const fn nose(ticks: u32) -> Self {
        Self::new(TimerId::NoseDebounce, ticks, EventKind::TogglePeripheral)
    }

    /// Service step.
    pub fn run(&mut self, event: Event, cx: &mut Context<'_>) -> Event {
        match (self.state, event.kind) {
            (_, EventKind::Init) => {
                self.state = DebounceState::Debouncing;
                cx.arm(self.timer, self.ticks);
                Event::NONE
            }
            (DebounceState::Debouncing, EventKind::Timeout) if event.is_timeout(self.timer) => {
                self.state = DebounceState::Ready;
                Event::NONE
            }
            (DebounceState::Ready, EventKind::ButtonDown) => {
                self.lock(cx);
                Event::NONE
            }
            (DebounceState::Ready, EventKind::ButtonUp) => {
                self.lock(cx);
                debug!("input: release on {:?}, posting {:?}", self.timer, self.on_release);
                match cx.post(ServiceId::Session, Event::new(self.on_release, event.param)) {
                    Ok(()) => Event::NONE,
                    Err(_) => Event::error(event.param),
                }
            }
            _ => Event::NONE,
        }
    }

    fn lock(&mut self, cx: &mut Context<'_>) {
        self.state = DebounceState::Debouncing;
        cx.arm(self.timer, self.ticks);
    }

    pub fn state(&self) -> DebounceState {
        self.state
    }
}
