//! The cooperative runtime — the hexagonal core.
//!
//! [`Farmer`] owns the dispatcher, the timer table and every service.
//! It exposes a hardware-agnostic API; all I/O flows through the
//! [`Board`] port handed in at construction, so the whole runtime is
//! testable with mock adapters.
//!
//! ```text
//!  IsrQueue ──▶ ┌──────────────────────────────────────────┐ ──▶ EventSink
//!               │                 Farmer                   │
//!  SensorPort ─▶│ Rx · Tx · Comm · Session · Touch · Nose  │ ──▶ IndicatorPort
//!               │        Dispatcher · TimerService         │ ──▶ SerialPort
//!               └──────────────────────────────────────────┘
//! ```

use log::{debug, info, warn};

use crate::comm::schema::TELEMETRY_LEN;
use crate::comm::{CommPorts, CommService};
use crate::config::FarmerConfig;
use crate::dispatch::timers::TimerService;
use crate::dispatch::{Context, Dispatcher, Event, EventKind, ServiceId, QUEUE_DEPTH};
use crate::error::{PostError, Result};
use crate::events::{service_uart_interrupt, IsrEvent, IsrQueue, ISR_QUEUE};
use crate::fsm::{SessionMachine, SessionState};
use crate::input::{Debouncer, EdgeChecker};
use crate::link::receiver::{FrameReceiver, RxStats};
use crate::link::transmitter::FrameTransmitter;
use crate::pins::{AnalogChannel, InputLine};

use super::commands::FarmerCommand;
use super::events::FarmerEvent;
use super::ports::Board;

// ───────────────────────────────────────────────────────────────
// Farmer
// ───────────────────────────────────────────────────────────────

/// The runtime: one board, one session, six services.
pub struct Farmer<'q, B: Board> {
    board: B,
    isr: &'q IsrQueue,
    queue: Dispatcher,
    timers: TimerService,

    receiver: FrameReceiver,
    transmitter: FrameTransmitter,
    comm: CommService,
    session: SessionMachine,
    touch: Debouncer,
    nose: Debouncer,
    touch_edges: EdgeChecker,
    nose_edges: EdgeChecker,

    /// Interrupt event waiting for room in its service queue.
    held: Option<IsrEvent>,
    dog_tag: u8,
    steps: u64,
}

impl<B: Board> Farmer<'static, B> {
    /// Build a runtime fed by the process-wide [`ISR_QUEUE`].
    pub fn new(config: &FarmerConfig, board: B) -> Self {
        Self::with_queue(config, board, &ISR_QUEUE)
    }
}

impl<'q, B: Board> Farmer<'q, B> {
    /// Build a runtime fed by `isr`.
    ///
    /// Does **not** start the services — call [`start`](Self::start) next.
    pub fn with_queue(config: &FarmerConfig, mut board: B, isr: &'q IsrQueue) -> Self {
        let seed = entropy_seed(&mut board);
        debug!("farmer: key generator seeded with {:#018X}", seed);

        Self {
            board,
            isr,
            queue: Dispatcher::new(),
            timers: TimerService::new(),
            receiver: FrameReceiver::new(config.receive_timeout_ticks),
            transmitter: FrameTransmitter::new(),
            comm: CommService::new(config),
            session: SessionMachine::new(config, seed),
            touch: Debouncer::touch(config.touch_debounce_ticks),
            nose: Debouncer::nose(config.nose_debounce_ticks),
            touch_edges: EdgeChecker::new(InputLine::Touch, ServiceId::Touch),
            nose_edges: EdgeChecker::new(InputLine::Nose, ServiceId::Nose),
            held: None,
            dog_tag: config.dog_tag,
            steps: 0,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Post `Init` to every service.  The events are handled by the
    /// following [`poll`](Self::poll) calls.
    pub fn start(&mut self) -> Result<()> {
        self.queue.post_init()?;
        self.board.emit(&FarmerEvent::Started {
            dog_tag: self.dog_tag,
        });
        info!("Farmer started, DOG tag {}", self.dog_tag);
        Ok(())
    }

    /// The foreground loop.  Never returns.
    pub fn run(&mut self) -> ! {
        loop {
            self.poll();
        }
    }

    /// One pass of the foreground loop: drain the interrupt queue, sample
    /// the input lines and dispatch at most one event.  Returns `true` if
    /// an event was dispatched.
    pub fn poll(&mut self) -> bool {
        self.pump_isr();
        self.check_inputs();
        self.dispatch_one()
    }

    /// Poll until every queue is empty, at most `max_steps` times.
    /// Returns the number of events dispatched.
    pub fn run_until_idle(&mut self, max_steps: usize) -> usize {
        let mut dispatched = 0;
        for _ in 0..max_steps {
            if self.poll() {
                dispatched += 1;
            } else if self.held.is_none() && self.isr.is_empty() {
                break;
            }
        }
        dispatched
    }

    // ── Event injection ───────────────────────────────────────

    /// Inject an event for `to` from an external producer.
    pub fn post_event(&mut self, to: ServiceId, event: Event) -> core::result::Result<(), PostError> {
        self.queue.post(to, event)
    }

    /// Process an external command (console, test harness).
    pub fn handle_command(&mut self, cmd: FarmerCommand) -> core::result::Result<(), PostError> {
        debug!("farmer: command {:?}", cmd);
        self.post_event(ServiceId::Session, cmd.to_event())
    }

    /// Run the UART interrupt body against the board: received bytes and a
    /// finished transmit land in the interrupt queue.  Hosted builds call
    /// this where a target would take the interrupt.
    pub fn service_uart(&mut self) -> usize {
        let dropped = service_uart_interrupt(&mut self.board, self.isr);
        if dropped > 0 {
            warn!("farmer: {} UART events lost, interrupt queue full", dropped);
        }
        dropped
    }

    /// Drain the interrupt queue into the dispatcher and the timer table.
    ///
    /// Stops early when the target service queue is full; the event is
    /// held back and delivered on a later pass, so a burst of bytes waits
    /// in the interrupt queue instead of being dropped.
    pub fn pump_isr(&mut self) -> usize {
        let mut pumped = 0;
        while let Some(ev) = self.held.take().or_else(|| self.isr.pop()) {
            let (to, event) = match ev {
                IsrEvent::ByteReceived(byte) => {
                    (ServiceId::Receiver, Event::new(EventKind::ByteReceived, u16::from(byte)))
                }
                IsrEvent::TxComplete => (ServiceId::Transmitter, Event::of(EventKind::ByteSent)),
                IsrEvent::Tick => {
                    self.timers.tick(&mut self.queue);
                    pumped += 1;
                    continue;
                }
            };
            if self.queue.pending(to) >= QUEUE_DEPTH {
                self.held = Some(ev);
                break;
            }
            if self.queue.post(to, event).is_err() {
                self.board.emit(&FarmerEvent::QueueOverflow { service: to });
            }
            pumped += 1;
        }
        pumped
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn session(&self) -> &SessionMachine {
        &self.session
    }

    /// Telemetry bytes from the last peer report.
    pub fn telemetry(&self) -> &[u8; TELEMETRY_LEN] {
        self.comm.telemetry()
    }

    pub fn rx_stats(&self) -> RxStats {
        self.receiver.stats()
    }

    pub fn comm(&self) -> &CommService {
        &self.comm
    }

    pub fn transmitter(&self) -> &FrameTransmitter {
        &self.transmitter
    }

    pub fn timers(&self) -> &TimerService {
        &self.timers
    }

    /// Events dispatched since construction.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// True when no service has a pending event.
    pub fn is_idle(&self) -> bool {
        self.queue.is_idle()
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    // ── Internal ──────────────────────────────────────────────

    fn check_inputs(&mut self) {
        let now = self.timers.now();
        for checker in [&mut self.touch_edges, &mut self.nose_edges] {
            let target = checker.target();
            if checker.check(&mut self.board, &mut self.queue, now).is_err() {
                self.board.emit(&FarmerEvent::QueueOverflow { service: target });
            }
        }
    }

    /// Pop one event and hand it to its service's step function.
    fn dispatch_one(&mut self) -> bool {
        let Some((id, event)) = self.queue.next() else {
            return false;
        };
        self.steps += 1;

        let mut cx = Context::new(&mut self.queue, &mut self.timers);
        let result = match id {
            ServiceId::Receiver => self.receiver.run(event, &mut cx),
            ServiceId::Transmitter => self.transmitter.run(event, &mut cx, &mut self.board),
            ServiceId::Comm => self.comm.run(
                event,
                &mut cx,
                CommPorts {
                    rx_frame: self.receiver.frame(),
                    tx: &mut self.transmitter,
                    link: self.session.link_mut(),
                    board: &mut self.board,
                },
            ),
            ServiceId::Session => {
                self.session
                    .run(event, &mut cx, &mut self.board, self.comm.telemetry())
            }
            ServiceId::Touch => self.touch.run(event, &mut cx),
            ServiceId::Nose => self.nose.run(event, &mut cx),
        };

        if result.is_error() {
            warn!("farmer: {:?} rejected {:?} (param {:#06X})", id, event.kind, result.param);
            self.board.emit(&FarmerEvent::ServiceError {
                service: id,
                param: result.param,
            });
        }
        true
    }
}

/// Mix the free-running tick count with the low bits of a floating
/// analog input.
fn entropy_seed<B: Board>(board: &mut B) -> u64 {
    let ticks = u64::from(board.elapsed_ticks());
    let noise = u64::from(board.sample_analog(AnalogChannel::Noise));
    (ticks << 32) ^ (noise << 16) ^ ticks.rotate_left(17) ^ 0x9E37_79B9_7F4A_7C15
}
