//! Packet codec service.
//!
//! Sits between the byte-level link services and the session machine:
//!
//! ```text
//!  FrameReceiver ──PacketReceived(N)──▶ Comm ──AckReceived / ReportReceived /──▶ Session
//!                                        │      ResetEncryptionReceived
//!  Session ──SendPacket(type)──────────▶ │
//!                                        └──load + StartTransmit──▶ FrameTransmitter
//! ```
//!
//! Outbound, it builds the payload from the [`schema`] tables, frames it,
//! stages it in the transmitter and keeps a copy for transmit-result
//! retries.  Each fresh frame carries its own frame id, and a transmit
//! result only counts against the frame whose id it echoes.  Send requests
//! are queued in arrival order and leave one at a time as the transmitter
//! frees up.
//!
//! Inbound, it dispatches on the API identifier and then the packet type.
//! Unknown identifiers and types are dropped with a debug record.

pub mod cipher;
pub mod schema;

use heapless::Deque;
use log::{debug, info, warn};

use crate::app::events::FarmerEvent;
use crate::app::ports::{EventSink, SensorPort};
use crate::config::FarmerConfig;
use crate::dispatch::timers::TimerId;
use crate::dispatch::{Context, Event, EventKind, ServiceId};
use crate::error::{CodecError, Error};
use crate::input::sensors::ControlSnapshot;
use crate::link::transmitter::FrameTransmitter;
use crate::link::{encode_frame, MAX_FRAME_LEN};
use crate::pins::CONTROL_PERIPHERAL_BIT;
use cipher::KeyStream;
use schema::{ApiId, FieldId, PacketBuilder, PacketType, PacketView, Payload, TELEMETRY_LEN};

/// Send requests parked while a frame is on the wire.
pub const DEFERRED_DEPTH: usize = 4;

/// Frame ids run 1..=255; id 0 would suppress the transmit result.
fn following_frame_id(id: u8) -> u8 {
    id.checked_add(1).unwrap_or(1)
}

/// Session material the codec needs to address and encrypt packets.
/// Owned by the session machine, lent to the codec per step.
#[derive(Debug, Clone, Default)]
pub struct SessionLink {
    pub paired: bool,
    pub peer_address: u16,
    pub keys: KeyStream,
    /// Peripheral bit of the controls byte.
    pub peripheral_on: bool,
}

impl SessionLink {
    /// Forget the peer and the key.
    pub fn reset(&mut self) {
        self.paired = false;
        self.peer_address = 0;
        self.keys.clear();
        self.peripheral_on = false;
    }
}

/// Everything outside the codec that one step may touch.
pub struct CommPorts<'a, B: ?Sized> {
    /// Payload of the last accepted frame.
    pub rx_frame: &'a [u8],
    pub tx: &'a mut FrameTransmitter,
    pub link: &'a mut SessionLink,
    pub board: &'a mut B,
}

#[derive(Clone, Copy)]
struct Frame {
    /// Frame id echoed back by the radio's transmit result.
    id: u8,
    bytes: [u8; MAX_FRAME_LEN],
    len: usize,
}

impl Frame {
    fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

pub struct CommService {
    dog_tag: u8,
    pairing_address: u16,
    max_retries: u8,
    retry_base_ticks: u32,

    last_frame: Option<Frame>,
    retry_frame: Option<Frame>,
    retry_pending: bool,
    attempt: u8,
    deferred: Deque<PacketType, DEFERRED_DEPTH>,
    next_frame_id: u8,
    telemetry: [u8; TELEMETRY_LEN],
}

impl CommService {
    pub fn new(config: &FarmerConfig) -> Self {
        Self {
            dog_tag: config.dog_tag,
            pairing_address: config.pairing_address,
            max_retries: config.max_tx_retries,
            retry_base_ticks: config.tx_retry_base_ticks,
            last_frame: None,
            retry_frame: None,
            retry_pending: false,
            attempt: 0,
            deferred: Deque::new(),
            next_frame_id: 1,
            telemetry: [0; TELEMETRY_LEN],
        }
    }

    /// Service step.
    pub fn run<B>(&mut self, event: Event, cx: &mut Context<'_>, mut io: CommPorts<'_, B>) -> Event
    where
        B: SensorPort + EventSink + ?Sized,
    {
        match event.kind {
            EventKind::Init => {
                self.deferred.clear();
                self.retry_frame = None;
                self.retry_pending = false;
                self.attempt = 0;
                Event::NONE
            }
            EventKind::SendPacket => match PacketType::from_u8(event.param as u8) {
                Some(ty) => self.request(ty, cx, &mut io),
                None => {
                    debug!("comm: send of unknown packet type {:#04X} ignored", event.param);
                    Event::NONE
                }
            },
            EventKind::PacketReceived => self.interpret(event.param as usize, cx, io),
            EventKind::TransmitComplete => self.recall(cx, &mut io),
            EventKind::Timeout if event.is_timeout(TimerId::TxRetry) => {
                self.retry_pending = true;
                self.recall(cx, &mut io)
            }
            _ => Event::NONE,
        }
    }

    // ── Outbound ──────────────────────────────────────────────

    /// Every request joins the back of the deferral queue, so nothing
    /// overtakes a parked request; the queue is then drained if the
    /// transmitter is free.
    fn request<B>(&mut self, ty: PacketType, cx: &mut Context<'_>, io: &mut CommPorts<'_, B>) -> Event
    where
        B: SensorPort + EventSink + ?Sized,
    {
        if self.deferred.push_back(ty).is_err() {
            warn!("comm: deferral queue full, {:?} dropped", ty);
            self.recall(cx, io);
            return Event::error(ty as u16);
        }
        if io.tx.is_busy() {
            debug!("comm: transmitter busy, {:?} deferred", ty);
            return Event::NONE;
        }
        self.recall(cx, io)
    }

    /// Put the next outbound frame on the wire: a pending retry first,
    /// then parked requests in arrival order.  Does nothing while the
    /// transmitter holds a frame.
    fn recall<B>(&mut self, cx: &mut Context<'_>, io: &mut CommPorts<'_, B>) -> Event
    where
        B: SensorPort + EventSink + ?Sized,
    {
        if io.tx.is_busy() {
            return Event::NONE;
        }
        if self.retry_pending {
            self.retry_pending = false;
            if self.retry_frame.is_some() {
                return self.resend(cx, io.tx);
            }
        }
        let mut result = Event::NONE;
        while let Some(ty) = self.deferred.pop_front() {
            result = self.send(ty, cx, io);
            if !result.is_error() {
                break;
            }
        }
        result
    }

    fn send<B>(&mut self, ty: PacketType, cx: &mut Context<'_>, io: &mut CommPorts<'_, B>) -> Event
    where
        B: SensorPort + EventSink + ?Sized,
    {
        // The key stream only moves for a frame that actually leaves.
        let saved = io.link.keys.clone();
        let frame_id = self.next_frame_id;
        let payload = match self.build(ty, frame_id, io.link, &mut *io.board) {
            Ok(p) => p,
            Err(e) => {
                io.link.keys = saved;
                warn!("comm: cannot build {:?}: {}", ty, e);
                return Event::error(ty as u16);
            }
        };
        match self.stage(frame_id, &payload, cx, io.tx) {
            Ok(len) => {
                self.next_frame_id = following_frame_id(frame_id);
                io.board.emit(&FarmerEvent::PacketSent {
                    packet_type: ty,
                    len,
                });
                Event::NONE
            }
            Err(e) => {
                io.link.keys = saved;
                warn!("comm: cannot stage {:?}: {}", ty, e);
                Event::error(ty as u16)
            }
        }
    }

    /// Assemble the payload for `ty` from the current session material.
    pub fn build<S: SensorPort + ?Sized>(
        &self,
        ty: PacketType,
        frame_id: u8,
        link: &mut SessionLink,
        sensors: &mut S,
    ) -> Result<Payload, CodecError> {
        let layout = schema::outbound(ty)?;
        let mut b = PacketBuilder::new(layout);
        b.set_u8(FieldId::FrameId, frame_id)?;
        match ty {
            PacketType::PairRequest => {
                b.set_u16(FieldId::Address, self.pairing_address)?
                    .set_u8(FieldId::DogTag, self.dog_tag)?;
                b.finish(None)
            }
            PacketType::KeyExchange => {
                if !link.paired {
                    return Err(CodecError::NotPaired(ty));
                }
                b.set_u16(FieldId::Address, link.peer_address)?
                    .set(FieldId::Key, link.keys.key())?;
                b.finish(None)
            }
            PacketType::Control => {
                if !link.paired {
                    return Err(CodecError::NotPaired(ty));
                }
                let snap = ControlSnapshot::sample(sensors);
                let controls = if link.peripheral_on { CONTROL_PERIPHERAL_BIT } else { 0 };
                b.set_u16(FieldId::Address, link.peer_address)?
                    .set_u8(FieldId::AccelFrontBack, snap.accel_front_back)?
                    .set_u8(FieldId::AccelRightLeft, snap.accel_right_left)?
                    .set_u8(FieldId::Controls, controls)?;
                b.finish(Some(&mut link.keys))
            }
            PacketType::ResetEncryption => {
                let dest = if link.paired { link.peer_address } else { self.pairing_address };
                b.set_u16(FieldId::Address, dest)?;
                let payload = b.finish(None)?;
                link.keys.reset_index();
                Ok(payload)
            }
            PacketType::Report | PacketType::Ack => Err(CodecError::NotBuildable(ty)),
        }
    }

    fn stage(&mut self, id: u8, payload: &[u8], cx: &mut Context<'_>, tx: &mut FrameTransmitter) -> Result<usize, Error> {
        let mut frame = Frame {
            id,
            bytes: [0; MAX_FRAME_LEN],
            len: 0,
        };
        frame.len = encode_frame(payload, &mut frame.bytes)?;
        self.transmit(frame, cx, tx)?;
        Ok(frame.len)
    }

    fn transmit(&mut self, frame: Frame, cx: &mut Context<'_>, tx: &mut FrameTransmitter) -> Result<(), Error> {
        tx.load(frame.as_slice())?;
        if let Err(e) = cx.post(
            ServiceId::Transmitter,
            Event::new(EventKind::StartTransmit, frame.len as u16),
        ) {
            tx.abort();
            return Err(e.into());
        }
        self.last_frame = Some(frame);
        Ok(())
    }

    fn resend(&mut self, cx: &mut Context<'_>, tx: &mut FrameTransmitter) -> Event {
        let Some(frame) = self.retry_frame else {
            return Event::NONE;
        };
        info!("comm: retry {} of {} (frame {})", self.attempt, self.max_retries, frame.id);
        match self.transmit(frame, cx, tx) {
            Ok(()) => Event::NONE,
            Err(e) => {
                warn!("comm: retry failed to stage: {}", e);
                Event::error(u16::from(self.attempt))
            }
        }
    }

    // ── Inbound ───────────────────────────────────────────────

    fn interpret<B>(&mut self, len: usize, cx: &mut Context<'_>, io: CommPorts<'_, B>) -> Event
    where
        B: SensorPort + EventSink + ?Sized,
    {
        let frame = io.rx_frame;
        if frame.len() != len {
            debug!("comm: stale packet notice ({} vs {} bytes)", len, frame.len());
            return Event::NONE;
        }
        let view = match PacketView::parse(frame) {
            Ok(v) => v,
            Err(e) => {
                debug!("comm: ignoring packet: {}", e);
                return Event::NONE;
            }
        };

        match view.layout().api {
            ApiId::Receive => self.on_data(&view, cx, io.board),
            ApiId::TxStatus => {
                let frame_id = view.u8(FieldId::FrameId).unwrap_or(0);
                let status = view.u8(FieldId::DeliveryStatus).unwrap_or(0xFF);
                self.on_tx_status(frame_id, status, cx, io.board);
                Event::NONE
            }
            ApiId::ModemStatus => {
                let status = view.u8(FieldId::ModemStatus).unwrap_or(0);
                info!("comm: radio status {:#04X}", status);
                io.board.emit(&FarmerEvent::RadioStatus { status });
                Event::NONE
            }
            ApiId::Transmit => {
                debug!("comm: ignoring echoed transmit request");
                Event::NONE
            }
        }
    }

    fn on_data<B>(&mut self, view: &PacketView<'_>, cx: &mut Context<'_>, board: &mut B) -> Event
    where
        B: EventSink + ?Sized,
    {
        let source = view.u16(FieldId::Address).unwrap_or(0);
        let Some(ty) = view.layout().packet_type else {
            return Event::NONE;
        };
        let kind = match ty {
            PacketType::Ack => EventKind::AckReceived,
            PacketType::Report => {
                if let Some(t) = view.field(FieldId::Telemetry) {
                    self.telemetry.copy_from_slice(t);
                }
                EventKind::ReportReceived
            }
            PacketType::ResetEncryption => EventKind::ResetEncryptionReceived,
            PacketType::PairRequest | PacketType::KeyExchange | PacketType::Control => {
                debug!("comm: ignoring inbound {:?} from {:#06X}", ty, source);
                return Event::NONE;
            }
        };
        debug!("comm: {:?} from {:#06X}", ty, source);
        board.emit(&FarmerEvent::PacketReceived {
            packet_type: ty,
            source,
        });
        match cx.post(ServiceId::Session, Event::new(kind, source)) {
            Ok(()) => Event::NONE,
            Err(_) => Event::error(ty as u16),
        }
    }

    /// The frame a transmit result with `frame_id` reports on: the frame
    /// being retried if there is one, otherwise the last frame staged.
    fn reported_frame(&self, frame_id: u8) -> Option<Frame> {
        self.retry_frame
            .or(self.last_frame)
            .filter(|f| f.id == frame_id)
    }

    fn on_tx_status<B>(&mut self, frame_id: u8, status: u8, cx: &mut Context<'_>, board: &mut B)
    where
        B: EventSink + ?Sized,
    {
        let Some(frame) = self.reported_frame(frame_id) else {
            debug!("comm: stale transmit result for frame {} ignored", frame_id);
            return;
        };

        if status == 0 {
            debug!("comm: frame {} delivered", frame_id);
            self.attempt = 0;
            self.retry_frame = None;
            return;
        }

        warn!("comm: frame {} failed, status {:#04X}", frame_id, status);
        board.emit(&FarmerEvent::TransmitFailed {
            status,
            attempt: self.attempt,
        });

        if self.attempt >= self.max_retries {
            warn!("comm: giving up after {} retries", self.attempt);
            board.emit(&FarmerEvent::TransmitGaveUp {
                attempts: self.attempt,
            });
            self.attempt = 0;
            self.retry_frame = None;
            self.retry_pending = false;
            return;
        }

        self.retry_frame = Some(frame);
        let delay = self.retry_base_ticks << self.attempt;
        self.attempt += 1;
        cx.arm(TimerId::TxRetry, delay);
    }

    /// Telemetry bytes from the most recent report.
    pub fn telemetry(&self) -> &[u8; TELEMETRY_LEN] {
        &self.telemetry
    }

    /// Send requests currently parked behind a busy transmitter.
    pub fn deferred(&self) -> usize {
        self.deferred.len()
    }

    /// Retries spent on the current failing frame.
    pub fn attempt(&self) -> u8 {
        self.attempt
    }

    /// Id the next freshly built frame will carry.
    pub fn next_frame_id(&self) -> u8 {
        self.next_frame_id
    }

    /// The last frame handed to the transmitter.
    pub fn last_frame(&self) -> Option<&[u8]> {
        self.last_frame.as_ref().map(Frame::as_slice)
    }
}
