//! Host simulation: an in-memory board and a scripted DOG peer.
//!
//! ```text
//!  Farmer ──write_byte──▶ SimBoard.outbound ──take_written──▶ SimDog
//!  Farmer ◀──read_byte─── SimBoard.rx_fifo ◀──clock()─── inbound ◀── SimDog
//! ```
//!
//! [`SimBoard::clock`] advances one hardware tick: it moves at most one
//! byte from the inbound wire into the UART receive register, which
//! approximates a 9600 baud link at the 976 Hz tick rate.

use std::collections::VecDeque;

use log::{debug, info};

use crate::app::events::FarmerEvent;
use crate::app::ports::{ClockPort, EventSink, IndicatorPort, SensorPort, SerialPort};
use crate::comm::cipher::{KeyStream, KEY_LEN};
use crate::comm::schema::{self, FieldId, PacketBuilder, PacketType, PacketView, TELEMETRY_LEN};
use crate::error::Error;
use crate::link::{encode_frame, frame_length, parse_frame, HEADER_LEN, MAX_FRAME_LEN, START_DELIMITER};
use crate::pins::{AnalogChannel, InputLine, OutputLine};

use super::log_sink::LogEventSink;

// ───────────────────────────────────────────────────────────────
// SimBoard
// ───────────────────────────────────────────────────────────────

/// In-memory board: loopback UART, scripted inputs, recorded outputs.
pub struct SimBoard {
    inbound: VecDeque<u8>,
    rx_fifo: VecDeque<u8>,
    outbound: Vec<u8>,
    tx_irq: bool,
    tx_shifting: bool,
    ticks: u32,

    analog: [u16; 3],
    touch_released: bool,
    nose_released: bool,
    paired_led: bool,
    peer_led: bool,

    sink: LogEventSink,
    events: Vec<FarmerEvent>,
}

impl SimBoard {
    pub fn new() -> Self {
        Self {
            inbound: VecDeque::new(),
            rx_fifo: VecDeque::new(),
            outbound: Vec::new(),
            tx_irq: false,
            tx_shifting: false,
            ticks: 0,
            analog: [0x0800, 0x0800, 0x0A5A],
            touch_released: true,
            nose_released: true,
            paired_led: false,
            peer_led: false,
            sink: LogEventSink::new(),
            events: Vec::new(),
        }
    }

    /// Advance one tick of hardware time.
    pub fn clock(&mut self) {
        self.ticks = self.ticks.wrapping_add(1);
        if let Some(byte) = self.inbound.pop_front() {
            self.rx_fifo.push_back(byte);
        }
    }

    /// Queue bytes on the wire towards the controller.
    pub fn inject(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes);
    }

    /// True while injected bytes are still in flight.
    pub fn wire_busy(&self) -> bool {
        !self.inbound.is_empty() || !self.rx_fifo.is_empty()
    }

    /// Everything the controller has written since the last call.
    pub fn take_written(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.outbound)
    }

    pub fn set_analog(&mut self, channel: AnalogChannel, value: u16) {
        self.analog[channel as usize] = value;
    }

    /// Press (`true`) or release the touch pad.
    pub fn press_touch(&mut self, pressed: bool) {
        self.touch_released = !pressed;
    }

    pub fn press_nose(&mut self, pressed: bool) {
        self.nose_released = !pressed;
    }

    pub fn paired_led(&self) -> bool {
        self.paired_led
    }

    pub fn peer_led(&self) -> bool {
        self.peer_led
    }

    /// Every event the runtime emitted, oldest first.
    pub fn events(&self) -> &[FarmerEvent] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }
}

impl Default for SimBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialPort for SimBoard {
    fn read_byte(&mut self) -> Option<u8> {
        self.rx_fifo.pop_front()
    }

    fn write_byte(&mut self, byte: u8) {
        self.outbound.push(byte);
        self.tx_shifting = true;
    }

    fn set_tx_interrupt(&mut self, enabled: bool) {
        self.tx_irq = enabled;
    }

    fn take_tx_complete(&mut self) -> bool {
        self.tx_irq && core::mem::take(&mut self.tx_shifting)
    }
}

impl SensorPort for SimBoard {
    fn sample_analog(&mut self, channel: AnalogChannel) -> u16 {
        self.analog[channel as usize]
    }

    fn read_digital(&mut self, line: InputLine) -> bool {
        match line {
            InputLine::Touch => self.touch_released,
            InputLine::Nose => self.nose_released,
        }
    }
}

impl IndicatorPort for SimBoard {
    fn write_digital(&mut self, line: OutputLine, on: bool) {
        match line {
            OutputLine::PairedIndicator => self.paired_led = on,
            OutputLine::PeerStatus => self.peer_led = on,
        }
    }
}

impl ClockPort for SimBoard {
    fn elapsed_ticks(&self) -> u32 {
        self.ticks
    }
}

impl EventSink for SimBoard {
    fn emit(&mut self, event: &FarmerEvent) {
        self.sink.emit(event);
        self.events.push(*event);
    }
}

// ───────────────────────────────────────────────────────────────
// SimDog
// ───────────────────────────────────────────────────────────────

/// One decrypted control packet as the DOG saw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlSample {
    pub packet_type: u8,
    pub accel_front_back: u8,
    pub accel_right_left: u8,
    pub controls: u8,
}

/// Scripted DOG peer.
///
/// Answers a pairing request carrying its tag with an ack, learns the
/// key from the key exchange, decrypts control packets and sends a
/// report every `report_every` controls.  Every frame it hears is
/// answered with a transmit result, as the local radio would.
pub struct SimDog {
    address: u16,
    dog_tag: u8,
    keys: KeyStream,
    paired: bool,
    pending: Vec<u8>,

    /// Telemetry carried by the next reports.
    pub telemetry: [u8; TELEMETRY_LEN],
    /// Send a report after this many controls (0 = never).
    pub report_every: u32,
    /// Ignore everything (simulates the DOG going out of range).
    pub silent: bool,
    /// Fail delivery of this many upcoming frames.
    pub drop_next: u8,

    controls_seen: u32,
    last_control: Option<ControlSample>,
    frames_heard: u32,
}

impl SimDog {
    pub fn new(address: u16, dog_tag: u8) -> Self {
        Self {
            address,
            dog_tag,
            keys: KeyStream::empty(),
            paired: false,
            pending: Vec::new(),
            telemetry: [0; TELEMETRY_LEN],
            report_every: 1,
            silent: false,
            drop_next: 0,
            controls_seen: 0,
            last_control: None,
            frames_heard: 0,
        }
    }

    /// Read what the controller wrote and answer it.  Returns the number
    /// of complete frames handled.
    pub fn exchange(&mut self, board: &mut SimBoard) -> Result<usize, Error> {
        self.pending.extend(board.take_written());
        let mut handled = 0;
        while let Some(frame) = self.next_frame() {
            handled += 1;
            match parse_frame(&frame) {
                Some(payload) => self.on_payload(payload, board)?,
                None => debug!("dog: bad frame {:02X?}", frame),
            }
        }
        Ok(handled)
    }

    /// Ask the controller to rewind its key stream, and rewind ours.
    pub fn send_reset(&mut self, board: &mut SimBoard) -> Result<(), Error> {
        self.keys.reset_index();
        self.reply(board, &schema::RESET_NOTICE)
    }

    /// Send a report now.
    pub fn send_report(&mut self, board: &mut SimBoard) -> Result<(), Error> {
        let mut b = PacketBuilder::new(&schema::REPORT);
        b.set_u16(FieldId::Address, self.address)?
            .set(FieldId::Telemetry, &self.telemetry)?;
        inject(board, &b.finish(None)?)
    }

    /// Announce a radio restart.
    pub fn send_modem_status(&mut self, board: &mut SimBoard, status: u8) -> Result<(), Error> {
        let mut b = PacketBuilder::new(&schema::MODEM_STATUS);
        b.set_u8(FieldId::ModemStatus, status)?;
        inject(board, &b.finish(None)?)
    }

    pub fn is_paired(&self) -> bool {
        self.paired
    }

    pub fn keys(&self) -> &KeyStream {
        &self.keys
    }

    pub fn controls_seen(&self) -> u32 {
        self.controls_seen
    }

    pub fn last_control(&self) -> Option<ControlSample> {
        self.last_control
    }

    pub fn frames_heard(&self) -> u32 {
        self.frames_heard
    }

    // ── Internal ──────────────────────────────────────────────

    /// Cut the next complete frame off the outbound byte stream.
    fn next_frame(&mut self) -> Option<Vec<u8>> {
        let start = self.pending.iter().position(|&b| b == START_DELIMITER)?;
        self.pending.drain(..start);
        if self.pending.len() < HEADER_LEN {
            return None;
        }
        let total = HEADER_LEN + frame_length(self.pending[1], self.pending[2]) + 1;
        if total > MAX_FRAME_LEN {
            self.pending.remove(0);
            return self.next_frame();
        }
        if self.pending.len() < total {
            return None;
        }
        Some(self.pending.drain(..total).collect())
    }

    fn on_payload(&mut self, payload: &[u8], board: &mut SimBoard) -> Result<(), Error> {
        if self.silent {
            return Ok(());
        }
        self.frames_heard += 1;

        // Outbound frames carry their frame id right after the API byte.
        let frame_id = payload.get(1).copied().unwrap_or(schema::FRAME_ID);
        if self.drop_next > 0 {
            self.drop_next -= 1;
            return self.tx_status(board, frame_id, 0x01);
        }
        self.tx_status(board, frame_id, 0x00)?;

        if payload.len() == schema::CONTROL.length {
            return self.on_control(payload, board);
        }

        let Ok(view) = PacketView::parse(payload) else {
            debug!("dog: unparsable payload {:02X?}", payload);
            return Ok(());
        };
        match view.layout().packet_type {
            Some(PacketType::PairRequest) => {
                if view.u8(FieldId::DogTag) == Some(self.dog_tag) {
                    info!("dog: pairing request for tag {}, acking", self.dog_tag);
                    self.reply(board, &schema::ACK)?;
                }
            }
            Some(PacketType::KeyExchange) if view.u16(FieldId::Address) == Some(self.address) => {
                if let Some(key) = view.field(FieldId::Key).and_then(|k| <[u8; KEY_LEN]>::try_from(k).ok()) {
                    self.keys = KeyStream::from_key(key);
                    self.paired = true;
                    self.controls_seen = 0;
                    info!("dog: key received, paired");
                }
            }
            Some(PacketType::ResetEncryption) => {
                debug!("dog: peer rewound the key stream");
                self.keys.reset_index();
            }
            other => debug!("dog: ignoring {:?}", other),
        }
        Ok(())
    }

    fn on_control(&mut self, payload: &[u8], board: &mut SimBoard) -> Result<(), Error> {
        if !self.paired {
            return Ok(());
        }
        let mut bytes = [0u8; 9];
        bytes.copy_from_slice(&payload[..9]);
        schema::decode_in_place(&schema::CONTROL, &mut bytes, &mut self.keys)?;
        let view = PacketView::with_layout(&schema::CONTROL, &bytes)?;
        let sample = ControlSample {
            packet_type: view.u8(FieldId::PacketType).unwrap_or(0xFF),
            accel_front_back: view.u8(FieldId::AccelFrontBack).unwrap_or(0),
            accel_right_left: view.u8(FieldId::AccelRightLeft).unwrap_or(0),
            controls: view.u8(FieldId::Controls).unwrap_or(0),
        };
        debug!("dog: control {:?}", sample);
        self.last_control = Some(sample);
        self.controls_seen += 1;

        if self.report_every > 0 && self.controls_seen % self.report_every == 0 {
            self.send_report(board)?;
        }
        Ok(())
    }

    fn reply(&mut self, board: &mut SimBoard, layout: &'static schema::PacketLayout) -> Result<(), Error> {
        let mut b = PacketBuilder::new(layout);
        b.set_u16(FieldId::Address, self.address)?;
        inject(board, &b.finish(None)?)
    }

    fn tx_status(&mut self, board: &mut SimBoard, frame_id: u8, status: u8) -> Result<(), Error> {
        let mut b = PacketBuilder::new(&schema::TX_STATUS);
        b.set_u8(FieldId::FrameId, frame_id)?
            .set_u8(FieldId::DeliveryStatus, status)?;
        inject(board, &b.finish(None)?)
    }
}

fn inject(board: &mut SimBoard, payload: &[u8]) -> Result<(), Error> {
    let mut frame = [0u8; MAX_FRAME_LEN];
    let len = encode_frame(payload, &mut frame)?;
    board.inject(&frame[..len]);
    Ok(())
}
