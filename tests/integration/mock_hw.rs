//! Mock hardware rig for integration tests.
//!
//! Wraps a [`Farmer`] running on a [`SimBoard`], with an optional
//! [`SimDog`] on the other end of the wire, and advances the whole
//! system one hardware tick at a time: wire, tick vector, UART vector,
//! foreground loop, peer.

use farmer::adapters::sim::{SimBoard, SimDog};
use farmer::app::events::FarmerEvent;
use farmer::config::FarmerConfig;
use farmer::events::{IsrEvent, IsrQueue};
use farmer::link::{encode_frame, MAX_FRAME_LEN};
use farmer::Farmer;

pub const DOG_ADDRESS: u16 = 0x2085;

// ── Rig ───────────────────────────────────────────────────────

pub struct Rig {
    pub farmer: Farmer<'static, SimBoard>,
    pub dog: Option<SimDog>,
    isr: &'static IsrQueue,
    pub now: u32,
}

#[allow(dead_code)]
impl Rig {
    /// A started controller with no peer attached.
    pub fn new(config: FarmerConfig) -> Self {
        // One queue per rig so tests can run in parallel.
        let isr: &'static IsrQueue = Box::leak(Box::new(IsrQueue::new()));
        let mut farmer = Farmer::with_queue(&config, SimBoard::new(), isr);
        farmer.start().unwrap();
        farmer.run_until_idle(64);
        Self {
            farmer,
            dog: None,
            isr,
            now: 0,
        }
    }

    /// A started controller with a DOG (default tag) attached.
    pub fn with_dog(config: FarmerConfig) -> Self {
        let tag = config.dog_tag;
        let mut rig = Self::new(config);
        rig.dog = Some(SimDog::new(DOG_ADDRESS, tag));
        rig
    }

    /// A rig that has completed pairing with its DOG.
    pub fn paired() -> Self {
        let mut rig = Self::with_dog(FarmerConfig::default());
        rig.farmer
            .handle_command(farmer::app::commands::FarmerCommand::Pair)
            .unwrap();
        assert!(rig.until(|r| r.dog().is_paired(), 400), "pairing never completed");
        rig
    }

    /// Advance `n` hardware ticks.
    pub fn tick(&mut self, n: u32) {
        for _ in 0..n {
            self.now += 1;
            self.farmer.board_mut().clock();
            assert!(self.isr.push(IsrEvent::Tick));
            self.farmer.service_uart();
            self.farmer.run_until_idle(512);
            if let Some(dog) = self.dog.as_mut() {
                dog.exchange(self.farmer.board_mut()).unwrap();
            }
        }
    }

    /// Tick until `done` holds, at most `max` ticks.  Returns whether it held.
    pub fn until(&mut self, mut done: impl FnMut(&Self) -> bool, max: u32) -> bool {
        for _ in 0..max {
            if done(self) {
                return true;
            }
            self.tick(1);
        }
        done(self)
    }

    pub fn dog(&self) -> &SimDog {
        self.dog.as_ref().expect("rig has no dog")
    }

    pub fn dog_mut(&mut self) -> &mut SimDog {
        self.dog.as_mut().expect("rig has no dog")
    }

    pub fn board(&self) -> &SimBoard {
        self.farmer.board()
    }

    pub fn board_mut(&mut self) -> &mut SimBoard {
        self.farmer.board_mut()
    }

    /// Put raw bytes on the wire towards the controller.
    pub fn inject(&mut self, bytes: &[u8]) {
        self.farmer.board_mut().inject(bytes);
    }

    /// Tick until every injected byte has been consumed and handled.
    pub fn drain_wire(&mut self) {
        let mut guard = 0;
        while self.board().wire_busy() && guard < 1000 {
            self.tick(1);
            guard += 1;
        }
        self.tick(1);
    }

    /// Number of emitted events matching `pred`.
    pub fn count_events(&self, pred: impl Fn(&FarmerEvent) -> bool) -> usize {
        self.board().events().iter().filter(|e| pred(e)).count()
    }
}

// ── Frame helpers ─────────────────────────────────────────────

/// Wrap `payload` in a complete wire frame.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = [0u8; MAX_FRAME_LEN];
    let len = encode_frame(payload, &mut out).unwrap();
    out[..len].to_vec()
}

/// Inbound data frame `[0x81][src:2][rssi][options][type][data..]`.
pub fn inbound(source: u16, packet_type: u8, data: &[u8]) -> Vec<u8> {
    let [hi, lo] = source.to_be_bytes();
    let mut payload = vec![0x81, hi, lo, 0x28, 0x00, packet_type];
    payload.extend_from_slice(data);
    frame(&payload)
}
