//! FARMER host simulation — main entry point.
//!
//! Runs the full controller against an in-memory board and a scripted
//! DOG, tick by tick, as fast as the host allows.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  SimBoard (every port)          SimDog (peer on the wire)    │
//! │                                                              │
//! │  ─────────────── Port Trait Boundary ───────────────         │
//! │                                                              │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │  Farmer: Dispatcher · Timers · Rx · Tx · Comm ·        │  │
//! │  │          Session · Touch · Nose                        │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `farmer-sim [seconds]`.  `FARMER_CONFIG` names an optional
//! JSON configuration file; `RUST_LOG` sets the log level.
#![deny(unused_must_use)]

use anyhow::{Context, Result};
use log::{info, warn};

use farmer::adapters::sim::{SimBoard, SimDog};
use farmer::config::{FarmerConfig, ONE_SEC_TICKS};
use farmer::events::tick_isr;
use farmer::Farmer;

const DOG_ADDRESS: u16 = 0x2085;
const DEFAULT_SECONDS: u32 = 14;

// ── Script ────────────────────────────────────────────────────

/// One scripted stimulus, at a whole-tick offset from start.
#[derive(Debug, Clone, Copy)]
enum Step {
    TouchDown,
    TouchUp,
    NoseDown,
    NoseUp,
    DogReset,
    DogSilent,
}

fn script() -> [(u32, Step); 6] {
    let s = ONE_SEC_TICKS;
    [
        (s, Step::TouchDown),
        (s + s / 4, Step::TouchUp),
        (4 * s, Step::NoseDown),
        (4 * s + s / 4, Step::NoseUp),
        (6 * s, Step::DogReset),
        (7 * s, Step::DogSilent),
    ]
}

fn load_config() -> Result<FarmerConfig> {
    let config = match std::env::var("FARMER_CONFIG") {
        Ok(path) => {
            let text = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
            let config: FarmerConfig =
                serde_json::from_str(&text).with_context(|| format!("parsing {path}"))?;
            info!("Config loaded from {}", path);
            config
        }
        Err(_) => FarmerConfig::default(),
    };
    config.validate().context("invalid configuration")?;
    Ok(config)
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("╔══════════════════════════════════════╗");
    info!("║  FARMER sim v{}                   ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let seconds = match std::env::args().nth(1) {
        Some(arg) => arg.parse::<u32>().with_context(|| format!("bad duration {arg:?}"))?,
        None => DEFAULT_SECONDS,
    };
    let config = load_config()?;

    let mut farmer = Farmer::new(&config, SimBoard::new());
    let mut dog = SimDog::new(DOG_ADDRESS, config.dog_tag);
    dog.telemetry[0] = 0x01;
    dog.report_every = 2;

    farmer.start().context("start failed")?;
    farmer.run_until_idle(64);

    let script = script();
    let mut next = 0;
    for now in 1..=seconds * ONE_SEC_TICKS {
        while next < script.len() && script[next].0 == now {
            apply(script[next].1, &mut farmer, &mut dog)?;
            next += 1;
        }

        // One hardware tick: wire, tick vector, UART vector, foreground.
        farmer.board_mut().clock();
        if !tick_isr() {
            warn!("tick lost, interrupt queue full");
        }
        farmer.service_uart();
        farmer.run_until_idle(256);
        dog.exchange(farmer.board_mut()).context("simulated peer failed")?;
    }

    let stats = farmer.rx_stats();
    info!(
        "Done: state={:?} steps={} frames_rx={} checksum_errors={} dog_controls={}",
        farmer.state(),
        farmer.steps(),
        stats.frames,
        stats.checksum_errors,
        dog.controls_seen(),
    );
    Ok(())
}

fn apply(step: Step, farmer: &mut Farmer<'static, SimBoard>, dog: &mut SimDog) -> Result<()> {
    info!("SCRIPT | {:?}", step);
    let board = farmer.board_mut();
    match step {
        Step::TouchDown => board.press_touch(true),
        Step::TouchUp => board.press_touch(false),
        Step::NoseDown => board.press_nose(true),
        Step::NoseUp => board.press_nose(false),
        Step::DogReset => dog.send_reset(board).context("reset failed")?,
        Step::DogSilent => dog.silent = true,
    }
    Ok(())
}
