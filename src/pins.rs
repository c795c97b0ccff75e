//! I/O line assignments for the FARMER board.
//!
//! Single source of truth for which logical line is which.  Ports take
//! these enums rather than raw pin numbers; adapters map them onto
//! concrete hardware.

// ---------------------------------------------------------------------------
// Analog inputs (12-bit ADC)
// ---------------------------------------------------------------------------

/// Analog channels sampled by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalogChannel {
    /// Accelerometer, front/back axis.
    AccelFrontBack,
    /// Accelerometer, right/left axis.
    AccelRightLeft,
    /// Floating input used as an entropy source for key seeding.
    Noise,
}

/// Full-scale ADC reading.
pub const ADC_MAX: u16 = 0x0FFF;

/// Right shift that reduces a 12-bit sample to one wire byte.
pub const ADC_TO_BYTE_SHIFT: u32 = 4;

// ---------------------------------------------------------------------------
// Digital inputs
// ---------------------------------------------------------------------------

/// Digital input lines.  HIGH = released / not touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputLine {
    /// Capacitive touch pad (pair request).
    Touch,
    /// Nose button (peripheral toggle).
    Nose,
}

// ---------------------------------------------------------------------------
// Digital outputs
// ---------------------------------------------------------------------------

/// Digital output lines.  `true` = lit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputLine {
    /// Lit while a session is paired.
    PairedIndicator,
    /// Mirrors bit 0 of the peer's telemetry.
    PeerStatus,
}

// ---------------------------------------------------------------------------
// Control byte bits
// ---------------------------------------------------------------------------

/// Peripheral enable, toggled by the nose button while paired.
pub const CONTROL_PERIPHERAL_BIT: u8 = 0x01;
