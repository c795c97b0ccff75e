//! System configuration parameters
//!
//! All tunable parameters for the FARMER controller.  Timer lengths are
//! in scheduler ticks (one tick ≈ 1.024 ms, so 976 ticks ≈ one second).

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Ticks in (roughly) one second of the hardware tick.
pub const ONE_SEC_TICKS: u32 = 976;

/// Core controller configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FarmerConfig {
    // --- Session ---
    /// Liveness window: unpair if nothing arrives from the peer for this long.
    pub lost_comm_ticks: u32,
    /// Cadence of outbound control packets while paired.
    pub inter_message_ticks: u32,
    /// Optional hard cap on a paired session ("game timer").
    pub session_ticks: Option<u32>,
    /// Tag byte identifying which DOG this FARMER asks to pair with.
    pub dog_tag: u8,
    /// Destination used for pairing requests before a peer is known.
    pub pairing_address: u16,

    // --- Link ---
    /// Inter-byte timeout for the frame receiver.
    pub receive_timeout_ticks: u32,
    /// Resend attempts after a transmit-result failure.
    pub max_tx_retries: u8,
    /// First retry delay; doubled on every further attempt.
    pub tx_retry_base_ticks: u32,

    // --- Inputs ---
    /// Lockout after any touch-sensor edge.
    pub touch_debounce_ticks: u32,
    /// Lockout after any nose-button edge.
    pub nose_debounce_ticks: u32,
}

impl Default for FarmerConfig {
    fn default() -> Self {
        Self {
            // Session
            lost_comm_ticks: 3 * ONE_SEC_TICKS,
            inter_message_ticks: 300,
            session_ticks: None,
            dog_tag: 0x01,
            pairing_address: 0xFFFF, // broadcast

            // Link
            receive_timeout_ticks: 10, // ~10 char times at 9600 baud
            max_tx_retries: 3,
            tx_retry_base_ticks: 50,

            // Inputs
            touch_debounce_ticks: ONE_SEC_TICKS / 8,
            nose_debounce_ticks: ONE_SEC_TICKS / 4,
        }
    }
}

impl FarmerConfig {
    /// Reject values that would stall or wedge the session machine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lost_comm_ticks == 0
            || self.inter_message_ticks == 0
            || self.receive_timeout_ticks == 0
            || self.touch_debounce_ticks == 0
            || self.nose_debounce_ticks == 0
        {
            return Err(ConfigError::ValidationFailed("timer lengths must be non-zero"));
        }
        if self.lost_comm_ticks <= self.inter_message_ticks {
            return Err(ConfigError::ValidationFailed(
                "lost_comm_ticks must exceed inter_message_ticks",
            ));
        }
        if self.session_ticks == Some(0) {
            return Err(ConfigError::ValidationFailed("session_ticks must be non-zero"));
        }
        if self.max_tx_retries > 8 {
            return Err(ConfigError::ValidationFailed("max_tx_retries must be <= 8"));
        }
        if self.max_tx_retries > 0 && self.tx_retry_base_ticks == 0 {
            return Err(ConfigError::ValidationFailed(
                "tx_retry_base_ticks must be non-zero when retries are enabled",
            ));
        }
        Ok(())
    }
}
