//! Serial framing for the radio link.
//!
//! Wire format:
//! ```text
//! ┌──────┬─────────┬─────────┬──────────────────────┬──────────┐
//! │ 0x7E │ Len MSB │ Len LSB │ payload (N bytes)    │ checksum │
//! └──────┴─────────┴─────────┴──────────────────────┴──────────┘
//!   N = MSB + LSB           checksum = 0xFF - (Σ payload mod 256)
//! ```
//!
//! The two length bytes are *added*, not combined big-endian.  On this
//! link the MSB is always zero, so the two readings agree; the addition is
//! kept for bit compatibility with deployed peers.
//!
//! [`receiver`] deframes the interrupt byte stream one event at a time;
//! [`transmitter`] drains a staged frame one byte per transmit-complete.

pub mod receiver;
pub mod transmitter;

use crate::error::LinkError;

/// Frame start delimiter.
pub const START_DELIMITER: u8 = 0x7E;

/// Delimiter plus two length bytes.
pub const HEADER_LEN: usize = 3;

/// Largest payload either side will accept (key exchange is 38).
pub const MAX_PAYLOAD_LEN: usize = 40;

/// Largest complete frame: header, payload, checksum.
pub const MAX_FRAME_LEN: usize = HEADER_LEN + MAX_PAYLOAD_LEN + 1;

/// `0xFF - (sum of payload bytes mod 256)`.
pub fn checksum(payload: &[u8]) -> u8 {
    0xFF - payload.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Payload length announced by the two header length bytes.
pub const fn frame_length(msb: u8, lsb: u8) -> usize {
    msb as usize + lsb as usize
}

/// Wrap `payload` in a complete frame.
///
/// Writes `[0x7E][0x00][N][payload][checksum]` into `out` and returns the
/// number of bytes written.
pub fn encode_frame(payload: &[u8], out: &mut [u8; MAX_FRAME_LEN]) -> Result<usize, LinkError> {
    if payload.is_empty() {
        return Err(LinkError::EmptyPayload);
    }
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(LinkError::TooLong(payload.len()));
    }

    let n = payload.len();
    out[0] = START_DELIMITER;
    out[1] = 0x00;
    out[2] = n as u8;
    out[HEADER_LEN..HEADER_LEN + n].copy_from_slice(payload);
    out[HEADER_LEN + n] = checksum(payload);

    Ok(HEADER_LEN + n + 1)
}

/// Validate one complete frame held in memory and return its payload.
///
/// This is the offline counterpart of [`receiver::FrameReceiver`], used by
/// peers and tools that already hold a whole frame.
pub fn parse_frame(frame: &[u8]) -> Option<&[u8]> {
    let (&start, rest) = frame.split_first()?;
    if start != START_DELIMITER || rest.len() < 2 {
        return None;
    }
    let n = frame_length(rest[0], rest[1]);
    if n == 0 || n > MAX_PAYLOAD_LEN || rest.len() != 2 + n + 1 {
        return None;
    }
    let payload = &rest[2..2 + n];
    (rest[2 + n] == checksum(payload)).then_some(payload)
}
