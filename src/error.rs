//! Unified error types for the FARMER firmware.
//!
//! A single `Error` enum that every subsystem can convert into, keeping
//! the foreground loop's error handling uniform.  All variants are `Copy`
//! so they can be passed through service steps without allocation.
//!
//! Framing errors never show up here: the frame receiver recovers from
//! them locally and only counts them (see
//! [`RxStats`](crate::link::receiver::RxStats)).

use core::fmt;

use crate::comm::schema::{FieldId, PacketType};
use crate::dispatch::ServiceId;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An event could not be queued.
    Post(PostError),
    /// A frame could not be staged for transmission.
    Link(LinkError),
    /// A packet could not be built.
    Codec(CodecError),
    /// Configuration is invalid.
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Post(e) => write!(f, "post: {e}"),
            Self::Link(e) => write!(f, "link: {e}"),
            Self::Codec(e) => write!(f, "codec: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl core::error::Error for Error {}

// ---------------------------------------------------------------------------
// Event posting
// ---------------------------------------------------------------------------

/// Posting failed; the event was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostError {
    /// The target service's queue is at capacity.
    QueueFull(ServiceId),
}

impl fmt::Display for PostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull(id) => write!(f, "{id:?} queue full"),
        }
    }
}

impl From<PostError> for Error {
    fn from(e: PostError) -> Self {
        Self::Post(e)
    }
}

// ---------------------------------------------------------------------------
// Framing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// Payload is empty.
    EmptyPayload,
    /// Payload exceeds the maximum frame payload.
    TooLong(usize),
    /// A new frame was offered while one is still on the wire.
    TransmitterBusy,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPayload => write!(f, "empty payload"),
            Self::TooLong(n) => write!(f, "payload of {n} bytes too long"),
            Self::TransmitterBusy => write!(f, "transmitter busy"),
        }
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

// ---------------------------------------------------------------------------
// Packet codec
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// The packet type is inbound-only and has no outbound layout.
    NotBuildable(PacketType),
    /// The packet needs session material (key, peer) but no session exists.
    NotPaired(PacketType),
    /// A field value does not match its declared width.
    FieldWidth { offset: usize, expected: usize, got: usize },
    /// The layout has no such field.
    NoSuchField(FieldId),
    /// An inbound payload does not match any known layout.
    Malformed { api: u8, len: usize },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotBuildable(t) => write!(f, "{t:?} cannot be sent"),
            Self::NotPaired(t) => write!(f, "{t:?} requires a paired session"),
            Self::FieldWidth {
                offset,
                expected,
                got,
            } => write!(
                f,
                "field at offset {offset} expects {expected} bytes, got {got}"
            ),
            Self::NoSuchField(id) => write!(f, "layout has no {id:?} field"),
            Self::Malformed { api, len } => {
                write!(f, "unrecognised {len} byte payload (api {api:#04X})")
            }
        }
    }
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A config field failed range validation.
    /// The `&'static str` names the field and the rule.
    ValidationFailed(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
        }
    }
}

impl core::error::Error for ConfigError {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
