//! Outbound application events.
//!
//! The [`Farmer`](super::service::Farmer) runtime and its services emit
//! these through the [`EventSink`](super::ports::EventSink) port.
//! Adapters on the other side decide what to do with them.

use crate::comm::schema::PacketType;
use crate::dispatch::ServiceId;
use crate::fsm::SessionState;

/// Structured events emitted by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FarmerEvent {
    /// The runtime has started (carries the configured DOG tag).
    Started { dog_tag: u8 },

    /// The session machine moved between states.
    StateChanged { from: SessionState, to: SessionState },

    /// A frame was staged for transmission.
    PacketSent { packet_type: PacketType, len: usize },

    /// A data packet from a peer was decoded.
    PacketReceived { packet_type: PacketType, source: u16 },

    /// The radio reported a failed delivery.
    TransmitFailed { status: u8, attempt: u8 },

    /// Retries exhausted; the frame was dropped.
    TransmitGaveUp { attempts: u8 },

    /// The radio reported a (re)start.
    RadioStatus { status: u8 },

    /// A service step rejected an event.
    ServiceError { service: ServiceId, param: u16 },

    /// An event could not be queued.
    QueueOverflow { service: ServiceId },
}
