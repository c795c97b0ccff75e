//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the `log` facade (serial console on a target, `env_logger` on the
//! host).  A radio-telemetry adapter would implement the same trait.

use log::{info, warn};

use crate::app::events::FarmerEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`FarmerEvent`] as one tagged line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &FarmerEvent) {
        match event {
            FarmerEvent::Started { dog_tag } => {
                info!("START | dog_tag={}", dog_tag);
            }
            FarmerEvent::StateChanged { from, to } => {
                info!("STATE | {:?} -> {:?}", from, to);
            }
            FarmerEvent::PacketSent { packet_type, len } => {
                info!("TX | {:?} | {} bytes", packet_type, len);
            }
            FarmerEvent::PacketReceived {
                packet_type,
                source,
            } => {
                info!("RX | {:?} | from {:#06X}", packet_type, source);
            }
            FarmerEvent::TransmitFailed { status, attempt } => {
                warn!("LINK | delivery failed | status={:#04X} attempt={}", status, attempt);
            }
            FarmerEvent::TransmitGaveUp { attempts } => {
                warn!("LINK | frame dropped after {} retries", attempts);
            }
            FarmerEvent::RadioStatus { status } => {
                info!("LINK | radio status {:#04X}", status);
            }
            FarmerEvent::ServiceError { service, param } => {
                warn!("ERROR | {:?} | param={:#06X}", service, param);
            }
            FarmerEvent::QueueOverflow { service } => {
                warn!("ERROR | {:?} queue full", service);
            }
        }
    }
}
