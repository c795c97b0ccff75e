//! Accelerometer sampling for control packets.

use crate::app::ports::SensorPort;
use crate::pins::{AnalogChannel, ADC_MAX, ADC_TO_BYTE_SHIFT};

/// Reduce a 12-bit ADC sample to one wire byte.
pub fn adc_to_byte(sample: u16) -> u8 {
    ((sample & ADC_MAX) >> ADC_TO_BYTE_SHIFT) as u8
}

/// The two accelerometer axes carried by a control packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlSnapshot {
    pub accel_front_back: u8,
    pub accel_right_left: u8,
}

impl ControlSnapshot {
    pub fn sample<S: SensorPort + ?Sized>(sensors: &mut S) -> Self {
        Self {
            accel_front_back: adc_to_byte(sensors.sample_analog(AnalogChannel::AccelFrontBack)),
            accel_right_left: adc_to_byte(sensors.sample_analog(AnalogChannel::AccelRightLeft)),
        }
    }
}
