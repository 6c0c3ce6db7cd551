//! Buffered sample representation

use core::fmt::{self, Write};

use hal_abstractions::SensorId;

/// Label used for the battery-voltage channel
pub const BATTERY_LABEL: &str = "VBAT";

/// Longest label any source renders to
pub const MAX_LABEL_LEN: usize = SensorId::LABEL_LEN;

/// Where a sample came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SampleSource {
    Battery,
    Sensor(SensorId),
}

impl SampleSource {
    /// Render the wire label (`VBAT` or the sensor's hex address)
    pub fn label(&self) -> heapless::String<MAX_LABEL_LEN> {
        let mut label = heapless::String::new();
        // Both renderings fit MAX_LABEL_LEN exactly or with room to spare
        let _ = write!(label, "{}", self);
        label
    }
}

impl fmt::Display for SampleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Battery => f.write_str(BATTERY_LABEL),
            Self::Sensor(id) => id.fmt(f),
        }
    }
}

/// One buffered reading
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Sample {
    pub source: SampleSource,
    pub value: f32,
    /// Age marker: the cycle count at the wake the sample was taken
    pub cycle: u16,
}
