//! Persistent cycle store
//!
//! Everything the node needs to carry from one wake to the next: cycle and
//! sample counters, the buffered samples, the sensor registry and the
//! operating configuration. The store is a plain fixed-size value with no
//! pointers so it can live in sleep-retained RAM (see [`crate::retention`]).
//!
//! # Invariants
//!
//! - `sample_count() == samples().len()`; samples are only removed by
//!   [`CycleStore::reset_cycle`]
//! - `sample_count() <= batch_size × (1 + sensor_count)`, enforced by
//!   [`CycleStore::append`]
//! - the configuration only changes through a [`ValidatedConfig`]

use heapless::Vec;
use hal_abstractions::SensorId;

use crate::config::{OperatingConfig, ValidatedConfig, MAX_SENSORS, SAMPLE_CAPACITY};
use crate::error::StoreError;
use crate::sample::{Sample, SampleSource};

#[derive(Debug, Clone)]
pub struct CycleStore {
    cycle_count: u16,
    samples: Vec<Sample, SAMPLE_CAPACITY>,
    sensors: Vec<SensorId, MAX_SENSORS>,
    discovered: bool,
    config: OperatingConfig,
}

impl CycleStore {
    /// Cold-boot state: empty buffers, compiled default configuration
    pub const fn new() -> Self {
        Self {
            cycle_count: 0,
            samples: Vec::new(),
            sensors: Vec::new(),
            discovered: false,
            config: OperatingConfig::DEFAULT,
        }
    }

    /// Wakes completed since the last successful flush
    pub fn cycle_count(&self) -> u16 {
        self.cycle_count
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Buffered samples, oldest first
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn sensors(&self) -> &[SensorId] {
        &self.sensors
    }

    /// Whether sensor discovery already ran in this power session
    pub fn is_discovered(&self) -> bool {
        self.discovered
    }

    pub fn config(&self) -> OperatingConfig {
        self.config
    }

    /// Most samples the buffer may hold under the current configuration
    pub fn sample_bound(&self) -> usize {
        let per_wake = 1 + self.sensors.len();
        (usize::from(self.config.batch_size()) * per_wake).min(SAMPLE_CAPACITY)
    }

    /// Append one reading tagged with the current cycle count
    pub fn append(&mut self, source: SampleSource, value: f32) -> Result<(), StoreError> {
        if self.samples.len() >= self.sample_bound() {
            return Err(StoreError::CapacityExceeded);
        }
        self.samples
            .push(Sample {
                source,
                value,
                cycle: self.cycle_count,
            })
            .map_err(|_| StoreError::CapacityExceeded)
    }

    /// Count one completed wake
    pub fn complete_cycle(&mut self) {
        self.cycle_count = self.cycle_count.saturating_add(1);
    }

    /// Whether enough wakes have accumulated to flush
    pub fn flush_due(&self) -> bool {
        self.cycle_count >= u16::from(self.config.batch_size())
    }

    /// Drop the flushed batch and restart counting
    pub fn reset_cycle(&mut self) {
        self.cycle_count = 0;
        self.samples.clear();
    }

    /// Record the outcome of sensor discovery
    ///
    /// Keeps at most `MAX_SENSORS` identities; the registry is not touched
    /// again for the rest of the power session.
    pub fn register_sensors(&mut self, ids: &[SensorId]) {
        if self.discovered {
            return;
        }
        for id in ids.iter().take(MAX_SENSORS) {
            // Capacity equals the take() bound
            let _ = self.sensors.push(*id);
        }
        self.discovered = true;
    }

    /// Adopt a configuration that passed validation
    pub fn apply(&mut self, config: ValidatedConfig) {
        self.config = config.get();
    }
}

impl Default for CycleStore {
    fn default() -> Self {
        Self::new()
    }
}
