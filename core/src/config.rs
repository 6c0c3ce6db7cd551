//! Compiled limits, defaults and the operating configuration
//!
//! The operating configuration (`batch_size`, `sleep_period_secs`) lives in
//! the cycle store and can only be replaced by a [`ValidatedConfig`], which
//! in turn can only be produced by [`OperatingConfig::validate`]. Raw values
//! from the shadow document never reach the store directly.

use crate::error::ConfigError;

/// Largest accepted batch (wakes per flush)
pub const MAX_BATCH: u8 = 15;

/// Maximum number of bus sensors registered per power session
pub const MAX_SENSORS: usize = 3;

/// Batch size until the shadow says otherwise
pub const DEFAULT_BATCH: u8 = 15;

/// Sleep period until the shadow says otherwise
pub const DEFAULT_SLEEP_PERIOD_SECS: u32 = 10;

/// Upper bound for a remotely requested sleep period (one day)
pub const MAX_SLEEP_PERIOD_SECS: u32 = 86_400;

/// Samples recorded per wake at most: battery + one per sensor
pub const SAMPLES_PER_WAKE: usize = 1 + MAX_SENSORS;

/// Sample buffer capacity
pub const SAMPLE_CAPACITY: usize = MAX_BATCH as usize * SAMPLES_PER_WAKE;

/// Data payload buffer: worst-case encoded record is well under 80 bytes
pub const PAYLOAD_CAPACITY: usize = SAMPLE_CAPACITY * 80;

/// Parameters the node operates under, retained across deep sleep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OperatingConfig {
    batch_size: u8,
    sleep_period_secs: u32,
}

impl OperatingConfig {
    /// Compiled defaults
    pub const DEFAULT: Self = Self {
        batch_size: DEFAULT_BATCH,
        sleep_period_secs: DEFAULT_SLEEP_PERIOD_SECS,
    };

    pub const fn batch_size(&self) -> u8 {
        self.batch_size
    }

    pub const fn sleep_period_secs(&self) -> u32 {
        self.sleep_period_secs
    }

    /// Whether this is still the compiled default (no remote config adopted yet)
    pub fn is_default(&self) -> bool {
        *self == Self::DEFAULT
    }

    /// Validate raw remote values
    ///
    /// `1 <= batch <= MAX_BATCH` and `1 <= period <= MAX_SLEEP_PERIOD_SECS`.
    /// Both values are adopted together or not at all.
    pub fn validate(batch: i64, period: i64) -> Result<ValidatedConfig, ConfigError> {
        if batch < 1 || batch > i64::from(MAX_BATCH) {
            return Err(ConfigError::BatchOutOfRange);
        }
        if period < 1 || period > i64::from(MAX_SLEEP_PERIOD_SECS) {
            return Err(ConfigError::PeriodOutOfRange);
        }
        Ok(ValidatedConfig(Self {
            batch_size: batch as u8,
            sleep_period_secs: period as u32,
        }))
    }

    /// Whether raw remote values differ from this configuration
    pub fn differs_from(&self, batch: i64, period: i64) -> bool {
        batch != i64::from(self.batch_size) || period != i64::from(self.sleep_period_secs)
    }
}

impl Default for OperatingConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Configuration that passed range validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ValidatedConfig(OperatingConfig);

impl ValidatedConfig {
    pub const fn get(&self) -> OperatingConfig {
        self.0
    }
}

/// When a reported-state update is sent after a desired-state response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReportPolicy {
    /// Report whenever the desired values differ from the local ones,
    /// compared before validation. A rejected value still triggers a
    /// report of the unchanged local configuration.
    #[default]
    OnAnyDifference,
    /// Report only when a validated value was adopted and changed something
    OnApplied,
}

/// Battery channel scaling
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BatteryScale {
    /// Conversions averaged per reading
    pub samples: u8,
    /// Raw value at full scale
    pub adc_max: f32,
    /// Battery voltage at full scale (ADC reference times divider ratio)
    pub full_scale_volts: f32,
}

impl Default for BatteryScale {
    fn default() -> Self {
        Self {
            samples: 10,
            adc_max: 4095.0,
            full_scale_volts: 6.864,
        }
    }
}

/// Timing and identity knobs for one wake
#[derive(Debug, Clone, Copy)]
pub struct NodeSettings {
    /// Shadow thing name, used to build the shadow topics
    pub thing_name: &'static str,
    /// Topic the sample batch is published to
    pub data_topic: &'static str,
    /// Ceiling for link bring-up plus session handshake
    pub connect_timeout_ms: u64,
    /// Poll interval while waiting for the link
    pub link_poll_ms: u32,
    /// Delay between session attempts
    pub session_retry_ms: u32,
    /// Number of polls for the desired-state response
    pub shadow_poll_attempts: u8,
    /// Wait per poll for the desired-state response
    pub shadow_poll_interval_ms: u32,
    /// Attempts per sensor read before the sample is dropped
    pub sensor_read_attempts: u8,
    /// Delay between sensor read attempts
    pub sensor_retry_delay_ms: u32,
    pub report_policy: ReportPolicy,
    pub battery: BatteryScale,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            thing_name: "ESP32",
            data_topic: "esp32/pub",
            connect_timeout_ms: 60_000,
            link_poll_ms: 500,
            session_retry_ms: 100,
            shadow_poll_attempts: 10,
            shadow_poll_interval_ms: 100,
            sensor_read_attempts: 10,
            sensor_retry_delay_ms: 100,
            report_policy: ReportPolicy::default(),
            battery: BatteryScale::default(),
        }
    }
}
