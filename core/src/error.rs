//! Core error types

/// Cycle store errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError {
    /// Appending would exceed `batch_size × (1 + sensors)` or the buffer capacity
    CapacityExceeded,
}

/// Remote configuration rejected by validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Desired batch outside `1..=MAX_BATCH`
    BatchOutOfRange,
    /// Desired period outside `1..=MAX_SLEEP_PERIOD_SECS`
    PeriodOutOfRange,
}

/// Wire payload encode/decode errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PayloadError {
    /// Document is not valid JSON or lacks required members
    Malformed,
    /// Output buffer too small
    BufferFull,
}

/// MQTT topic construction errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TopicError {
    /// Wildcard (`+`, `#`) or NUL in a topic component
    InvalidCharacter,
    /// Topic longer than the transport's limit
    TooLong,
}

/// Stage at which connection establishment ran out of time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectStage {
    /// Network association / address configuration
    Link,
    /// TLS + MQTT handshake
    Session,
}

/// Connection establishment errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectError {
    /// The connect deadline passed
    Timeout(ConnectStage),
}

impl core::fmt::Display for StoreError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::CapacityExceeded => write!(f, "Sample buffer capacity exceeded"),
        }
    }
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BatchOutOfRange => write!(f, "Batch size out of range"),
            Self::PeriodOutOfRange => write!(f, "Sleep period out of range"),
        }
    }
}

impl core::fmt::Display for PayloadError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Malformed => write!(f, "Malformed payload"),
            Self::BufferFull => write!(f, "Payload buffer full"),
        }
    }
}

impl core::fmt::Display for TopicError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidCharacter => write!(f, "Invalid MQTT topic character"),
            Self::TooLong => write!(f, "MQTT topic too long"),
        }
    }
}

impl core::fmt::Display for ConnectError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Timeout(ConnectStage::Link) => write!(f, "Timed out waiting for network link"),
            Self::Timeout(ConnectStage::Session) => write!(f, "Timed out opening session"),
        }
    }
}

impl core::error::Error for StoreError {}
impl core::error::Error for ConfigError {}
impl core::error::Error for PayloadError {}
impl core::error::Error for TopicError {}
impl core::error::Error for ConnectError {}

impl From<serde_json_core::de::Error> for PayloadError {
    fn from(_: serde_json_core::de::Error) -> Self {
        Self::Malformed
    }
}

impl From<serde_json_core::ser::Error> for PayloadError {
    fn from(_: serde_json_core::ser::Error) -> Self {
        Self::BufferFull
    }
}
