//! Hardware abstraction traits for IoT firmware
//!
//! This crate defines traits that abstract over hardware differences
//! between boards. BSPs implement these traits; `batch-node-core` drives
//! them and never touches a peripheral directly.
//!
//! - **`sensor`**: 1-Wire style sensor bus and battery ADC channel
//! - **`transport`**: network link + MQTT session used for flushes and shadow sync
//! - **`power`**: uptime clock and the terminal deep-sleep action

#![no_std]
#![deny(unsafe_code)]

pub mod power;
pub mod sensor;
pub mod transport;

pub use power::{DeepSleep, Uptime};
pub use sensor::{BatteryMonitor, SensorBus, SensorId};
pub use transport::{Incoming, Transport, MAX_TOPIC_LEN};
