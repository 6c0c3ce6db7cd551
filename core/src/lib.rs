//! Platform-agnostic core of the batch-node firmware
//!
//! Everything that has to survive deep sleep or decide what a wake does
//! lives here: the retained cycle store, the sample producer, the
//! batch/sleep controller and the device-shadow configuration sync. It has
//! NO hardware dependencies; boards plug in through the traits in
//! `hal-abstractions`.
//!
//! A board's wake looks like:
//!
//! ```ignore
//! let (store, boot) = retained_cell.claim(wake_kind);
//! let mut controller = WakeController::new(bus, battery, transport, Delay, clock, settings)?;
//! let request = controller.run_wake(store).await;
//! deep_sleep.sleep_for(request.seconds)
//! ```

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

// Must come first so the logging macros are visible to every module
mod fmt;

pub mod config;
pub mod controller;
pub mod error;
pub mod payload;
pub mod producer;
pub mod retention;
pub mod sample;
pub mod shadow;
pub mod store;

#[cfg(test)]
mod mock;

pub use config::{NodeSettings, OperatingConfig, ReportPolicy, ValidatedConfig};
pub use controller::{SleepReason, SleepRequest, WakeController};
pub use error::{ConfigError, ConnectError, ConnectStage, PayloadError, StoreError, TopicError};
pub use retention::{BootKind, RetainedCell, WakeKind};
pub use store::CycleStore;
