//! Sample producer
//!
//! Fills the cycle store with one wake's worth of readings: one battery
//! sample plus one per registered sensor, each tagged with the current
//! cycle count. Sensor discovery runs once per power session.

use embedded_hal_async::delay::DelayNs;
use hal_abstractions::{BatteryMonitor, SensorBus, SensorId};
use heapless::Vec;

use crate::config::{BatteryScale, NodeSettings, MAX_SENSORS};
use crate::fmt::Debug2Format;
use crate::sample::SampleSource;
use crate::store::CycleStore;

/// DS18B20 power-on reset value: conversion has not run yet
pub const SENTINEL_NOT_READY: f32 = 85.0;

/// Value reported for a device that dropped off the bus
pub const SENTINEL_DISCONNECTED: f32 = -127.0;

/// What one call to [`record_wake`] appended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WakeRecord {
    pub battery: bool,
    pub sensors: u8,
    /// Registered sensors that produced no usable reading
    pub missed: u8,
}

impl WakeRecord {
    pub fn samples(&self) -> usize {
        usize::from(self.battery) + usize::from(self.sensors)
    }
}

/// Whether a raw reading is a real measurement
pub fn is_valid_reading(value: f32) -> bool {
    value.is_finite() && value != SENTINEL_NOT_READY && value != SENTINEL_DISCONNECTED
}

/// Enumerate the bus once per power session
///
/// Returns `true` when discovery ran on this wake. A bus error leaves the
/// node in voltage-only operation for the rest of the session.
pub async fn discover<B: SensorBus>(store: &mut CycleStore, bus: &mut B) -> bool {
    if store.is_discovered() {
        return false;
    }

    let mut found: Vec<SensorId, MAX_SENSORS> = Vec::new();
    if let Err(e) = bus.discover(&mut found).await {
        warn!(
            "Sensor discovery failed after {} device(s): {:?}",
            found.len(),
            Debug2Format(&e)
        );
    }
    store.register_sensors(&found);

    info!("Found {} sensor(s)", store.sensors().len());
    for id in store.sensors() {
        debug!("  sensor {:?}", id);
    }
    true
}

/// Averaged, scaled battery voltage
///
/// Any failed conversion discards the whole reading.
pub async fn read_battery<M: BatteryMonitor>(battery: &mut M, scale: &BatteryScale) -> Option<f32> {
    let samples = scale.samples.max(1);
    let mut sum: u32 = 0;
    for _ in 0..samples {
        match battery.read_raw().await {
            Ok(raw) => sum += u32::from(raw),
            Err(e) => {
                warn!("Battery ADC read failed: {:?}", Debug2Format(&e));
                return None;
            }
        }
    }
    let average = sum as f32 / f32::from(samples);
    Some(average / scale.adc_max * scale.full_scale_volts)
}

/// Read one sensor, retrying sentinels and bus errors
///
/// Gives up after `attempts` tries; never returns a sentinel.
pub async fn read_sensor<B: SensorBus, D: DelayNs>(
    bus: &mut B,
    delay: &mut D,
    id: &SensorId,
    attempts: u8,
    retry_delay_ms: u32,
) -> Option<f32> {
    let attempts = attempts.max(1);
    for attempt in 1..=attempts {
        if attempt > 1 {
            delay.delay_ms(retry_delay_ms).await;
        }
        match bus.read(id).await {
            Ok(value) if is_valid_reading(value) => return Some(value),
            Ok(value) => trace!("Sensor {:?} attempt {}: sentinel {}", id, attempt, value),
            Err(e) => trace!(
                "Sensor {:?} attempt {}: {:?}",
                id,
                attempt,
                Debug2Format(&e)
            ),
        }
    }
    warn!("Sensor {:?} gave no reading after {} attempts", id, attempts);
    None
}

/// Record one wake's readings into the store
///
/// # Panics
///
/// If the store rejects a sample. The bound is `batch_size × (1 + sensors)`
/// and the controller never samples on a wake where a flush is due, so a
/// rejection means the store invariants are already broken.
pub async fn record_wake<B, M, D>(
    store: &mut CycleStore,
    bus: &mut B,
    battery: &mut M,
    delay: &mut D,
    settings: &NodeSettings,
) -> WakeRecord
where
    B: SensorBus,
    M: BatteryMonitor,
    D: DelayNs,
{
    let mut record = WakeRecord::default();

    if let Some(volts) = read_battery(battery, &settings.battery).await {
        append_or_panic(store, SampleSource::Battery, volts);
        record.battery = true;
        debug!("VBAT = {} V", volts);
    }

    // Registry is Copy and tiny; copying it frees `store` for appends
    let sensors: Vec<SensorId, MAX_SENSORS> = Vec::from_slice(store.sensors()).unwrap_or_default();
    for id in &sensors {
        match read_sensor(
            bus,
            delay,
            id,
            settings.sensor_read_attempts,
            settings.sensor_retry_delay_ms,
        )
        .await
        {
            Some(celsius) => {
                append_or_panic(store, SampleSource::Sensor(*id), celsius);
                record.sensors += 1;
                debug!("{:?} = {} C", id, celsius);
            }
            None => record.missed += 1,
        }
    }

    info!(
        "Cycle {}: recorded {} sample(s), {} buffered",
        store.cycle_count(),
        record.samples(),
        store.sample_count()
    );
    record
}

fn append_or_panic(store: &mut CycleStore, source: SampleSource, value: f32) {
    if let Err(e) = store.append(source, value) {
        panic!(
            "{}: cycle {} holds {} of {} samples",
            e,
            store.cycle_count(),
            store.sample_count(),
            store.sample_bound()
        );
    }
}
