//! Sensor bus and battery channel traits

use core::fmt;

/// Stable identity of a bus-attached sensor
///
/// A 64-bit bus address (family code, serial, CRC for 1-Wire devices).
/// Rendered as `0x` followed by 16 lowercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorId(pub [u8; 8]);

impl SensorId {
    /// Length of the rendered label: `0x` + 16 hex digits
    pub const LABEL_LEN: usize = 18;

    pub const fn new(address: [u8; 8]) -> Self {
        Self(address)
    }

    pub const fn address(&self) -> &[u8; 8] {
        &self.0
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("0x")?;
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Bus with discoverable temperature sensors (e.g. DS18B20 on 1-Wire)
///
/// Conversion timing is the driver's concern: `read` returns once the
/// device has a value or reports that it is not ready.
#[allow(async_fn_in_trait)]
pub trait SensorBus {
    type Error: fmt::Debug;

    /// Enumerate devices on the bus into `found`
    ///
    /// Stops silently once `found` is full.
    async fn discover<const N: usize>(
        &mut self,
        found: &mut heapless::Vec<SensorId, N>,
    ) -> Result<(), Self::Error>;

    /// Read one temperature value (degrees Celsius)
    ///
    /// Drivers may return a sentinel (`85.0` power-on value, `-127.0`
    /// disconnected) instead of an error; callers retry on both.
    async fn read(&mut self, id: &SensorId) -> Result<f32, Self::Error>;
}

/// Raw battery-voltage ADC channel
#[allow(async_fn_in_trait)]
pub trait BatteryMonitor {
    type Error: fmt::Debug;

    /// One raw conversion (right-aligned, board ADC resolution)
    async fn read_raw(&mut self) -> Result<u16, Self::Error>;
}
