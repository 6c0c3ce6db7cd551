#![deny(unsafe_code)]
//! DS18B20 temperature sensors on the 1-Wire bus

use defmt::{debug, warn};
use embassy_time::Timer;
use hal_abstractions::{SensorBus, SensorId};

use crate::onewire::{crc8, OneWire, OneWireError, Search};

/// DS18B20 family code (first ROM byte)
const FAMILY_CODE: u8 = 0x28;

const CONVERT_T: u8 = 0x44;
const READ_SCRATCHPAD: u8 = 0xBE;

/// 12-bit conversion time
const CONVERSION_MS: u64 = 750;

/// Scratchpad temperature in degrees Celsius, or `None` on a CRC mismatch
fn scratchpad_celsius(scratchpad: &[u8; 9]) -> Option<f32> {
    if crc8(&scratchpad[..8]) != scratchpad[8] {
        return None;
    }
    let raw = i16::from_le_bytes([scratchpad[0], scratchpad[1]]);
    Some(f32::from(raw) / 16.0)
}

pub struct Ds18b20Bus<'d> {
    wire: OneWire<'d>,
}

impl<'d> Ds18b20Bus<'d> {
    pub fn new(wire: OneWire<'d>) -> Self {
        Self { wire }
    }
}

impl SensorBus for Ds18b20Bus<'_> {
    type Error = OneWireError;

    async fn discover<const N: usize>(
        &mut self,
        found: &mut heapless::Vec<SensorId, N>,
    ) -> Result<(), OneWireError> {
        let mut search = Search::default();
        while let Some(rom) = self.wire.search_next(&mut search)? {
            if rom[0] != FAMILY_CODE {
                debug!("Skipping 1-Wire device with family {=u8:#x}", rom[0]);
                continue;
            }
            if found.push(SensorId::new(rom)).is_err() {
                warn!("Sensor table full, ignoring the rest of the bus");
                break;
            }
        }
        Ok(())
    }

    async fn read(&mut self, id: &SensorId) -> Result<f32, OneWireError> {
        self.wire.select(id.address())?;
        self.wire.write_byte(CONVERT_T);
        Timer::after_millis(CONVERSION_MS).await;

        self.wire.select(id.address())?;
        self.wire.write_byte(READ_SCRATCHPAD);
        let mut scratchpad = [0u8; 9];
        self.wire.read_bytes(&mut scratchpad);

        // A released bus reads all ones, which fails the CRC as well
        scratchpad_celsius(&scratchpad).ok_or(OneWireError::CrcMismatch)
    }
}
