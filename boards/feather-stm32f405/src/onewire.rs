#![deny(unsafe_code)]
//! Bit-banged 1-Wire master on an open-drain GPIO
//!
//! Standard-speed timing. Each time slot runs inside a critical section so
//! an interrupt cannot stretch it; the 480 µs reset pulse is the longest
//! window interrupts are held off.

use defmt::Format;
use embassy_stm32::gpio::OutputOpenDrain;

/// SYSCLK is 84 MHz
const CYCLES_PER_US: u32 = 84;

pub const SEARCH_ROM: u8 = 0xF0;
pub const MATCH_ROM: u8 = 0x55;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum OneWireError {
    /// No device answered the reset pulse
    NoPresence,
    /// Line held low after release
    BusShorted,
    /// Both the bit and its complement read as 1 during a search
    SearchAborted,
    CrcMismatch,
}

/// Dallas/Maxim CRC-8 (x^8 + x^5 + x^4 + 1, reflected)
pub fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |mut crc, &byte| {
        let mut b = byte;
        for _ in 0..8 {
            let mix = (crc ^ b) & 0x01;
            crc >>= 1;
            if mix != 0 {
                crc ^= 0x8C;
            }
            b >>= 1;
        }
        crc
    })
}

/// ROM search cursor (Maxim application note 187)
#[derive(Default)]
pub struct Search {
    rom: [u8; 8],
    last_discrepancy: u8,
    done: bool,
}

pub struct OneWire<'d> {
    pin: OutputOpenDrain<'d>,
}

#[inline(always)]
fn delay_us(us: u32) {
    cortex_m::asm::delay(us * CYCLES_PER_US);
}

impl<'d> OneWire<'d> {
    pub fn new(pin: OutputOpenDrain<'d>) -> Self {
        Self { pin }
    }

    /// Reset pulse; `Ok(true)` when at least one device signals presence
    pub fn reset(&mut self) -> Result<bool, OneWireError> {
        // Released line must float high through the pull-up
        self.pin.set_high();
        delay_us(5);
        if self.pin.is_low() {
            return Err(OneWireError::BusShorted);
        }

        let present = critical_section::with(|_| {
            self.pin.set_low();
            delay_us(480);
            self.pin.set_high();
            delay_us(70);
            self.pin.is_low()
        });
        delay_us(410);
        Ok(present)
    }

    fn write_bit(&mut self, bit: bool) {
        critical_section::with(|_| {
            self.pin.set_low();
            if bit {
                delay_us(6);
                self.pin.set_high();
                delay_us(64);
            } else {
                delay_us(60);
                self.pin.set_high();
                delay_us(10);
            }
        });
    }

    fn read_bit(&mut self) -> bool {
        critical_section::with(|_| {
            self.pin.set_low();
            delay_us(6);
            self.pin.set_high();
            delay_us(9);
            let bit = self.pin.is_high();
            delay_us(55);
            bit
        })
    }

    pub fn write_byte(&mut self, byte: u8) {
        for i in 0..8 {
            self.write_bit(byte & (1 << i) != 0);
        }
    }

    pub fn read_byte(&mut self) -> u8 {
        (0..8).fold(0u8, |byte, i| byte | (u8::from(self.read_bit()) << i))
    }

    pub fn read_bytes(&mut self, buf: &mut [u8]) {
        for byte in buf {
            *byte = self.read_byte();
        }
    }

    /// Reset and address a single device
    pub fn select(&mut self, rom: &[u8; 8]) -> Result<(), OneWireError> {
        if !self.reset()? {
            return Err(OneWireError::NoPresence);
        }
        self.write_byte(MATCH_ROM);
        for &byte in rom {
            self.write_byte(byte);
        }
        Ok(())
    }

    /// Next ROM code on the bus, `Ok(None)` once all have been found
    pub fn search_next(&mut self, search: &mut Search) -> Result<Option<[u8; 8]>, OneWireError> {
        if search.done {
            return Ok(None);
        }
        if !self.reset()? {
            search.done = true;
            return Ok(None);
        }
        self.write_byte(SEARCH_ROM);

        let mut last_zero = 0u8;
        for bit_number in 1..=64u8 {
            let id_bit = self.read_bit();
            let complement = self.read_bit();
            if id_bit && complement {
                search.done = true;
                return Err(OneWireError::SearchAborted);
            }

            let byte = usize::from((bit_number - 1) / 8);
            let mask = 1u8 << ((bit_number - 1) % 8);
            let direction = if id_bit != complement {
                id_bit
            } else {
                // Discrepancy: repeat the previous choice below the last
                // discrepancy, take the 1 branch at it, the 0 branch past it
                let direction = if bit_number < search.last_discrepancy {
                    search.rom[byte] & mask != 0
                } else {
                    bit_number == search.last_discrepancy
                };
                if !direction {
                    last_zero = bit_number;
                }
                direction
            };

            if direction {
                search.rom[byte] |= mask;
            } else {
                search.rom[byte] &= !mask;
            }
            self.write_bit(direction);
        }

        search.last_discrepancy = last_zero;
        search.done = last_zero == 0;

        if crc8(&search.rom[..7]) != search.rom[7] {
            return Err(OneWireError::CrcMismatch);
        }
        Ok(Some(search.rom))
    }
}
