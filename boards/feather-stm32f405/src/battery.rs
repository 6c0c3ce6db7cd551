#![deny(unsafe_code)]
//! Battery voltage channel
//!
//! The Feather's VBAT divider (1:2) feeds A0 (PA4, ADC1_IN4). Scaling to
//! volts happens in the core from the board's `BatteryScale`.

use core::convert::Infallible;

use embassy_stm32::adc::{Adc, AnyAdcChannel, SampleTime};
use embassy_stm32::peripherals::ADC1;
use hal_abstractions::BatteryMonitor;

pub struct AdcBattery<'d> {
    adc: Adc<'d, ADC1>,
    channel: AnyAdcChannel<ADC1>,
}

impl<'d> AdcBattery<'d> {
    pub fn new(mut adc: Adc<'d, ADC1>, channel: AnyAdcChannel<ADC1>) -> Self {
        // High source impedance from the divider
        adc.set_sample_time(SampleTime::CYCLES480);
        Self { adc, channel }
    }
}

impl BatteryMonitor for AdcBattery<'_> {
    type Error = Infallible;

    async fn read_raw(&mut self) -> Result<u16, Infallible> {
        Ok(self.adc.blocking_read(&mut self.channel))
    }
}
