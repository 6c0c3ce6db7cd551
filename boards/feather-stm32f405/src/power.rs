//! Standby entry, RTC wakeup and boot classification
//!
//! Deep sleep on this board is STM32 standby: everything but the backup
//! domain (RTC, backup registers, backup SRAM) loses power and the next
//! wake starts from reset. The RTC wakeup timer, clocked from the 1 Hz
//! `ck_spre` derived from the LSE, ends the sleep.

#![deny(unsafe_code)]

use batch_node_core::WakeKind;
use cortex_m::peripheral::SCB;
use defmt::{debug, info};
use embassy_stm32::pac;
use embassy_stm32::pac::rtc::vals::Wucksel;
use hal_abstractions::{DeepSleep, Uptime};

use rtic_monotonics::stm32::prelude::*;

use crate::Mono;

/// 16-bit counter on the 1 Hz clock
const MAX_WAKEUP_SECS: u32 = 1 << 16;

/// ck_spre with 2^16 added to the counter (WUCKSEL = 11x)
const MAX_EXTENDED_WAKEUP_SECS: u32 = 1 << 17;

/// Read and clear the standby flag
///
/// Must run before anything else touches PWR_CSR.
pub fn wake_kind() -> WakeKind {
    pac::RCC.apb1enr().modify(|w| w.set_pwren(true));
    let from_standby = pac::PWR.csr1().read().sbf();
    pac::PWR.cr1().modify(|w| {
        w.set_csbf(true);
        w.set_cwuf(true);
    });
    if from_standby {
        WakeKind::FromSleep
    } else {
        WakeKind::PowerOn
    }
}

/// Milliseconds since this boot, from the TIM2 monotonic
pub struct MonoUptime;

impl Uptime for MonoUptime {
    fn now_ms(&self) -> u64 {
        Mono::now().duration_since_epoch().to_millis()
    }
}

/// Terminal standby action
pub struct Standby {
    scb: SCB,
}

impl Standby {
    pub fn new(scb: SCB) -> Self {
        Self { scb }
    }

    /// Program the RTC wakeup timer for `seconds` from now
    fn arm_wakeup(seconds: u32) {
        let seconds = seconds.clamp(1, MAX_EXTENDED_WAKEUP_SECS);
        let rtc = pac::RTC;

        rtc.wpr().write(|w| w.set_key(0xca));
        rtc.wpr().write(|w| w.set_key(0x53));

        rtc.cr().modify(|w| w.set_wute(false));
        while !rtc.isr().read().wutwf() {}

        let (counter, clock) = if seconds <= MAX_WAKEUP_SECS {
            (seconds - 1, Wucksel::CLOCKSPARE)
        } else {
            (seconds - MAX_WAKEUP_SECS - 1, Wucksel::CLOCKSPAREWITHOFFSET)
        };
        rtc.wutr().write(|w| w.set_wut(counter as u16));
        rtc.isr().modify(|w| w.set_wutf(false));
        rtc.cr().modify(|w| {
            w.set_wucksel(clock);
            w.set_wutie(true);
            w.set_wute(true);
        });

        rtc.wpr().write(|w| w.set_key(0xff));
        debug!("RTC wakeup armed: {} s", seconds);
    }
}

impl DeepSleep for Standby {
    fn sleep_for(mut self, seconds: u32) -> ! {
        Self::arm_wakeup(seconds);
        info!("Entering standby for {} s", seconds);

        pac::PWR.cr1().modify(|w| {
            w.set_pdds(pac::pwr::vals::Pdds::STANDBY_MODE);
            w.set_cwuf(true);
        });
        self.scb.set_sleepdeep();

        loop {
            cortex_m::asm::dsb();
            cortex_m::asm::wfi();
        }
    }
}
