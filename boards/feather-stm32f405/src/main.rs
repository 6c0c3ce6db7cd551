#![deny(unsafe_code)]
#![no_main]
#![no_std]

use defmt_rtt as _; // global logger
use panic_probe as _;
use rtic::app;
use rtic_monotonics::stm32::prelude::*;

mod battery;
mod device_id;
mod ds18b20;
mod eth;
mod network;
mod onewire;
mod power;
mod retained;
mod session_buffers;
mod settings;

stm32_tim2_monotonic!(Mono, 1_000_000);

#[app(device = embassy_stm32, peripherals = true, dispatchers = [USART1, USART2, USART3])]
mod app {
    use super::*;
    use batch_node_core::{CycleStore, WakeController, WakeKind};
    use cortex_m::peripheral::SCB;
    use defmt::{error, info};
    use embassy_futures::join::join;
    use embassy_futures::select::{select, Either};
    use embassy_stm32::adc::{Adc, AdcChannel};
    use embassy_stm32::exti::ExtiInput;
    use embassy_stm32::gpio::{Level, Output, OutputOpenDrain, Pull, Speed};
    use embassy_stm32::peripherals;
    use embassy_stm32::rcc::{Hse, HseMode, LsConfig, LseConfig, LseMode};
    use embassy_stm32::rng::Rng;
    use embassy_stm32::rtc::{Rtc, RtcConfig};
    use embassy_stm32::spi::{self, Spi};
    use embassy_stm32::time::Hertz;
    use embassy_time::Delay;
    use hal_abstractions::DeepSleep;

    use battery::AdcBattery;
    use ds18b20::Ds18b20Bus;
    use network::{MqttTransport, NetworkConfig};
    use onewire::OneWire;
    use power::{MonoUptime, Standby};

    type Periph<P> = embassy_stm32::Peri<'static, P>;

    /// W5500 FeatherWing on SPI2
    struct NetworkPeripherals {
        spi: Periph<peripherals::SPI2>,
        sck: Periph<peripherals::PB13>,
        mosi: Periph<peripherals::PB15>,
        miso: Periph<peripherals::PB14>,
        cs: Periph<peripherals::PC6>,
        reset: Periph<peripherals::PC3>,
        int: Periph<peripherals::PC2>,
        exti: Periph<peripherals::EXTI2>,
        dma_tx: Periph<peripherals::DMA1_CH4>,
        dma_rx: Periph<peripherals::DMA1_CH3>,
        rng: Periph<peripherals::RNG>,
    }

    /// 1-Wire bus on D9 and the VBAT divider on A0
    struct SensePeripherals {
        onewire: Periph<peripherals::PB8>,
        adc: Periph<peripherals::ADC1>,
        vbat: Periph<peripherals::PA4>,
    }

    embassy_stm32::bind_interrupts!(struct RngIrqs {
        RNG => embassy_stm32::rng::InterruptHandler<peripherals::RNG>;
    });

    #[shared]
    struct Shared {}

    #[local]
    struct Local {}

    #[init]
    fn init(cx: init::Context) -> (Shared, Local) {
        // Before anything else touches PWR
        let wake = power::wake_kind();
        info!("batch-node boot ({:?})", wake);

        // Adafruit Feather STM32F405: 12 MHz HSE, 32.768 kHz LSE (PC14/PC15)
        let mut config = embassy_stm32::Config::default();
        config.rcc.hse = Some(Hse {
            freq: Hertz(12_000_000),
            mode: HseMode::Oscillator,
        });

        // HSE / 6 = 2 MHz, x168 = 336 MHz VCO, /4 = 84 MHz SYSCLK, /7 = 48 MHz RNG
        config.rcc.pll_src = embassy_stm32::rcc::PllSource::HSE;
        config.rcc.pll = Some(embassy_stm32::rcc::Pll {
            prediv: embassy_stm32::rcc::PllPreDiv::DIV6,
            mul: embassy_stm32::rcc::PllMul::MUL168,
            divp: Some(embassy_stm32::rcc::PllPDiv::DIV4),
            divq: Some(embassy_stm32::rcc::PllQDiv::DIV7),
            divr: None,
        });
        config.rcc.sys = embassy_stm32::rcc::Sysclk::PLL1_P;
        config.rcc.ahb_pre = embassy_stm32::rcc::AHBPrescaler::DIV1; // 84 MHz
        config.rcc.apb1_pre = embassy_stm32::rcc::APBPrescaler::DIV2; // 42 MHz
        config.rcc.apb2_pre = embassy_stm32::rcc::APBPrescaler::DIV1; // 84 MHz

        // LSE drives the RTC, whose wakeup timer ends standby
        config.rcc.ls = LsConfig {
            rtc: embassy_stm32::rcc::RtcClockSource::LSE,
            lsi: false,
            lse: Some(LseConfig {
                frequency: Hertz(32_768),
                mode: LseMode::Oscillator(embassy_stm32::rcc::LseDrive::MediumHigh),
            }),
        };

        let p = embassy_stm32::init(config);

        // TIM2 on APB1: timer clock = 2 * APB1 = 84 MHz
        Mono::start(84_000_000);

        // Prescalers for the 1 Hz ck_spre used by the wakeup timer
        let _rtc = Rtc::new(p.RTC, RtcConfig::default());

        retained::enable_backup_sram();

        let net = NetworkPeripherals {
            spi: p.SPI2,
            sck: p.PB13,
            mosi: p.PB15,
            miso: p.PB14,
            cs: p.PC6,
            reset: p.PC3,
            int: p.PC2,
            exti: p.EXTI2,
            dma_tx: p.DMA1_CH4,
            dma_rx: p.DMA1_CH3,
            rng: p.RNG,
        };
        let sense = SensePeripherals {
            onewire: p.PB8,
            adc: p.ADC1,
            vbat: p.PA4,
        };

        wake_task::spawn(wake, net, sense, cx.core.SCB).ok();

        (Shared {}, Local {})
    }

    /// One wake: sample, maybe flush, then standby
    ///
    /// The network stack is !Send and stays within this task.
    #[task(priority = 1)]
    async fn wake_task(
        _cx: wake_task::Context,
        wake: WakeKind,
        net: NetworkPeripherals,
        sense: SensePeripherals,
        scb: SCB,
    ) -> ! {
        use embassy_net::{Config, StackResources};
        use static_cell::StaticCell;

        let standby = Standby::new(scb);

        #[allow(unsafe_code)]
        // SAFETY: claimed once, here; backup SRAM was enabled in init
        let store: &'static mut CycleStore = unsafe { retained::claim(wake) };

        let mut spi_config = spi::Config::default();
        spi_config.frequency = Hertz(10_000_000);
        let spi = Spi::new(
            net.spi, net.sck, net.mosi, net.miso, net.dma_tx, net.dma_rx, spi_config,
        );
        let eth_periph = eth::EthPeripherals {
            spi,
            cs: Output::new(net.cs, Level::High, Speed::VeryHigh),
            reset: Output::new(net.reset, Level::High, Speed::Low),
            int: ExtiInput::new(net.int, net.exti, Pull::Up),
        };

        let net_config = NetworkConfig::from_uid(embassy_stm32::uid::uid());
        let (device, mut w5500_runner) =
            match eth::init_w5500(eth_periph, net_config.mac_addr).await {
                Ok(eth) => eth,
                Err(e) => {
                    error!("Ethernet init failed: {:?}", e);
                    standby.sleep_for(store.config().sleep_period_secs())
                }
            };

        static RESOURCES: StaticCell<StackResources<3>> = StaticCell::new();
        let (stack, mut net_runner) = embassy_net::new(
            device,
            Config::dhcpv4(Default::default()),
            RESOURCES.init(StackResources::new()),
            net_config.seed,
        );

        let client_id = device_id::device_id();
        let settings = settings::node_settings(client_id);
        let transport = MqttTransport::new(
            stack,
            Rng::new(net.rng, RngIrqs),
            settings::mqtt_config(),
            client_id,
        );
        let bus = Ds18b20Bus::new(OneWire::new(OutputOpenDrain::new(
            sense.onewire,
            Level::High,
            Speed::Low,
        )));
        let battery = AdcBattery::new(Adc::new(sense.adc), sense.vbat.degrade_adc());

        let mut controller =
            match WakeController::new(bus, battery, transport, Delay, MonoUptime, settings) {
                Ok(controller) => controller,
                Err(e) => {
                    error!("Invalid node settings: {:?}", e);
                    standby.sleep_for(store.config().sleep_period_secs())
                }
            };

        let network = join(w5500_runner.run(), net_runner.run());
        let request = match select(network, controller.run_wake(store)).await {
            Either::First(_) => unreachable!("network runners never return"),
            Either::Second(request) => request,
        };

        info!(
            "Wake done after {} ms: {:?}",
            Mono::now().duration_since_epoch().to_millis(),
            request
        );
        standby.sleep_for(request.seconds)
    }

    #[idle]
    fn idle(_cx: idle::Context) -> ! {
        loop {
            cortex_m::asm::wfi();
        }
    }
}
