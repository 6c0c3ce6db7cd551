//! Batch/sleep controller
//!
//! Runs once per wake and decides what the node does before powering down:
//!
//! ```text
//!             +------------+  cycle_count < batch_size
//!   wake ---> | ACCUMULATE | -----------------------------> sleep(period)
//!             +------------+
//!                   | cycle_count >= batch_size
//!                   v
//!             +------------+  connect timeout
//!             |   FLUSH    | -----------------------------> sleep(period), store untouched
//!             +------------+
//!                   | connect, fetch desired, publish batch, report, reset
//!                   v
//!             sleep(new period)
//! ```
//!
//! A flush that timed out leaves `cycle_count >= batch_size` behind. The
//! next wake sees the pending flush and retries it without sampling, so no
//! wake is counted twice and the buffer never grows past its bound. Once a
//! session is up the batch is cleared whether or not its publish succeeded,
//! since the fetch may already have changed the period it was timed under.
//!
//! The controller never powers down itself; it hands a [`SleepRequest`]
//! back to the board.

use embedded_hal_async::delay::DelayNs;
use hal_abstractions::{BatteryMonitor, SensorBus, Transport, Uptime};

use crate::config::{NodeSettings, PAYLOAD_CAPACITY};
use crate::error::{ConnectError, ConnectStage, TopicError};
use crate::fmt::Debug2Format;
use crate::payload;
use crate::producer;
use crate::shadow::{self, ShadowTopics};
use crate::store::CycleStore;

/// Why the node is going back to sleep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SleepReason {
    /// Batch not complete yet
    Accumulating,
    /// Batch published and cleared
    Flushed,
    /// Network or session did not come up in time; buffer kept
    ConnectTimeout,
    /// Session was up but the batch publish failed; the batch is dropped
    PublishFailed,
}

/// Terminal action for a wake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SleepRequest {
    pub seconds: u32,
    pub reason: SleepReason,
}

pub struct WakeController<B, M, T, D, C> {
    bus: B,
    battery: M,
    transport: T,
    delay: D,
    clock: C,
    settings: NodeSettings,
    topics: ShadowTopics,
}

impl<B, M, T, D, C> WakeController<B, M, T, D, C>
where
    B: SensorBus,
    M: BatteryMonitor,
    T: Transport,
    D: DelayNs,
    C: Uptime,
{
    /// Fails when the configured thing name or data topic is not a valid topic
    pub fn new(
        bus: B,
        battery: M,
        transport: T,
        delay: D,
        clock: C,
        settings: NodeSettings,
    ) -> Result<Self, TopicError> {
        shadow::check_topic_name(settings.data_topic)?;
        let topics = ShadowTopics::new(settings.thing_name)?;
        Ok(Self {
            bus,
            battery,
            transport,
            delay,
            clock,
            settings,
            topics,
        })
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run one wake against the retained store
    pub async fn run_wake(&mut self, store: &mut CycleStore) -> SleepRequest {
        if producer::discover(store, &mut self.bus).await && store.config().is_default() {
            info!("First wake: fetching remote configuration");
            if let Err(e) = self.connect().await {
                warn!("Initial sync skipped: {:?}", e);
                return self.sleep(store, SleepReason::ConnectTimeout);
            }
            shadow::sync(
                &mut self.transport,
                &self.topics,
                store,
                self.settings.shadow_poll_attempts,
                self.settings.shadow_poll_interval_ms,
                self.settings.report_policy,
            )
            .await;
        }

        if store.flush_due() {
            warn!(
                "Flush pending from an earlier wake: {} cycle(s), {} sample(s)",
                store.cycle_count(),
                store.sample_count()
            );
            return self.flush(store).await;
        }

        producer::record_wake(
            store,
            &mut self.bus,
            &mut self.battery,
            &mut self.delay,
            &self.settings,
        )
        .await;
        store.complete_cycle();

        if store.flush_due() {
            return self.flush(store).await;
        }

        if self.transport.is_connected() {
            self.transport.disconnect().await;
        }
        debug!(
            "Cycle {} of {}",
            store.cycle_count(),
            store.config().batch_size()
        );
        self.sleep(store, SleepReason::Accumulating)
    }

    /// Bring up the link and open a session under one deadline
    ///
    /// An already open session is reused.
    pub async fn connect(&mut self) -> Result<(), ConnectError> {
        if self.transport.is_connected() {
            return Ok(());
        }

        let started = self.clock.now_ms();
        let deadline = started.saturating_add(self.settings.connect_timeout_ms);

        while !self.transport.link_up() {
            if self.clock.now_ms() >= deadline {
                return Err(ConnectError::Timeout(ConnectStage::Link));
            }
            self.delay.delay_ms(self.settings.link_poll_ms).await;
        }
        debug!("Link up after {} ms", self.clock.now_ms() - started);

        loop {
            match self.transport.open_session().await {
                Ok(()) => break,
                Err(e) => debug!("Session attempt failed: {:?}", Debug2Format(&e)),
            }
            if self.clock.now_ms() >= deadline {
                return Err(ConnectError::Timeout(ConnectStage::Session));
            }
            self.delay.delay_ms(self.settings.session_retry_ms).await;
        }

        info!("Connected in {} ms", self.clock.now_ms() - started);
        Ok(())
    }

    async fn flush(&mut self, store: &mut CycleStore) -> SleepRequest {
        // Timestamps follow the cycle count and period the batch was recorded under
        let mut body = [0u8; PAYLOAD_CAPACITY];
        let len = match payload::encode_batch(
            store.samples(),
            store.cycle_count(),
            store.config().sleep_period_secs(),
            &mut body,
        ) {
            Ok(len) => len,
            Err(e) => panic!("{}: {} samples", e, store.sample_count()),
        };
        info!(
            "Flushing {} sample(s) from {} cycle(s), {} bytes",
            store.sample_count(),
            store.cycle_count(),
            len
        );

        if let Err(e) = self.connect().await {
            warn!("Flush postponed: {:?}", e);
            return self.sleep(store, SleepReason::ConnectTimeout);
        }

        let outcome = shadow::fetch_desired(
            &mut self.transport,
            &self.topics,
            store,
            self.settings.shadow_poll_attempts,
            self.settings.shadow_poll_interval_ms,
            self.settings.report_policy,
        )
        .await;

        let published = match self
            .transport
            .publish(self.settings.data_topic, &body[..len])
            .await
        {
            Ok(()) => true,
            Err(e) => {
                error!("Batch publish failed: {:?}", Debug2Format(&e));
                false
            }
        };

        if outcome.changed {
            shadow::report_effective(&mut self.transport, &self.topics, &store.config()).await;
        }

        self.transport.disconnect().await;

        // Cleared even on failure: the fetch may have replaced its config
        store.reset_cycle();
        if !published {
            return self.sleep(store, SleepReason::PublishFailed);
        }
        info!("Batch published");
        self.sleep(store, SleepReason::Flushed)
    }

    fn sleep(&self, store: &CycleStore, reason: SleepReason) -> SleepRequest {
        SleepRequest {
            seconds: store.config().sleep_period_secs(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OperatingConfig;
    use crate::mock::{sensor, MockBattery, MockBus, MockTransport, SimClock};
    use crate::sample::SampleSource;
    use embassy_futures::block_on;

    const ACCEPTED: &str = "$aws/things/ESP32/shadow/get/accepted";
    const UPDATE: &str = "$aws/things/ESP32/shadow/update";
    const DATA: &str = "esp32/pub";

    type Controller = WakeController<MockBus, MockBattery, MockTransport, SimClock, SimClock>;

    fn controller(bus: MockBus, transport: MockTransport, clock: &SimClock) -> Controller {
        WakeController::new(
            bus,
            MockBattery::constant(2048),
            transport,
            clock.clone(),
            clock.clone(),
            NodeSettings::default(),
        )
        .unwrap()
    }

    /// Store past its first wake with the given batch and period
    fn store(batch: i64, period: i64, sensors: &[hal_abstractions::SensorId]) -> CycleStore {
        let mut store = CycleStore::new();
        store.register_sensors(sensors);
        store.apply(OperatingConfig::validate(batch, period).unwrap());
        store
    }

    fn desired(batch: i64, period: i64) -> std::string::String {
        std::format!(r#"{{"state":{{"desired":{{"batch":{},"period":{}}}}}}}"#, batch, period)
    }

    fn run(ctl: &mut Controller, store: &mut CycleStore) -> SleepRequest {
        block_on(ctl.run_wake(store))
    }

    #[test]
    fn test_cycle_count_climbs_then_flushes() {
        let clock = SimClock::new();
        let mut ctl = controller(MockBus::with_sensors(&[]), MockTransport::with_clock(&clock), &clock);
        let mut store = store(3, 10, &[]);

        for expected in 1..3u16 {
            let request = run(&mut ctl, &mut store);
            assert_eq!(request.reason, SleepReason::Accumulating);
            assert_eq!(request.seconds, 10);
            assert_eq!(store.cycle_count(), expected);
        }

        let request = run(&mut ctl, &mut store);
        assert_eq!(request.reason, SleepReason::Flushed);
        assert_eq!(store.cycle_count(), 0);
        assert_eq!(store.sample_count(), 0);
        assert_eq!(ctl.transport().published_to(DATA).len(), 1);
    }

    #[test]
    fn test_accumulate_does_not_connect() {
        let clock = SimClock::new();
        let mut ctl = controller(MockBus::with_sensors(&[]), MockTransport::with_clock(&clock), &clock);
        let mut store = store(5, 10, &[]);

        run(&mut ctl, &mut store);
        assert_eq!(ctl.transport().open_attempts, 0);
        assert!(ctl.transport().published.is_empty());
    }

    #[test]
    fn test_occupancy_tracks_cycles() {
        let clock = SimClock::new();
        let sensors = [sensor(1), sensor(2)];
        let mut ctl = controller(MockBus::with_sensors(&sensors), MockTransport::with_clock(&clock), &clock);
        let mut store = store(4, 10, &sensors);

        for _ in 0..3 {
            run(&mut ctl, &mut store);
            assert_eq!(store.sample_count(), usize::from(store.cycle_count()) * 3);
            assert!(store.sample_count() <= store.sample_bound());
        }
    }

    #[test]
    fn test_flush_payload_times() {
        let clock = SimClock::new();
        let mut ctl = controller(MockBus::with_sensors(&[]), MockTransport::with_clock(&clock), &clock);
        let mut store = store(3, 10, &[]);

        for _ in 0..3 {
            run(&mut ctl, &mut store);
        }

        let body = ctl.transport().published_to(DATA).remove(0);
        let json = std::string::String::from_utf8(body).unwrap();
        assert_eq!(json.matches("\"id\":\"VBAT\"").count(), 3);
        let times: std::vec::Vec<&str> = json.match_indices("\"time\":").map(|(i, _)| &json[i + 7..]).collect();
        assert!(times[0].starts_with("-20}"));
        assert!(times[1].starts_with("-10}"));
        assert!(times[2].starts_with("0}"));
    }

    #[test]
    fn test_flush_resets_regardless_of_contents() {
        let clock = SimClock::new();
        let sensors = [sensor(1)];
        let mut ctl = controller(MockBus::with_sensors(&sensors), MockTransport::with_clock(&clock), &clock);
        let mut store = store(1, 10, &sensors);

        let request = run(&mut ctl, &mut store);
        assert_eq!(request.reason, SleepReason::Flushed);
        assert_eq!(store.cycle_count(), 0);
        assert_eq!(store.sample_count(), 0);
        assert!(store.samples().is_empty());
        assert_eq!(store.sensors(), &sensors);
        assert!(!ctl.transport().connected);
    }

    #[test]
    fn test_connect_timeout_keeps_store_and_retries() {
        let clock = SimClock::new();
        let mut ctl = controller(MockBus::with_sensors(&[]), MockTransport::offline(&clock), &clock);
        let mut store = store(2, 10, &[]);

        run(&mut ctl, &mut store);
        let request = run(&mut ctl, &mut store);

        assert_eq!(request.reason, SleepReason::ConnectTimeout);
        assert_eq!(request.seconds, 10);
        assert_eq!(store.cycle_count(), 2);
        assert_eq!(store.sample_count(), 2);
        assert!(clock.now() >= 60_000);
        assert!(ctl.transport().published.is_empty());

        // Next wake: network is back, the pending flush goes out without a new sample
        let clock = SimClock::new();
        let mut ctl = controller(MockBus::with_sensors(&[]), MockTransport::with_clock(&clock), &clock);
        let request = run(&mut ctl, &mut store);

        assert_eq!(request.reason, SleepReason::Flushed);
        let body = ctl.transport().published_to(DATA).remove(0);
        let json = std::string::String::from_utf8(body).unwrap();
        assert_eq!(json.matches("VBAT").count(), 2);
        assert_eq!(store.cycle_count(), 0);
    }

    #[test]
    fn test_session_timeout() {
        let clock = SimClock::new();
        let mut transport = MockTransport::with_clock(&clock);
        transport.session_failures = u32::MAX;
        let mut ctl = controller(MockBus::with_sensors(&[]), transport, &clock);
        let mut store = store(1, 10, &[]);

        assert_eq!(
            block_on(ctl.connect()),
            Err(ConnectError::Timeout(ConnectStage::Session))
        );
        let request = run(&mut ctl, &mut store);
        assert_eq!(request.reason, SleepReason::ConnectTimeout);
        assert_eq!(store.cycle_count(), 1);
    }

    #[test]
    fn test_link_timeout() {
        let clock = SimClock::new();
        let mut ctl = controller(MockBus::with_sensors(&[]), MockTransport::offline(&clock), &clock);
        assert_eq!(
            block_on(ctl.connect()),
            Err(ConnectError::Timeout(ConnectStage::Link))
        );
        assert!(clock.now() >= 60_000);
        assert!(clock.now() < 61_000);
    }

    #[test]
    fn test_connect_waits_for_link_and_retries_session() {
        let clock = SimClock::new();
        let mut transport = MockTransport::with_clock(&clock);
        transport.link_up_at_ms = Some(1_200);
        transport.session_failures = 3;
        let mut ctl = controller(MockBus::with_sensors(&[]), transport, &clock);

        assert_eq!(block_on(ctl.connect()), Ok(()));
        assert_eq!(ctl.transport().open_attempts, 4);
        // link at 1500 (500 ms polls), then three 100 ms retries
        assert_eq!(clock.now(), 1_800);
    }

    #[test]
    fn test_publish_failure_drops_batch() {
        let clock = SimClock::new();
        let mut transport = MockTransport::with_clock(&clock);
        transport.fail_publish_to = Some(DATA.into());
        let mut ctl = controller(MockBus::with_sensors(&[]), transport, &clock);
        let mut store = store(1, 10, &[]);

        let request = run(&mut ctl, &mut store);
        assert_eq!(request.reason, SleepReason::PublishFailed);
        assert_eq!(store.cycle_count(), 0);
        assert_eq!(store.sample_count(), 0);
        assert!(!ctl.transport().connected);
    }

    #[test]
    fn test_publish_failure_after_config_change() {
        let clock = SimClock::new();
        let mut transport = MockTransport::with_clock(&clock);
        transport.fail_publish_to = Some(DATA.into());
        transport.respond(ACCEPTED, desired(2, 60).as_bytes());
        let mut ctl = controller(MockBus::with_sensors(&[]), transport, &clock);
        let mut store = store(5, 10, &[]);

        for _ in 0..4 {
            assert_eq!(run(&mut ctl, &mut store).reason, SleepReason::Accumulating);
        }
        let request = run(&mut ctl, &mut store);

        assert_eq!(request.reason, SleepReason::PublishFailed);
        assert_eq!(request.seconds, 60);
        assert_eq!(store.config().batch_size(), 2);
        assert!(store.cycle_count() <= u16::from(store.config().batch_size()));
        assert!(store.sample_count() <= store.sample_bound());
        // Owed report still went out with the adopted values
        assert_eq!(ctl.transport().published_to(UPDATE).len(), 1);

        // Next batch is recorded and timed entirely under the new config
        let clock = SimClock::new();
        let mut ctl = controller(MockBus::with_sensors(&[]), MockTransport::with_clock(&clock), &clock);
        assert_eq!(run(&mut ctl, &mut store).reason, SleepReason::Accumulating);
        assert_eq!(run(&mut ctl, &mut store).reason, SleepReason::Flushed);

        let body = ctl.transport().published_to(DATA).remove(0);
        let json = std::string::String::from_utf8(body).unwrap();
        let times: std::vec::Vec<&str> = json.match_indices("\"time\":").map(|(i, _)| &json[i + 7..]).collect();
        assert_eq!(times.len(), 2);
        assert!(times[0].starts_with("-60}"));
        assert!(times[1].starts_with("0}"));
    }

    #[test]
    fn test_flush_syncs_around_publish() {
        let clock = SimClock::new();
        let mut transport = MockTransport::with_clock(&clock);
        transport.respond(ACCEPTED, desired(4, 60).as_bytes());
        let mut ctl = controller(MockBus::with_sensors(&[]), transport, &clock);
        let mut store = store(1, 10, &[]);

        let request = run(&mut ctl, &mut store);

        assert_eq!(request.reason, SleepReason::Flushed);
        assert_eq!(request.seconds, 60);
        assert_eq!(store.config().batch_size(), 4);
        let topics: std::vec::Vec<&str> = ctl
            .transport()
            .published
            .iter()
            .map(|(topic, _)| topic.as_str())
            .collect();
        assert_eq!(topics, ["$aws/things/ESP32/shadow/get", DATA, UPDATE]);

        // Payload was encoded with the period the samples were taken under
        let body = ctl.transport().published_to(DATA).remove(0);
        assert!(std::string::String::from_utf8(body).unwrap().contains("\"time\":0"));
    }

    #[test]
    fn test_first_wake_fetches_config_before_sampling() {
        let clock = SimClock::new();
        let mut transport = MockTransport::with_clock(&clock);
        transport.respond(ACCEPTED, desired(2, 30).as_bytes());
        let mut ctl = controller(MockBus::with_sensors(&[sensor(9)]), transport, &clock);
        let mut store = CycleStore::new();

        let request = run(&mut ctl, &mut store);

        assert_eq!(request.reason, SleepReason::Accumulating);
        assert_eq!(request.seconds, 30);
        assert_eq!(store.config().batch_size(), 2);
        assert_eq!(store.sensors(), &[sensor(9)]);
        assert_eq!(store.sample_count(), 2);
        assert_eq!(ctl.transport().published_to(UPDATE).len(), 1);
        assert!(!ctl.transport().connected);
    }

    #[test]
    fn test_first_wake_session_reused_by_flush() {
        let clock = SimClock::new();
        let mut transport = MockTransport::with_clock(&clock);
        transport.respond(ACCEPTED, desired(1, 10).as_bytes());
        let mut ctl = controller(MockBus::with_sensors(&[]), transport, &clock);
        let mut store = CycleStore::new();

        let request = run(&mut ctl, &mut store);

        assert_eq!(request.reason, SleepReason::Flushed);
        assert_eq!(ctl.transport().open_attempts, 1);
        assert_eq!(ctl.transport().published_to(DATA).len(), 1);
    }

    #[test]
    fn test_first_wake_connect_timeout_skips_sampling() {
        let clock = SimClock::new();
        let mut ctl = controller(MockBus::with_sensors(&[sensor(1)]), MockTransport::offline(&clock), &clock);
        let mut store = CycleStore::new();

        let request = run(&mut ctl, &mut store);

        assert_eq!(request.reason, SleepReason::ConnectTimeout);
        assert!(store.is_discovered());
        assert_eq!(store.sample_count(), 0);

        // Discovery and initial sync are not repeated
        let request = run(&mut ctl, &mut store);
        assert_eq!(request.reason, SleepReason::Accumulating);
        assert_eq!(ctl.bus().discover_calls, 1);
        assert_eq!(store.sample_count(), 2);
    }

    #[test]
    fn test_zero_sensors_one_sample_per_wake() {
        let clock = SimClock::new();
        let mut ctl = controller(MockBus::with_sensors(&[]), MockTransport::with_clock(&clock), &clock);
        let mut store = CycleStore::new();

        run(&mut ctl, &mut store);
        run(&mut ctl, &mut store);

        assert_eq!(ctl.bus().discover_calls, 1);
        assert_eq!(store.cycle_count(), 2);
        assert_eq!(store.sample_count(), 2);
        assert!(store
            .samples()
            .iter()
            .all(|s| s.source == SampleSource::Battery));
    }

    #[test]
    fn test_rejects_invalid_data_topic() {
        let clock = SimClock::new();
        let settings = NodeSettings {
            data_topic: "sensors/#",
            ..NodeSettings::default()
        };
        let result = WakeController::new(
            MockBus::with_sensors(&[]),
            MockBattery::constant(0),
            MockTransport::with_clock(&clock),
            clock.clone(),
            clock.clone(),
            settings,
        );
        assert!(matches!(result, Err(TopicError::InvalidCharacter)));
    }
}
