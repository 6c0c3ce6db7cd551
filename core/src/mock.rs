//! Scripted collaborators for host tests

use std::cell::Cell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::string::String;
use std::vec::Vec;

use embedded_hal_async::delay::DelayNs;
use hal_abstractions::{BatteryMonitor, Incoming, SensorBus, SensorId, Transport, Uptime};

pub fn sensor(n: u8) -> SensorId {
    SensorId::new([0x28, n, 0x00, 0x00, 0x00, 0x00, 0x00, n])
}

/// Simulated clock; delays advance it instantly
#[derive(Clone, Default)]
pub struct SimClock {
    nanos: Rc<Cell<u64>>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> u64 {
        self.nanos.get() / 1_000_000
    }

    fn advance_ns(&self, ns: u64) {
        self.nanos.set(self.nanos.get() + ns);
    }
}

impl Uptime for SimClock {
    fn now_ms(&self) -> u64 {
        self.now()
    }
}

impl DelayNs for SimClock {
    async fn delay_ns(&mut self, ns: u32) {
        self.advance_ns(u64::from(ns));
    }

    async fn delay_us(&mut self, us: u32) {
        self.advance_ns(u64::from(us) * 1_000);
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.advance_ns(u64::from(ms) * 1_000_000);
    }
}

/// Bus with a fixed device list; reads default to 21.5 C unless scripted
pub struct MockBus {
    sensors: Vec<SensorId>,
    fail_discovery: bool,
    scripts: HashMap<SensorId, VecDeque<Result<f32, ()>>>,
    pub discover_calls: usize,
    pub reads: usize,
}

impl MockBus {
    pub fn with_sensors(sensors: &[SensorId]) -> Self {
        Self {
            sensors: sensors.to_vec(),
            fail_discovery: false,
            scripts: HashMap::new(),
            discover_calls: 0,
            reads: 0,
        }
    }

    pub fn failing_discovery() -> Self {
        Self {
            fail_discovery: true,
            ..Self::with_sensors(&[])
        }
    }

    pub fn script(&mut self, id: SensorId, results: &[Result<f32, ()>]) {
        self.scripts
            .entry(id)
            .or_default()
            .extend(results.iter().copied());
    }
}

impl SensorBus for MockBus {
    type Error = ();

    async fn discover<const N: usize>(
        &mut self,
        found: &mut heapless::Vec<SensorId, N>,
    ) -> Result<(), ()> {
        self.discover_calls += 1;
        if self.fail_discovery {
            return Err(());
        }
        for id in &self.sensors {
            if found.push(*id).is_err() {
                break;
            }
        }
        Ok(())
    }

    async fn read(&mut self, id: &SensorId) -> Result<f32, ()> {
        self.reads += 1;
        self.scripts
            .get_mut(id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(21.5))
    }
}

pub struct MockBattery {
    raw: u16,
    fail_after: Option<usize>,
    pub reads: usize,
}

impl MockBattery {
    pub fn constant(raw: u16) -> Self {
        Self {
            raw,
            fail_after: None,
            reads: 0,
        }
    }

    pub fn failing_after(reads: usize) -> Self {
        Self {
            fail_after: Some(reads),
            ..Self::constant(2048)
        }
    }
}

impl BatteryMonitor for MockBattery {
    type Error = ();

    async fn read_raw(&mut self) -> Result<u16, ()> {
        if self.fail_after.is_some_and(|n| self.reads >= n) {
            return Err(());
        }
        self.reads += 1;
        Ok(self.raw)
    }
}

/// Broker stand-in
///
/// Queued responses are handed out one per poll, in order.
pub struct MockTransport {
    clock: SimClock,
    /// `None`: the link never comes up
    pub link_up_at_ms: Option<u64>,
    /// Session attempts that fail before one succeeds
    pub session_failures: u32,
    pub fail_publish: bool,
    pub fail_publish_to: Option<String>,
    pub connected: bool,
    pub open_attempts: usize,
    pub polls: usize,
    pub subscriptions: Vec<String>,
    pub published: Vec<(String, Vec<u8>)>,
    inbox: VecDeque<(String, Vec<u8>)>,
}

impl MockTransport {
    pub fn with_clock(clock: &SimClock) -> Self {
        Self {
            clock: clock.clone(),
            link_up_at_ms: Some(0),
            session_failures: 0,
            fail_publish: false,
            fail_publish_to: None,
            connected: false,
            open_attempts: 0,
            polls: 0,
            subscriptions: Vec::new(),
            published: Vec::new(),
            inbox: VecDeque::new(),
        }
    }

    /// Link up, session opens at the first attempt
    pub fn online() -> Self {
        let mut transport = Self::with_clock(&SimClock::new());
        transport.connected = true;
        transport
    }

    pub fn offline(clock: &SimClock) -> Self {
        Self {
            link_up_at_ms: None,
            ..Self::with_clock(clock)
        }
    }

    pub fn respond(&mut self, topic: &str, payload: &[u8]) {
        self.inbox.push_back((topic.into(), payload.to_vec()));
    }

    pub fn published_to(&self, topic: &str) -> Vec<Vec<u8>> {
        self.published
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

impl Transport for MockTransport {
    type Error = &'static str;

    fn link_up(&mut self) -> bool {
        self.link_up_at_ms
            .is_some_and(|at| self.clock.now_ms() >= at)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn open_session(&mut self) -> Result<(), Self::Error> {
        self.open_attempts += 1;
        if self.session_failures > 0 {
            self.session_failures = self.session_failures.saturating_sub(1);
            return Err("handshake failed");
        }
        self.connected = true;
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error> {
        if !self.connected {
            return Err("not connected");
        }
        self.subscriptions.push(topic.into());
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), Self::Error> {
        if !self.connected {
            return Err("not connected");
        }
        if self.fail_publish || self.fail_publish_to.as_deref() == Some(topic) {
            return Err("publish failed");
        }
        self.published.push((topic.into(), payload.to_vec()));
        Ok(())
    }

    async fn poll(&mut self, wait_ms: u32, buf: &mut [u8]) -> Result<Option<Incoming>, Self::Error> {
        self.polls += 1;
        let Some((topic, payload)) = self.inbox.pop_front() else {
            self.clock.advance_ns(u64::from(wait_ms) * 1_000_000);
            return Ok(None);
        };
        let copied = payload.len().min(buf.len());
        buf[..copied].copy_from_slice(&payload[..copied]);
        let mut incoming_topic = heapless::String::new();
        incoming_topic
            .push_str(&topic)
            .map_err(|_| "topic too long")?;
        Ok(Some(Incoming {
            topic: incoming_topic,
            len: payload.len(),
        }))
    }

    async fn disconnect(&mut self) {
        self.connected = false;
    }
}
