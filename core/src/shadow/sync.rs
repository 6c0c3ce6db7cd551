//! Desired/reported exchange over an open session
//!
//! The exchange is split in two halves so a flush can publish its batch in
//! between: [`fetch_desired`] requests the document and applies what
//! validates, [`report_effective`] tells the remote side what the node is
//! actually running with. [`sync`] runs both back to back.
//!
//! Nothing here fails the wake. Transport and payload errors are logged
//! and read as "no response".

use hal_abstractions::Transport;

use crate::config::{OperatingConfig, ReportPolicy};
use crate::fmt::Debug2Format;
use crate::store::CycleStore;

use super::document::{
    encode_reported, parse_desired, Desired, GET_REQUEST, REPORT_CAPACITY, RESPONSE_CAPACITY,
};
use super::topics::ShadowTopics;

/// Result of one desired-state fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SyncOutcome {
    /// A well-formed response arrived
    pub responded: bool,
    /// A reported-state update is owed
    pub changed: bool,
    /// The desired values validated and were adopted
    pub applied: bool,
}

impl SyncOutcome {
    const NO_RESPONSE: Self = Self {
        responded: false,
        changed: false,
        applied: false,
    };
}

/// Reconcile `store` with a desired-state response
///
/// Validation gates the apply only; under [`ReportPolicy::OnAnyDifference`]
/// a rejected value that differs from the local one still owes a report.
pub fn evaluate(store: &mut CycleStore, desired: Desired, policy: ReportPolicy) -> SyncOutcome {
    let before = store.config();
    let differs = before.differs_from(desired.batch, desired.period);

    let applied = match OperatingConfig::validate(desired.batch, desired.period) {
        Ok(validated) => {
            store.apply(validated);
            true
        }
        Err(e) => {
            warn!(
                "Rejected desired batch={} period={}: {:?}",
                desired.batch, desired.period, e
            );
            false
        }
    };

    let changed = match policy {
        ReportPolicy::OnAnyDifference => differs,
        ReportPolicy::OnApplied => applied && store.config() != before,
    };

    if applied && store.config() != before {
        info!(
            "Adopted batch={} period={}s",
            store.config().batch_size(),
            store.config().sleep_period_secs()
        );
    }

    SyncOutcome {
        responded: true,
        changed,
        applied,
    }
}

/// Request the desired state and apply what validates
pub async fn fetch_desired<T: Transport>(
    transport: &mut T,
    topics: &ShadowTopics,
    store: &mut CycleStore,
    attempts: u8,
    interval_ms: u32,
    policy: ReportPolicy,
) -> SyncOutcome {
    if let Err(e) = transport.subscribe(&topics.get_accepted).await {
        warn!("Shadow subscribe failed: {:?}", Debug2Format(&e));
        return SyncOutcome::NO_RESPONSE;
    }
    if let Err(e) = transport.publish(&topics.get, GET_REQUEST).await {
        warn!("Shadow get failed: {:?}", Debug2Format(&e));
        return SyncOutcome::NO_RESPONSE;
    }

    let mut latest: Option<Desired> = None;
    let mut buf = [0u8; RESPONSE_CAPACITY];
    for _ in 0..attempts {
        match transport.poll(interval_ms, &mut buf).await {
            Ok(Some(msg)) if msg.len > buf.len() => {
                warn!("Ignoring {} byte message on {}", msg.len, msg.topic.as_str());
            }
            Ok(Some(msg)) if msg.topic == topics.get_accepted => {
                match parse_desired(&buf[..msg.len]) {
                    Ok(desired) => latest = Some(desired),
                    Err(e) => debug!("Ignoring shadow document: {:?}", e),
                }
            }
            Ok(Some(msg)) => trace!("Ignoring message on {}", msg.topic.as_str()),
            Ok(None) => {}
            Err(e) => {
                warn!("Shadow poll failed: {:?}", Debug2Format(&e));
                break;
            }
        }
    }

    match latest {
        Some(desired) => {
            debug!("Desired batch={} period={}", desired.batch, desired.period);
            evaluate(store, desired, policy)
        }
        None => {
            info!("No shadow response");
            SyncOutcome::NO_RESPONSE
        }
    }
}

/// Publish the effective configuration as the reported state
///
/// Returns whether the update went out.
pub async fn report_effective<T: Transport>(
    transport: &mut T,
    topics: &ShadowTopics,
    config: &OperatingConfig,
) -> bool {
    let mut buf = [0u8; REPORT_CAPACITY];
    let len = match encode_reported(config, &mut buf) {
        Ok(len) => len,
        Err(e) => {
            error!("Reported state does not fit: {:?}", e);
            return false;
        }
    };

    match transport.publish(&topics.update, &buf[..len]).await {
        Ok(()) => {
            info!(
                "Reported batch={} period={}s",
                config.batch_size(),
                config.sleep_period_secs()
            );
            true
        }
        Err(e) => {
            warn!("Shadow update failed: {:?}", Debug2Format(&e));
            false
        }
    }
}

/// Full exchange: fetch, apply, report when owed
pub async fn sync<T: Transport>(
    transport: &mut T,
    topics: &ShadowTopics,
    store: &mut CycleStore,
    attempts: u8,
    interval_ms: u32,
    policy: ReportPolicy,
) -> SyncOutcome {
    let outcome = fetch_desired(transport, topics, store, attempts, interval_ms, policy).await;
    if outcome.changed {
        report_effective(transport, topics, &store.config()).await;
    }
    outcome
}
