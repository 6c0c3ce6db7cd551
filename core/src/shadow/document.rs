//! Shadow document wire format
//!
//! Only `state.desired.batch` and `state.desired.period` are read from a
//! `get/accepted` response; every other member (`reported`, `delta`,
//! `metadata`, `version`, ...) is skipped.

use serde::{Deserialize, Serialize};

use crate::config::OperatingConfig;
use crate::error::PayloadError;

/// Body of a `get` request
pub const GET_REQUEST: &[u8] = b"{}";

/// Largest `get/accepted` document accepted
pub const RESPONSE_CAPACITY: usize = 1024;

/// Largest reported-state update produced
pub const REPORT_CAPACITY: usize = 64;

/// Desired values as sent by the remote side, before validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Desired {
    pub batch: i64,
    pub period: i64,
}

#[derive(Deserialize)]
struct Response {
    state: ResponseState,
}

#[derive(Deserialize)]
struct ResponseState {
    #[serde(default)]
    desired: Option<DesiredFields>,
}

#[derive(Deserialize)]
struct DesiredFields {
    #[serde(default)]
    batch: Option<i64>,
    #[serde(default)]
    period: Option<i64>,
}

#[derive(Serialize)]
struct Update {
    state: UpdateState,
}

#[derive(Serialize)]
struct UpdateState {
    reported: Reported,
}

#[derive(Serialize)]
struct Reported {
    batch: u8,
    period: u32,
}

/// Extract the desired values from a `get/accepted` document
///
/// A document without both members is as good as no document.
pub fn parse_desired(payload: &[u8]) -> Result<Desired, PayloadError> {
    let (response, _) = serde_json_core::from_slice::<Response>(payload)?;
    let desired = response.state.desired.ok_or(PayloadError::Malformed)?;
    match (desired.batch, desired.period) {
        (Some(batch), Some(period)) => Ok(Desired { batch, period }),
        _ => Err(PayloadError::Malformed),
    }
}

/// Encode `{"state":{"reported":{"batch":..,"period":..}}}` into `buf`
pub fn encode_reported(config: &OperatingConfig, buf: &mut [u8]) -> Result<usize, PayloadError> {
    let update = Update {
        state: UpdateState {
            reported: Reported {
                batch: config.batch_size(),
                period: config.sleep_period_secs(),
            },
        },
    };
    Ok(serde_json_core::to_slice(&update, buf)?)
}
