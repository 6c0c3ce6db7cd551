//! Device shadow synchronisation
//!
//! Keeps the node's batch size and sleep period in line with the
//! `desired` section of a remote shadow document and reports the effective
//! values back under `reported`.

pub mod document;
pub mod sync;
pub mod topics;

pub use document::{parse_desired, Desired};
pub use sync::{evaluate, fetch_desired, report_effective, sync, SyncOutcome};
pub use topics::{check_topic_name, ShadowTopics};
