//! Network client modules
//!
//! - **`config`**: broker and stack configuration
//! - **`error`**: error types shared by the socket, TLS and MQTT layers
//! - **`socket`**: `embedded-io-async` adapter over the embassy-net TCP socket
//! - **`mqtt`**: MQTT v5 over TLS 1.3, exposed to the core as a `Transport`

pub mod config;
pub mod error;
mod mqtt;
mod socket;

pub use config::{MqttConfig, NetworkConfig};
pub use error::NetworkError;
pub use mqtt::MqttTransport;
