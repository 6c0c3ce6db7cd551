#![deny(unsafe_code)]
//! Build-time node settings
//!
//! Values come from `build.rs` (environment or `.env`), with defaults for
//! anything left unset.

use batch_node_core::config::BatteryScale;
use batch_node_core::NodeSettings;
use defmt::warn;

use crate::network::MqttConfig;

const DEFAULT_BROKER_HOST: &str = "192.168.1.1";
const DEFAULT_BROKER_PORT: u16 = 8883;
const DEFAULT_DATA_TOPIC: &str = "esp32/pub";

/// ADC reference (3.3 V) times the Feather's 1:2 battery divider
const FULL_SCALE_VOLTS: f32 = 6.6;

/// Broker endpoint and session options
pub fn mqtt_config() -> MqttConfig {
    MqttConfig {
        broker_host: option_env!("BROKER_HOST").unwrap_or(DEFAULT_BROKER_HOST),
        broker_port: broker_port(),
        ..MqttConfig::default()
    }
}

/// Core settings for this board
///
/// The thing name defaults to the UID-derived `device_id` so every board
/// has its own shadow. It doubles as the MQTT client id.
pub fn node_settings(device_id: &'static str) -> NodeSettings {
    NodeSettings {
        thing_name: option_env!("THING_NAME").unwrap_or(device_id),
        data_topic: option_env!("DATA_TOPIC").unwrap_or(DEFAULT_DATA_TOPIC),
        battery: BatteryScale {
            full_scale_volts: FULL_SCALE_VOLTS,
            ..BatteryScale::default()
        },
        ..NodeSettings::default()
    }
}

fn broker_port() -> u16 {
    match option_env!("BROKER_PORT").map(str::parse::<u16>) {
        None => DEFAULT_BROKER_PORT,
        Some(Ok(port)) => port,
        Some(Err(_)) => {
            warn!("BROKER_PORT is not a port number, using {}", DEFAULT_BROKER_PORT);
            DEFAULT_BROKER_PORT
        }
    }
}
