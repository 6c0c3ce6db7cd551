#![deny(unsafe_code)]
//! Device identity for STM32F405
//!
//! The factory-programmed 96-bit unique ID is stable across reboots and
//! deep sleep, so it gives every board its own MQTT client id and shadow
//! thing name without provisioning.

use heapless::String;
use static_cell::StaticCell;

/// `feather-` (8 chars) + 24 hex chars
const DEVICE_ID_MAX_LEN: usize = 32;

const PREFIX: &str = "feather-";

static DEVICE_ID: StaticCell<String<DEVICE_ID_MAX_LEN>> = StaticCell::new();

/// Get the STM32F405 unique device ID as a 24-character hex string
pub fn uid_hex() -> &'static str {
    embassy_stm32::uid::uid_hex()
}

/// Build the device id `feather-{24_hex_chars}`
///
/// Call once per boot; the result lives for the rest of the wake.
pub fn device_id() -> &'static str {
    let id: &'static String<DEVICE_ID_MAX_LEN> = DEVICE_ID.init(format_device_id(uid_hex()));
    id.as_str()
}

fn format_device_id(uid: &str) -> String<DEVICE_ID_MAX_LEN> {
    let mut id = String::new();
    // Both parts fit: 8 + 24 == DEVICE_ID_MAX_LEN
    let _ = id.push_str(PREFIX);
    let _ = id.push_str(uid);
    id
}
