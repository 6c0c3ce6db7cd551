#![deny(unsafe_code)]
//! Network configuration structures

/// MQTT session configuration
#[derive(Debug, Clone, Copy)]
pub struct MqttConfig {
    /// Broker hostname or IP literal (for DNS and SNI)
    pub broker_host: &'static str,
    /// Broker port (typically 8883 for MQTTS)
    pub broker_port: u16,
    /// Keep-alive interval in seconds, 0 disables it
    pub keep_alive_secs: u16,
    /// Clean start flag (true = new session)
    pub clean_start: bool,
    /// Ceiling for one session attempt: DNS, TCP, TLS handshake and CONNACK
    pub session_timeout_ms: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: "192.168.1.1",
            broker_port: 8883,
            keep_alive_secs: 60,
            clean_start: true,
            session_timeout_ms: 20_000,
        }
    }
}

/// Network stack configuration
#[derive(Debug, Clone, Copy)]
pub struct NetworkConfig {
    /// MAC address for Ethernet
    pub mac_addr: [u8; 6],
    /// Random seed for network stack
    pub seed: u64,
}

impl NetworkConfig {
    /// Derive a stable, locally administered MAC and a stack seed from the chip UID
    pub fn from_uid(uid: &[u8; 12]) -> Self {
        let mut mac_addr = [0x02, 0, 0, 0, 0, 0];
        // Last five UID bytes carry the wafer position and lot, which differ per chip
        mac_addr[1..].copy_from_slice(&uid[7..]);

        let mut seed_bytes = [0u8; 8];
        seed_bytes.copy_from_slice(&uid[..8]);
        Self {
            mac_addr,
            seed: u64::from_le_bytes(seed_bytes) ^ (u64::from(uid[11]) << 56),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mac_addr: [0x02, 0x00, 0x00, 0x12, 0x34, 0x56],
            seed: 0x1234_5678_u64,
        }
    }
}
