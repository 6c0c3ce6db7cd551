//! Network transport trait
//!
//! One implementation per board: link bring-up (DHCP, Wi-Fi association, ...)
//! plus a publish/subscribe session on top of it (MQTT over TLS).
//! A session is opened at most once per wake and is never pooled across
//! deep sleep.

use core::fmt;

/// Maximum MQTT topic length accepted by the transport
pub const MAX_TOPIC_LEN: usize = 96;

/// Descriptor of a message delivered by [`Transport::poll`]
///
/// The payload itself is copied into the caller's buffer. `len` is the full
/// payload length; when it exceeds the buffer only the first `buf.len()`
/// bytes were copied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incoming {
    pub topic: heapless::String<MAX_TOPIC_LEN>,
    pub len: usize,
}

#[allow(async_fn_in_trait)]
pub trait Transport {
    type Error: fmt::Debug;

    /// Whether the network link is up (address configured, associated)
    fn link_up(&mut self) -> bool;

    /// Whether an application session is currently open
    fn is_connected(&self) -> bool;

    /// Single attempt to open the application session (TCP, TLS, MQTT CONNECT)
    async fn open_session(&mut self) -> Result<(), Self::Error>;

    async fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error>;

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), Self::Error>;

    /// Wait up to `wait_ms` for one incoming message and copy its payload into `buf`
    ///
    /// Returns `Ok(None)` when nothing arrived in time. A payload larger than
    /// `buf` is truncated, not an error; see [`Incoming::len`].
    async fn poll(&mut self, wait_ms: u32, buf: &mut [u8]) -> Result<Option<Incoming>, Self::Error>;

    /// Close the session; the link stays up
    async fn disconnect(&mut self);
}
