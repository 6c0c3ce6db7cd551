#![deny(unsafe_code)]
//! Network client error types

use defmt::Format;

/// TLS layer failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum TlsError {
    HandshakeFailed,
}

/// MQTT layer failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum MqttError {
    ConnectionFailed,
    SubscribeFailed,
    PublishFailed,
    ReceiveFailed,
    /// Topic or client id rejected by the MQTT string types
    ProtocolError,
    /// Incoming topic longer than the transport's topic buffer
    BufferError,
}

/// Network client operation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum NetworkError {
    /// DNS resolution failed
    DnsError,
    /// Socket connect, read or write error
    SocketError,
    /// Session attempt exceeded its deadline
    Timeout,
    /// Operation needs an open session
    NotConnected,
    Tls(TlsError),
    Mqtt(MqttError),
}

impl From<TlsError> for NetworkError {
    fn from(e: TlsError) -> Self {
        Self::Tls(e)
    }
}

impl From<MqttError> for NetworkError {
    fn from(e: MqttError) -> Self {
        Self::Mqtt(e)
    }
}

impl core::fmt::Display for NetworkError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::DnsError => write!(f, "DNS resolution failed"),
            Self::SocketError => write!(f, "Socket error"),
            Self::Timeout => write!(f, "Session attempt timed out"),
            Self::NotConnected => write!(f, "No open session"),
            Self::Tls(TlsError::HandshakeFailed) => write!(f, "TLS handshake failed"),
            Self::Mqtt(MqttError::ConnectionFailed) => write!(f, "MQTT connection failed"),
            Self::Mqtt(MqttError::SubscribeFailed) => write!(f, "MQTT subscribe failed"),
            Self::Mqtt(MqttError::PublishFailed) => write!(f, "MQTT publish failed"),
            Self::Mqtt(MqttError::ReceiveFailed) => write!(f, "MQTT receive failed"),
            Self::Mqtt(MqttError::ProtocolError) => write!(f, "MQTT protocol error"),
            Self::Mqtt(MqttError::BufferError) => write!(f, "MQTT buffer error"),
        }
    }
}

impl core::error::Error for NetworkError {}

impl embedded_io_async::Error for NetworkError {
    fn kind(&self) -> embedded_io_async::ErrorKind {
        match self {
            Self::SocketError | Self::NotConnected => embedded_io_async::ErrorKind::BrokenPipe,
            Self::Timeout => embedded_io_async::ErrorKind::TimedOut,
            _ => embedded_io_async::ErrorKind::Other,
        }
    }
}
