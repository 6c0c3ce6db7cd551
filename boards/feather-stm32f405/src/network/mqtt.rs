//! MQTT v5.0 session over TLS 1.3
//!
//! [`MqttTransport`] is the board's [`Transport`]: the link is the DHCP
//! configured W5500 stack, the session is one MQTT client on a TLS 1.3
//! connection to the broker.
//!
//! # Memory Management
//!
//! The open session borrows the static buffers from
//! [`session_buffers`](crate::session_buffers) for `'static`, so it can be
//! held across the controller's calls. Opening a new session drops the
//! previous one before the buffers are taken again.

#![allow(unsafe_code)] // Session buffer access and unchecked topic construction

use defmt::{debug, error, info, warn, Debug2Format};
use embassy_net::{dns::DnsQueryType, IpEndpoint, Stack};
use embassy_stm32::peripherals::RNG;
use embassy_stm32::rng::Rng;
use embassy_time::{with_deadline, with_timeout, Duration, Instant};
use embedded_tls::{
    Aes128GcmSha256, CryptoProvider, NoVerify, TlsConfig, TlsConnection, TlsContext, TlsVerifier,
};
use hal_abstractions::{Incoming, Transport};
use heapless::String;
use rust_mqtt::{
    buffer::BumpBuffer,
    client::{
        event::Event,
        options::{ConnectOptions, PublicationOptions, SubscriptionOptions, TopicReference},
        Client,
    },
    config::{KeepAlive, SessionExpiryInterval},
    types::{MqttString, QoS, TopicFilter, TopicName},
    Bytes,
};

use crate::session_buffers;

use super::config::MqttConfig;
use super::error::{MqttError, NetworkError, TlsError};
use super::socket::AsyncTcpSocket;

type TlsStream = TlsConnection<'static, AsyncTcpSocket<'static>, Aes128GcmSha256>;

type Session = Client<'static, TlsStream, BumpBuffer<'static>, 1, 1, 1, 0>;

/// Simple crypto provider that wraps an RNG for TLS operations
struct SimpleCryptoProvider<'a, R> {
    rng: &'a mut R,
    verifier: NoVerify,
}

impl<'a, R> SimpleCryptoProvider<'a, R> {
    fn new(rng: &'a mut R) -> Self {
        Self {
            rng,
            verifier: NoVerify,
        }
    }
}

impl<R> CryptoProvider for SimpleCryptoProvider<'_, R>
where
    R: rand_core::CryptoRngCore,
{
    type CipherSuite = Aes128GcmSha256;
    type Signature = &'static [u8];

    fn rng(&mut self) -> impl rand_core::CryptoRngCore {
        &mut *self.rng
    }

    fn verifier(
        &mut self,
    ) -> Result<&mut impl TlsVerifier<Self::CipherSuite>, embedded_tls::TlsError> {
        Ok(&mut self.verifier)
    }
}

/// Ethernet link plus one MQTT session
pub struct MqttTransport {
    stack: Stack<'static>,
    rng: Rng<'static, RNG>,
    config: MqttConfig,
    client_id: &'static str,
    session: Option<Session>,
}

impl MqttTransport {
    pub fn new(
        stack: Stack<'static>,
        rng: Rng<'static, RNG>,
        config: MqttConfig,
        client_id: &'static str,
    ) -> Self {
        Self {
            stack,
            rng,
            config,
            client_id,
            session: None,
        }
    }

    async fn resolve(&self) -> Result<IpEndpoint, NetworkError> {
        let server_ip = self
            .stack
            .dns_query(self.config.broker_host, DnsQueryType::A)
            .await
            .map_err(|e| {
                error!("DNS query failed: {:?}", Debug2Format(&e));
                NetworkError::DnsError
            })?
            .first()
            .copied()
            .ok_or_else(|| {
                error!("DNS returned no results for {}", self.config.broker_host);
                NetworkError::DnsError
            })?;

        let endpoint = IpEndpoint::new(server_ip, self.config.broker_port);
        debug!(
            "Resolved {} to {}",
            self.config.broker_host,
            Debug2Format(&endpoint)
        );
        Ok(endpoint)
    }

    /// DNS, TCP, TLS handshake and MQTT CONNECT
    async fn establish(&mut self) -> Result<Session, NetworkError> {
        let endpoint = self.resolve().await?;

        // SAFETY: open_session dropped any previous session before calling us,
        // and the transport is only driven from the wake task.
        let buffers = unsafe { session_buffers::take() };

        let mut socket = AsyncTcpSocket::new(self.stack, buffers.tcp_rx, buffers.tcp_tx);
        socket.connect(endpoint).await?;
        debug!("TCP connection established to {}", Debug2Format(&endpoint));

        let tls_config = TlsConfig::new().with_server_name(self.config.broker_host);
        let mut tls: TlsStream = TlsConnection::new(socket, buffers.tls_read, buffers.tls_write);
        let provider = SimpleCryptoProvider::new(&mut self.rng);
        tls.open(TlsContext::new(&tls_config, provider))
            .await
            .map_err(|e| {
                error!("TLS handshake failed: {:?}", Debug2Format(&e));
                TlsError::HandshakeFailed
            })?;
        debug!("TLS 1.3 handshake completed");

        let mut client: Session = Client::new(buffers.mqtt);
        let connect_opts = ConnectOptions {
            session_expiry_interval: SessionExpiryInterval::EndOnDisconnect,
            clean_start: self.config.clean_start,
            keep_alive: if self.config.keep_alive_secs == 0 {
                KeepAlive::Infinite
            } else {
                KeepAlive::Seconds(self.config.keep_alive_secs)
            },
            will: None,
            user_name: None,
            password: None,
        };
        let client_id = MqttString::new(self.client_id.into()).map_err(|e| {
            error!("Invalid MQTT client id: {:?}", Debug2Format(&e));
            MqttError::ProtocolError
        })?;

        client
            .connect(tls, &connect_opts, Some(client_id))
            .await
            .map_err(|e| {
                error!("MQTT connect failed: {:?}", Debug2Format(&e));
                MqttError::ConnectionFailed
            })?;
        Ok(client)
    }

    fn session(&mut self) -> Result<&mut Session, NetworkError> {
        self.session.as_mut().ok_or(NetworkError::NotConnected)
    }

    /// Drop the session after a transport-level failure
    fn fail<T>(&mut self, e: MqttError) -> Result<T, NetworkError> {
        self.session = None;
        Err(e.into())
    }
}

impl Transport for MqttTransport {
    type Error = NetworkError;

    fn link_up(&mut self) -> bool {
        self.stack.is_config_up()
    }

    fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    async fn open_session(&mut self) -> Result<(), NetworkError> {
        self.session = None;
        info!(
            "Connecting to MQTT broker at {}:{}",
            self.config.broker_host, self.config.broker_port
        );

        let timeout = Duration::from_millis(self.config.session_timeout_ms);
        let client = with_timeout(timeout, self.establish())
            .await
            .map_err(|_| NetworkError::Timeout)??;

        info!("MQTT session open as {}", self.client_id);
        self.session = Some(client);
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), NetworkError> {
        let filter = MqttString::new(topic.into()).map_err(|_| MqttError::ProtocolError)?;
        // SAFETY: topics are checked for wildcards and NUL before they get here
        let filter = unsafe { TopicFilter::new_unchecked(filter) };

        let result = self
            .session()?
            .subscribe(filter, SubscriptionOptions::default())
            .await;
        match result {
            Ok(_) => {
                debug!("Subscribed to {}", topic);
                Ok(())
            }
            Err(e) => {
                warn!("Subscribe to {} failed: {:?}", topic, Debug2Format(&e));
                self.fail(MqttError::SubscribeFailed)
            }
        }
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), NetworkError> {
        let name = MqttString::new(topic.into()).map_err(|_| MqttError::ProtocolError)?;
        // SAFETY: topics are checked for wildcards and NUL before they get here
        let name = unsafe { TopicName::new_unchecked(name) };
        let options = PublicationOptions {
            retain: false,
            message_expiry_interval: None,
            topic: TopicReference::Name(name),
            qos: QoS::AtMostOnce,
        };

        let result = self
            .session()?
            .publish(&options, Bytes::from(payload))
            .await;
        match result {
            Ok(_) => {
                debug!("Published {} bytes to {}", payload.len(), topic);
                Ok(())
            }
            Err(e) => {
                warn!("Publish to {} failed: {:?}", topic, Debug2Format(&e));
                self.fail(MqttError::PublishFailed)
            }
        }
    }

    async fn poll(
        &mut self,
        wait_ms: u32,
        buf: &mut [u8],
    ) -> Result<Option<Incoming>, NetworkError> {
        let deadline = Instant::now() + Duration::from_millis(u64::from(wait_ms));
        loop {
            let session = self.session()?;
            let event = match with_deadline(deadline, session.poll()).await {
                Err(_) => return Ok(None),
                Ok(Err(e)) => {
                    warn!("MQTT receive failed: {:?}", Debug2Format(&e));
                    return self.fail(MqttError::ReceiveFailed);
                }
                Ok(Ok(event)) => event,
            };

            let publish = match event {
                Event::Publish(publish) => publish,
                _ => {
                    debug!("MQTT event ignored");
                    continue;
                }
            };

            let payload: &[u8] = publish.message.as_ref();
            let copied = payload.len().min(buf.len());
            if copied < payload.len() {
                debug!(
                    "Incoming message of {} bytes truncated to {} byte buffer",
                    payload.len(),
                    buf.len()
                );
            }
            buf[..copied].copy_from_slice(&payload[..copied]);

            let mut topic = String::new();
            topic
                .push_str(publish.topic.as_ref())
                .map_err(|_| MqttError::BufferError)?;
            return Ok(Some(Incoming {
                topic,
                len: payload.len(),
            }));
        }
    }

    async fn disconnect(&mut self) {
        if self.session.take().is_some() {
            info!("MQTT session closed");
        }
    }
}
