//! Pub/sub capability consumed by workers.
//!
//! A [`Connector`] opens independent [`Session`]s; each session owns one broker
//! connection. Adapters live outside the core (see `mqstress-mqtt`), except for
//! the in-process [`memory::MemoryBroker`].

mod error;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

pub use error::BrokerError;

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    serde::Serialize,
)]
pub enum QoS {
    #[default]
    #[strum(to_string = "0", serialize = "at-most-once")]
    AtMostOnce,
    #[strum(to_string = "1", serialize = "at-least-once")]
    AtLeastOnce,
    #[strum(to_string = "2", serialize = "exactly-once")]
    ExactlyOnce,
}

impl QoS {
    #[must_use]
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(Self::AtMostOnce),
            1 => Some(Self::AtLeastOnce),
            2 => Some(Self::ExactlyOnce),
            _ => None,
        }
    }

    #[must_use]
    pub fn level(self) -> u8 {
        match self {
            Self::AtMostOnce => 0,
            Self::AtLeastOnce => 1,
            Self::ExactlyOnce => 2,
        }
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// PEM material loaded by the caller. Validation happens in the adapter.
#[derive(Debug, Clone, Default)]
pub struct TlsMaterial {
    pub ca: Option<Bytes>,
    pub cert: Option<Bytes>,
    pub key: Option<Bytes>,
}

impl TlsMaterial {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ca.is_none() && self.cert.is_none() && self.key.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub client_id: String,
    pub broker_url: Arc<str>,
    pub credentials: Option<Credentials>,
    pub tls: Option<Arc<TlsMaterial>>,
    /// Accept any server certificate on TLS connections.
    pub skip_tls_verification: bool,
    /// Upper bound for the connect acknowledgment.
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, opts: &SessionOptions) -> Result<Box<dyn Session>, BrokerError>;
}

#[async_trait]
pub trait Session: Send {
    async fn subscribe(&mut self, topic: &str, qos: QoS, timeout: Duration)
    -> Result<(), BrokerError>;

    /// Resolves once the broker acknowledged the message (QoS 1/2) or it was
    /// handed to the connection (QoS 0).
    async fn publish(
        &mut self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<(), BrokerError>;

    async fn unsubscribe(&mut self, topic: &str, timeout: Duration) -> Result<(), BrokerError>;

    /// Next message delivered to this session, `None` once the session is closed.
    ///
    /// Must be cancel-safe: workers race it against the stop signal.
    async fn recv(&mut self) -> Option<InboundMessage>;

    async fn disconnect(&mut self);
}
