use std::sync::Arc;
use std::time::Duration;

use crate::broker::{Credentials, QoS, SessionOptions, TlsMaterial};
use crate::payload::PayloadGenerator;

use super::error::{Error, Result};

pub const DEFAULT_RAMP_UP_SIZE: usize = 100;
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);
pub const DEFAULT_TOPIC_BASE: &str = "internal/mqstress";

/// Connection settings shared by every session of a run.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub broker_url: Arc<str>,
    pub credentials: Option<Credentials>,
    pub tls: Option<Arc<TlsMaterial>>,
    pub skip_tls_verification: bool,
}

impl ClientSettings {
    pub fn new(broker_url: impl Into<Arc<str>>) -> Self {
        Self {
            broker_url: broker_url.into(),
            credentials: None,
            tls: None,
            skip_tls_verification: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub clients: usize,
    pub messages: u64,
    pub client: Arc<ClientSettings>,
    pub payload: Arc<PayloadGenerator>,

    /// Per-operation timeout (connect, subscribe, publish ack, unsubscribe).
    pub timeout: Duration,
    pub pause_between_messages: Duration,
    pub publisher_qos: QoS,
    pub subscriber_qos: QoS,
    pub retain: bool,

    pub topic_base: Arc<str>,
    /// Host identity mixed into topic names and client ids.
    pub host: Arc<str>,

    /// Workers started per ramp-up batch. `0` falls back to [`DEFAULT_RAMP_UP_SIZE`].
    pub ramp_up_size: usize,
    pub ramp_up_delay: Duration,

    /// Deadline for the whole run, measured from the moment it begins.
    pub global_timeout: Duration,
    /// Time workers get to unwind after the run was stopped.
    pub grace_period: Duration,
}

impl RunConfig {
    pub fn new(client: ClientSettings) -> Self {
        Self {
            clients: 10,
            messages: 10,
            client: Arc::new(client),
            payload: Arc::new(PayloadGenerator::Indexed),
            timeout: Duration::from_secs(5),
            pause_between_messages: Duration::ZERO,
            publisher_qos: QoS::AtMostOnce,
            subscriber_qos: QoS::AtMostOnce,
            retain: false,
            topic_base: Arc::from(DEFAULT_TOPIC_BASE),
            host: Arc::from(host_identity()),
            ramp_up_size: DEFAULT_RAMP_UP_SIZE,
            ramp_up_delay: Duration::from_millis(500),
            global_timeout: Duration::from_secs(60),
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.clients == 0 {
            return Err(Error::InvalidClients);
        }
        if self.messages == 0 {
            return Err(Error::InvalidMessages);
        }
        if self.global_timeout.is_zero() {
            return Err(Error::InvalidGlobalTimeout);
        }
        Ok(())
    }

    #[must_use]
    pub fn effective_ramp_up_size(&self) -> usize {
        if self.ramp_up_size == 0 {
            DEFAULT_RAMP_UP_SIZE
        } else {
            self.ramp_up_size
        }
    }

    /// Worst case number of results in flight: one per message and worker,
    /// capped at what a bounded tokio channel accepts.
    #[must_use]
    pub fn result_capacity(&self) -> usize {
        let messages = usize::try_from(self.messages).unwrap_or(usize::MAX);
        self.clients
            .saturating_mul(messages)
            .clamp(1, tokio::sync::Semaphore::MAX_PERMITS)
    }

    #[must_use]
    pub fn total_messages(&self) -> u64 {
        (self.clients as u64).saturating_mul(self.messages)
    }

    /// Snapshot of the per-worker parameters, moved into the worker task.
    #[must_use]
    pub fn worker(&self, worker_id: usize) -> WorkerConfig {
        WorkerConfig {
            worker_id,
            client: self.client.clone(),
            host: self.host.clone(),
            topic_base: self.topic_base.clone(),
            messages: self.messages,
            payload: self.payload.clone(),
            timeout: self.timeout,
            pause_between_messages: self.pause_between_messages,
            publisher_qos: self.publisher_qos,
            subscriber_qos: self.subscriber_qos,
            retain: self.retain,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: usize,
    pub client: Arc<ClientSettings>,
    pub host: Arc<str>,
    pub topic_base: Arc<str>,
    pub messages: u64,
    pub payload: Arc<PayloadGenerator>,
    pub timeout: Duration,
    pub pause_between_messages: Duration,
    pub publisher_qos: QoS,
    pub subscriber_qos: QoS,
    pub retain: bool,
}

impl WorkerConfig {
    #[must_use]
    pub fn session_options(&self, client_id: &str) -> SessionOptions {
        SessionOptions {
            client_id: client_id.to_string(),
            broker_url: self.client.broker_url.clone(),
            credentials: self.client.credentials.clone(),
            tls: self.client.tls.clone(),
            skip_tls_verification: self.client.skip_tls_verification,
            timeout: self.timeout,
        }
    }
}

/// Hostname of this machine, or `localhost` when it cannot be determined.
#[must_use]
pub fn host_identity() -> String {
    sysinfo::System::host_name()
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> RunConfig {
        RunConfig::new(ClientSettings::new("mem://test"))
    }

    #[test]
    fn validate_rejects_zero_clients_and_messages() {
        let mut c = cfg();
        c.clients = 0;
        assert!(matches!(c.validate(), Err(Error::InvalidClients)));

        let mut c = cfg();
        c.messages = 0;
        assert!(matches!(c.validate(), Err(Error::InvalidMessages)));

        let mut c = cfg();
        c.global_timeout = Duration::ZERO;
        assert!(matches!(c.validate(), Err(Error::InvalidGlobalTimeout)));

        assert!(cfg().validate().is_ok());
    }

    #[test]
    fn zero_ramp_up_size_uses_default() {
        let mut c = cfg();
        c.ramp_up_size = 0;
        assert_eq!(c.effective_ramp_up_size(), DEFAULT_RAMP_UP_SIZE);
        c.ramp_up_size = 7;
        assert_eq!(c.effective_ramp_up_size(), 7);
    }

    #[test]
    fn result_capacity_covers_every_message() {
        let mut c = cfg();
        c.clients = 3;
        c.messages = 5;
        assert_eq!(c.result_capacity(), 15);
        assert_eq!(c.total_messages(), 15);
    }

    #[test]
    fn result_capacity_fits_a_bounded_channel() {
        let mut c = cfg();
        c.clients = 4;
        c.messages = 1 << 62;
        assert!(c.validate().is_ok());
        assert_eq!(c.result_capacity(), tokio::sync::Semaphore::MAX_PERMITS);

        // Must not panic.
        let (_tx, _rx) = tokio::sync::mpsc::channel::<()>(c.result_capacity());
    }

    #[test]
    fn worker_snapshot_carries_run_parameters() {
        let mut client = ClientSettings::new("mem://test");
        client.skip_tls_verification = true;
        let mut c = RunConfig::new(client);
        c.messages = 42;
        c.retain = true;
        c.publisher_qos = QoS::ExactlyOnce;

        let w = c.worker(3);
        assert_eq!(w.worker_id, 3);
        assert_eq!(w.messages, 42);
        assert!(w.retain);
        assert_eq!(w.publisher_qos, QoS::ExactlyOnce);

        let opts = w.session_options("client-a");
        assert_eq!(opts.client_id, "client-a");
        assert_eq!(&*opts.broker_url, "mem://test");
        assert_eq!(opts.timeout, c.timeout);
        assert!(opts.skip_tls_verification);
    }
}
