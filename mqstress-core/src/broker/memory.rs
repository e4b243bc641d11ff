//! In-process broker used for tests and `mem://` dry runs.
//!
//! Topics match exactly (no wildcards) and retained messages are not stored.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use super::{BrokerError, Connector, InboundMessage, QoS, Session, SessionOptions};

type Matcher = Arc<dyn Fn(&str) -> bool + Send + Sync + 'static>;

enum Delivery {
    Message(InboundMessage),
    /// The broker dropped the subscriber.
    Kick,
}

#[derive(Default)]
struct Bus {
    next_session: u64,
    live_sessions: usize,
    subs: HashMap<String, Vec<(u64, mpsc::UnboundedSender<Delivery>)>>,
    /// Messages delivered per subscribed topic; forgotten with the last subscriber.
    delivered: HashMap<String, u64>,
}

impl Bus {
    fn remove_session(&mut self, session: u64) {
        let delivered = &mut self.delivered;
        self.subs.retain(|topic, subs| {
            subs.retain(|(id, _)| *id != session);
            if subs.is_empty() {
                delivered.remove(topic);
                false
            } else {
                true
            }
        });
    }

    fn remove_topic(&mut self, topic: &str) {
        self.subs.remove(topic);
        self.delivered.remove(topic);
    }
}

#[derive(Clone, Default)]
struct Faults {
    refuse_clients: Option<Matcher>,
    reject_topics: Option<Matcher>,
    delivery_limit: Option<u64>,
    close_after: Option<u64>,
}

#[derive(Clone, Default)]
pub struct MemoryBroker {
    bus: Arc<Mutex<Bus>>,
    faults: Faults,
}

impl std::fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBroker")
            .field("delivery_limit", &self.faults.delivery_limit)
            .finish_non_exhaustive()
    }
}

impl MemoryBroker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect attempts from matching client ids fail.
    #[must_use]
    pub fn refuse_clients<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.faults.refuse_clients = Some(Arc::new(matcher));
        self
    }

    /// Subscriptions to matching topics fail.
    #[must_use]
    pub fn reject_topics<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.faults.reject_topics = Some(Arc::new(matcher));
        self
    }

    /// Deliver at most `limit` messages per topic; the rest are accepted and dropped.
    #[must_use]
    pub fn delivery_limit(mut self, limit: u64) -> Self {
        self.faults.delivery_limit = Some(limit);
        self
    }

    /// After `count` messages on a topic, its subscribers are dropped by the
    /// broker: their `recv` returns `None` and later operations fail.
    #[must_use]
    pub fn close_after(mut self, count: u64) -> Self {
        self.faults.close_after = Some(count);
        self
    }

    /// Sessions connected and not yet disconnected or dropped.
    #[must_use]
    pub fn live_sessions(&self) -> usize {
        self.lock().live_sessions
    }

    /// Topics with at least one subscriber.
    #[must_use]
    pub fn subscribed_topics(&self) -> usize {
        self.lock().subs.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Bus> {
        self.bus
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Connector for MemoryBroker {
    async fn connect(&self, opts: &SessionOptions) -> Result<Box<dyn Session>, BrokerError> {
        if let Some(refuse) = &self.faults.refuse_clients
            && refuse(opts.client_id.as_str())
        {
            return Err(BrokerError::Connect(format!(
                "connection refused for client `{}`",
                opts.client_id
            )));
        }

        let id = {
            let mut bus = self.lock();
            bus.next_session = bus.next_session.saturating_add(1);
            bus.live_sessions = bus.live_sessions.saturating_add(1);
            bus.next_session
        };

        let (tx, rx) = mpsc::unbounded_channel();
        Ok(Box::new(MemorySession {
            id,
            broker: self.clone(),
            tx,
            rx,
            closed: false,
            kicked: false,
        }))
    }
}

struct MemorySession {
    id: u64,
    broker: MemoryBroker,
    tx: mpsc::UnboundedSender<Delivery>,
    rx: mpsc::UnboundedReceiver<Delivery>,
    closed: bool,
    kicked: bool,
}

impl MemorySession {
    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.closed || self.kicked {
            Err(BrokerError::Closed)
        } else {
            Ok(())
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.rx.close();

        let mut bus = self.broker.lock();
        bus.remove_session(self.id);
        bus.live_sessions = bus.live_sessions.saturating_sub(1);
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn subscribe(
        &mut self,
        topic: &str,
        _qos: QoS,
        _timeout: Duration,
    ) -> Result<(), BrokerError> {
        self.ensure_open()?;

        if let Some(reject) = &self.broker.faults.reject_topics
            && reject(topic)
        {
            return Err(BrokerError::Subscribe(format!(
                "subscription to `{topic}` rejected"
            )));
        }

        let mut bus = self.broker.lock();
        bus.subs
            .entry(topic.to_string())
            .or_default()
            .push((self.id, self.tx.clone()));
        Ok(())
    }

    async fn publish(
        &mut self,
        topic: &str,
        _qos: QoS,
        _retain: bool,
        payload: Bytes,
        _timeout: Duration,
    ) -> Result<(), BrokerError> {
        self.ensure_open()?;

        let faults = &self.broker.faults;
        let mut bus = self.broker.lock();
        let Bus {
            subs, delivered, ..
        } = &mut *bus;

        // Nobody listens, nothing is delivered.
        let Some(subscribers) = subs.get(topic) else {
            return Ok(());
        };

        let count = delivered.entry(topic.to_string()).or_default();
        if faults.delivery_limit.is_some_and(|limit| *count >= limit) {
            return Ok(());
        }
        *count = count.saturating_add(1);
        let kick = faults.close_after.is_some_and(|n| *count >= n);

        for (_, tx) in subscribers {
            let _ = tx.send(Delivery::Message(InboundMessage {
                topic: topic.to_string(),
                payload: payload.clone(),
            }));
            if kick {
                let _ = tx.send(Delivery::Kick);
            }
        }
        if kick {
            bus.remove_topic(topic);
        }
        Ok(())
    }

    async fn unsubscribe(&mut self, topic: &str, _timeout: Duration) -> Result<(), BrokerError> {
        self.ensure_open()?;

        let mut bus = self.broker.lock();
        let now_empty = match bus.subs.get_mut(topic) {
            Some(subs) => {
                subs.retain(|(id, _)| *id != self.id);
                subs.is_empty()
            }
            None => false,
        };
        if now_empty {
            bus.remove_topic(topic);
        }
        Ok(())
    }

    async fn recv(&mut self) -> Option<InboundMessage> {
        if self.kicked {
            return None;
        }
        match self.rx.recv().await? {
            Delivery::Message(msg) => Some(msg),
            Delivery::Kick => {
                self.kicked = true;
                None
            }
        }
    }

    async fn disconnect(&mut self) {
        self.close();
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.close();
    }
}
