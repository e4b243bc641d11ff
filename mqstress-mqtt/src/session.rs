use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, Outgoing, Packet, SubscribeReasonCode,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use mqstress_core::{BrokerError, InboundMessage, QoS, Session};

/// Acknowledgments forwarded from the event loop to the session.
#[derive(Debug)]
pub(crate) enum Ack {
    Connected,
    Subscribed(Vec<SubscribeReasonCode>),
    Published,
    Unsubscribed,
    Closed(String),
}

pub(crate) struct MqttSession {
    client_id: String,
    client: AsyncClient,
    acks: mpsc::UnboundedReceiver<Ack>,
    inbound: mpsc::UnboundedReceiver<InboundMessage>,
    poller: JoinHandle<()>,
    closed: bool,
}

impl MqttSession {
    /// Starts the event loop and waits up to `timeout` for the CONNACK.
    pub(crate) async fn open(
        client_id: String,
        client: AsyncClient,
        eventloop: EventLoop,
        timeout: Duration,
    ) -> Result<Self, BrokerError> {
        let (ack_tx, acks) = mpsc::unbounded_channel();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let poller = tokio::spawn(poll(client_id.clone(), eventloop, ack_tx, inbound_tx));

        let mut session = Self {
            client_id,
            client,
            acks,
            inbound,
            poller,
            closed: false,
        };

        match session.await_ack(timeout).await {
            Ok(Ack::Connected) => Ok(session),
            Ok(Ack::Closed(reason)) => {
                session.poller.abort();
                Err(BrokerError::Connect(reason))
            }
            Ok(other) => {
                session.poller.abort();
                Err(BrokerError::Connect(format!("unexpected {other:?} before CONNACK")))
            }
            Err(err) => {
                session.poller.abort();
                Err(err)
            }
        }
    }

    async fn await_ack(&mut self, timeout: Duration) -> Result<Ack, BrokerError> {
        match tokio::time::timeout(timeout, self.acks.recv()).await {
            Ok(Some(ack)) => Ok(ack),
            Ok(None) => Err(BrokerError::Closed),
            Err(_) => Err(BrokerError::Timeout(timeout)),
        }
    }

    // Acks of earlier operations that timed out must not satisfy the next wait.
    fn discard_stale_acks(&mut self) -> Result<(), BrokerError> {
        while let Ok(ack) = self.acks.try_recv() {
            if let Ack::Closed(reason) = ack {
                self.closed = true;
                tracing::debug!(client_id = %self.client_id, %reason, "connection closed");
            }
        }
        if self.closed {
            Err(BrokerError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Session for MqttSession {
    async fn subscribe(
        &mut self,
        topic: &str,
        qos: QoS,
        timeout: Duration,
    ) -> Result<(), BrokerError> {
        self.discard_stale_acks()?;
        self.client
            .subscribe(topic, to_rumqttc(qos))
            .await
            .map_err(|err| BrokerError::Subscribe(err.to_string()))?;

        loop {
            match self.await_ack(timeout).await? {
                Ack::Subscribed(codes) => {
                    return if codes
                        .iter()
                        .any(|c| matches!(c, SubscribeReasonCode::Failure))
                    {
                        Err(BrokerError::Subscribe(format!(
                            "broker rejected subscription to `{topic}`"
                        )))
                    } else {
                        Ok(())
                    };
                }
                Ack::Closed(reason) => {
                    self.closed = true;
                    return Err(BrokerError::Subscribe(reason));
                }
                _ => {}
            }
        }
    }

    async fn publish(
        &mut self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<(), BrokerError> {
        self.discard_stale_acks()?;
        match tokio::time::timeout(
            timeout,
            self.client
                .publish_bytes(topic, to_rumqttc(qos), retain, payload),
        )
        .await
        {
            Ok(res) => res.map_err(|err| BrokerError::Publish(err.to_string()))?,
            Err(_) => return Err(BrokerError::Timeout(timeout)),
        }

        if qos == QoS::AtMostOnce {
            return Ok(());
        }

        loop {
            match self.await_ack(timeout).await? {
                Ack::Published => return Ok(()),
                Ack::Closed(reason) => {
                    self.closed = true;
                    return Err(BrokerError::Publish(reason));
                }
                _ => {}
            }
        }
    }

    async fn unsubscribe(&mut self, topic: &str, timeout: Duration) -> Result<(), BrokerError> {
        self.discard_stale_acks()?;
        self.client
            .unsubscribe(topic)
            .await
            .map_err(|err| BrokerError::Unsubscribe(err.to_string()))?;

        loop {
            match self.await_ack(timeout).await? {
                Ack::Unsubscribed => return Ok(()),
                Ack::Closed(reason) => {
                    self.closed = true;
                    return Err(BrokerError::Unsubscribe(reason));
                }
                _ => {}
            }
        }
    }

    async fn recv(&mut self) -> Option<InboundMessage> {
        self.inbound.recv().await
    }

    async fn disconnect(&mut self) {
        if !self.closed {
            self.closed = true;
            if let Err(err) = self.client.try_disconnect() {
                tracing::debug!(client_id = %self.client_id, error = %err, "disconnect request failed");
            }
        }
        if !self.poller.is_finished()
            && tokio::time::timeout(Duration::from_secs(1), &mut self.poller)
                .await
                .is_err()
        {
            self.poller.abort();
        }
        self.inbound.close();
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        self.poller.abort();
    }
}

async fn poll(
    client_id: String,
    mut eventloop: EventLoop,
    acks: mpsc::UnboundedSender<Ack>,
    inbound: mpsc::UnboundedSender<InboundMessage>,
) {
    loop {
        let ack = match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    Ack::Connected
                } else {
                    Ack::Closed(format!("connection refused: {:?}", ack.code))
                }
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => Ack::Subscribed(ack.return_codes),
            Ok(Event::Incoming(Packet::PubAck(_) | Packet::PubComp(_))) => Ack::Published,
            Ok(Event::Incoming(Packet::UnsubAck(_))) => Ack::Unsubscribed,
            Ok(Event::Incoming(Packet::Publish(p))) => {
                let _ = inbound.send(InboundMessage {
                    topic: p.topic,
                    payload: p.payload,
                });
                continue;
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::debug!(%client_id, "disconnected");
                return;
            }
            Ok(_) => continue,
            Err(err) => {
                // No reconnect: the next poll would dial the broker again.
                tracing::debug!(%client_id, error = %err, "event loop stopped");
                let _ = acks.send(Ack::Closed(err.to_string()));
                return;
            }
        };

        let closing = matches!(ack, Ack::Closed(_));
        if acks.send(ack).is_err() || closing {
            return;
        }
    }
}

fn to_rumqttc(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qos_levels_map_one_to_one() {
        for level in 0u8..=2 {
            let Some(qos) = QoS::from_level(level) else {
                panic!("level {level} should be valid");
            };
            assert_eq!(to_rumqttc(qos) as u8, level);
        }
    }
}
