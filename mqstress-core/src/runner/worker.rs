use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::broker::{Connector, Session};

use super::config::WorkerConfig;
use super::identity::WorkerIdentity;
use super::result::{EventKind, WorkerResult};
use super::signal::{StopCause, StopSignal};

/// Runs one virtual client to completion.
///
/// Emits zero or more [`EventKind::ProgressReport`] results followed by exactly
/// one terminal result. Lifecycle failures are reported as results, never as
/// errors. If the collector is gone, results are dropped silently.
pub async fn run_worker(
    cfg: WorkerConfig,
    connector: Arc<dyn Connector>,
    stop: Arc<StopSignal>,
    tx: mpsc::Sender<WorkerResult>,
) {
    let id = cfg.worker_id;
    let identity = WorkerIdentity::derive(&cfg.topic_base, &cfg.host, id);
    let topic = identity.topic.as_str();
    let report = Reporter { worker_id: id, tx };

    tracing::debug!(worker = id, topic, "connecting subscriber");
    let mut sub = match connector
        .connect(&cfg.session_options(&identity.subscriber_id))
        .await
    {
        Ok(s) => s,
        Err(err) => {
            report
                .fail(EventKind::ConnectFailed, format!("sub: {err}"))
                .await;
            return;
        }
    };

    tracing::debug!(worker = id, topic, qos = %cfg.subscriber_qos, "subscribing");
    if let Err(err) = sub.subscribe(topic, cfg.subscriber_qos, cfg.timeout).await {
        sub.disconnect().await;
        report
            .fail(EventKind::SubscribeFailed, err.to_string())
            .await;
        return;
    }

    tracing::debug!(worker = id, topic, "connecting publisher");
    let mut publisher = match connector
        .connect(&cfg.session_options(&identity.publisher_id))
        .await
    {
        Ok(p) => p,
        Err(err) => {
            release(id, topic, sub.as_mut(), cfg.timeout).await;
            report
                .fail(EventKind::ConnectFailed, format!("pub: {err}"))
                .await;
            return;
        }
    };

    let started = Instant::now();
    let mut published: u64 = 0;
    for index in 0..cfg.messages {
        let payload = cfg.payload.generate(index);
        if let Err(err) = publisher
            .publish(topic, cfg.publisher_qos, cfg.retain, payload, cfg.timeout)
            .await
        {
            tracing::warn!(worker = id, topic, index, error = %err, "publish failed");
        }
        published = published.saturating_add(1);

        if !cfg.pause_between_messages.is_zero() {
            tokio::time::sleep(cfg.pause_between_messages).await;
        }
    }
    let publish_time = started.elapsed();
    publisher.disconnect().await;
    tracing::debug!(worker = id, topic, published, "all messages published");

    let counts = receive(
        &cfg,
        topic,
        sub.as_mut(),
        &stop,
        &report,
        publish_time,
        published,
    )
    .await;

    release(id, topic, sub.as_mut(), cfg.timeout).await;
    tracing::debug!(worker = id, received = counts, "worker finished");
}

/// Receive loop. Returns the number of messages received.
async fn receive(
    cfg: &WorkerConfig,
    topic: &str,
    sub: &mut dyn Session,
    stop: &StopSignal,
    report: &Reporter,
    publish_time: Duration,
    published: u64,
) -> u64 {
    let id = cfg.worker_id;
    let started = Instant::now();
    let mut received: u64 = 0;

    loop {
        tokio::select! {
            biased;

            cause = stop.stopped() => {
                stopped(id, cause, received, cfg.messages);
                report
                    .send(WorkerResult::receive(
                        id,
                        EventKind::from_stop(cause),
                        publish_time,
                        started.elapsed(),
                        published,
                        received,
                    ))
                    .await;
                return received;
            }

            msg = sub.recv() => {
                if msg.is_none() {
                    tracing::warn!(
                        worker = id,
                        topic,
                        received,
                        expected = cfg.messages,
                        "subscriber session closed early, waiting for stop"
                    );
                    let cause = stop.stopped().await;
                    stopped(id, cause, received, cfg.messages);
                    report
                        .send(WorkerResult::receive(
                            id,
                            EventKind::from_stop(cause),
                            publish_time,
                            started.elapsed(),
                            published,
                            received,
                        ))
                        .await;
                    return received;
                }

                received = received.saturating_add(1);
                tracing::debug!(worker = id, received, expected = cfg.messages, "message received");

                let event = if received >= cfg.messages {
                    EventKind::Completed
                } else {
                    EventKind::ProgressReport
                };
                let delivered = report
                    .send(WorkerResult::receive(
                        id,
                        event,
                        publish_time,
                        started.elapsed(),
                        published,
                        received,
                    ))
                    .await;

                if event.is_terminal() || !delivered {
                    return received;
                }
            }
        }
    }
}

fn stopped(worker: usize, cause: StopCause, received: u64, expected: u64) {
    match cause {
        StopCause::DeadlineExceeded => {
            tracing::debug!(worker, received, expected, "stopped by global timeout");
        }
        StopCause::Interrupted => {
            tracing::debug!(worker, received, expected, "stopped by interrupt");
        }
    }
}

async fn release(worker: usize, topic: &str, sub: &mut dyn Session, timeout: Duration) {
    if let Err(err) = sub.unsubscribe(topic, timeout).await {
        tracing::warn!(worker, topic, error = %err, "unsubscribe failed");
    }
    sub.disconnect().await;
}

struct Reporter {
    worker_id: usize,
    tx: mpsc::Sender<WorkerResult>,
}

impl Reporter {
    /// Returns `false` once the collector stopped listening.
    async fn send(&self, result: WorkerResult) -> bool {
        self.tx.send(result).await.is_ok()
    }

    async fn fail(&self, event: EventKind, message: String) {
        tracing::debug!(worker = self.worker_id, %event, error = %message, "worker failed");
        self.send(WorkerResult::failed(self.worker_id, event, message))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::memory::MemoryBroker;
    use crate::runner::config::{ClientSettings, RunConfig};

    fn config(messages: u64) -> RunConfig {
        let mut cfg = RunConfig::new(ClientSettings::new("mem://worker"));
        cfg.clients = 1;
        cfg.messages = messages;
        cfg.host = Arc::from("test-host");
        cfg
    }

    async fn drain(mut rx: mpsc::Receiver<WorkerResult>) -> Vec<WorkerResult> {
        let mut out = Vec::new();
        while let Some(r) = rx.recv().await {
            out.push(r);
        }
        out
    }

    async fn run_one(broker: &MemoryBroker, cfg: &RunConfig, stop: Arc<StopSignal>) -> Vec<WorkerResult> {
        let (tx, rx) = mpsc::channel(cfg.result_capacity());
        let connector: Arc<dyn Connector> = Arc::new(broker.clone());
        run_worker(cfg.worker(0), connector, stop, tx).await;
        drain(rx).await
    }

    #[tokio::test]
    async fn completes_after_every_message_arrives() {
        let broker = MemoryBroker::new();
        let results = run_one(&broker, &config(4), Arc::new(StopSignal::new())).await;

        let kinds: Vec<_> = results.iter().map(|r| r.event).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::ProgressReport,
                EventKind::ProgressReport,
                EventKind::ProgressReport,
                EventKind::Completed
            ]
        );
        let Some(last) = results.last() else {
            panic!("no results");
        };
        assert_eq!(last.messages_published, 4);
        assert_eq!(last.messages_received, 4);
        assert!(!last.error);
        assert_eq!(broker.live_sessions(), 0);
        assert_eq!(broker.subscribed_topics(), 0);
    }

    #[tokio::test]
    async fn refused_subscriber_reports_connect_failed() {
        let broker = MemoryBroker::new().refuse_clients(|id| id.starts_with("mqstress-sub-"));
        let results = run_one(&broker, &config(3), Arc::new(StopSignal::new())).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].event, EventKind::ConnectFailed);
        assert!(results[0].error);
        let msg = results[0].error_message.as_deref().unwrap_or_default();
        assert!(msg.starts_with("sub: "), "{msg}");
    }

    #[tokio::test]
    async fn refused_publisher_releases_the_subscriber() {
        let broker = MemoryBroker::new().refuse_clients(|id| id.starts_with("mqstress-pub-"));
        let results = run_one(&broker, &config(3), Arc::new(StopSignal::new())).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].event, EventKind::ConnectFailed);
        let msg = results[0].error_message.as_deref().unwrap_or_default();
        assert!(msg.starts_with("pub: "), "{msg}");
        assert_eq!(broker.live_sessions(), 0);
        assert_eq!(broker.subscribed_topics(), 0);
    }

    #[tokio::test]
    async fn rejected_subscription_reports_subscribe_failed() {
        let broker = MemoryBroker::new().reject_topics(|_| true);
        let results = run_one(&broker, &config(3), Arc::new(StopSignal::new())).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].event, EventKind::SubscribeFailed);
        assert!(results[0].error);
        assert_eq!(broker.live_sessions(), 0);
    }

    #[tokio::test]
    async fn stop_cause_decides_timeout_or_abort() {
        for (cause, kind, error) in [
            (StopCause::DeadlineExceeded, EventKind::TimeoutExceeded, true),
            (StopCause::Interrupted, EventKind::Aborted, false),
        ] {
            let broker = MemoryBroker::new().delivery_limit(1);
            let stop = Arc::new(StopSignal::new());
            let (tx, mut rx) = mpsc::channel(8);
            let connector: Arc<dyn Connector> = Arc::new(broker.clone());
            let worker = tokio::spawn(run_worker(config(3).worker(0), connector, stop.clone(), tx));

            let Some(first) = rx.recv().await else {
                panic!("expected a progress report");
            };
            assert_eq!(first.event, EventKind::ProgressReport);

            stop.stop(cause);
            let Some(last) = rx.recv().await else {
                panic!("expected a terminal result");
            };
            assert_eq!(last.event, kind);
            assert_eq!(last.error, error);
            assert_eq!(last.messages_received, 1);
            assert_eq!(last.messages_published, 3);

            worker
                .await
                .unwrap_or_else(|e| panic!("worker panicked: {e}"));
            assert!(rx.recv().await.is_none());
            assert_eq!(broker.live_sessions(), 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn session_closed_by_broker_waits_for_the_stop() {
        for (cause, kind) in [
            (StopCause::DeadlineExceeded, EventKind::TimeoutExceeded),
            (StopCause::Interrupted, EventKind::Aborted),
        ] {
            let broker = MemoryBroker::new().close_after(2);
            let stop = Arc::new(StopSignal::new());
            let (tx, mut rx) = mpsc::channel(8);
            let connector: Arc<dyn Connector> = Arc::new(broker.clone());
            let worker = tokio::spawn(run_worker(config(5).worker(0), connector, stop.clone(), tx));

            for _ in 0..2 {
                let Some(r) = rx.recv().await else {
                    panic!("expected a progress report");
                };
                assert_eq!(r.event, EventKind::ProgressReport);
            }

            // The paused clock only advances once the worker is parked.
            tokio::time::sleep(Duration::from_secs(30)).await;
            assert!(!worker.is_finished());
            assert!(rx.try_recv().is_err());
            assert_eq!(broker.live_sessions(), 1);

            stop.stop(cause);
            let Some(last) = rx.recv().await else {
                panic!("expected a terminal result");
            };
            assert_eq!(last.event, kind);
            assert_eq!(last.messages_received, 2);
            assert_eq!(last.messages_published, 5);
            assert!(last.receive_time >= Duration::from_secs(30));

            worker
                .await
                .unwrap_or_else(|e| panic!("worker panicked: {e}"));
            assert!(rx.recv().await.is_none());
            assert_eq!(broker.live_sessions(), 0);
        }
    }
}
