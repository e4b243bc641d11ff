use std::time::Duration;

use super::signal::StopCause;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    serde::Serialize,
)]
pub enum EventKind {
    /// Every message was published and received back.
    Completed,
    /// Intermediate receive progress.
    ProgressReport,
    ConnectFailed,
    SubscribeFailed,
    /// The global deadline was reached before the worker finished.
    TimeoutExceeded,
    /// The run was cancelled by the operator.
    Aborted,
}

impl EventKind {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::ProgressReport)
    }

    /// Whether results of this kind carry the error flag.
    #[must_use]
    pub fn is_error(self) -> bool {
        matches!(
            self,
            Self::ConnectFailed | Self::SubscribeFailed | Self::TimeoutExceeded
        )
    }

    /// Whether a worker in this state contributes a throughput sample.
    #[must_use]
    pub fn has_throughput(self) -> bool {
        matches!(self, Self::Completed | Self::ProgressReport)
    }

    #[must_use]
    pub fn from_stop(cause: StopCause) -> Self {
        match cause {
            StopCause::DeadlineExceeded => Self::TimeoutExceeded,
            StopCause::Interrupted => Self::Aborted,
        }
    }
}

/// One event on the result stream.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerResult {
    pub worker_id: usize,
    pub event: EventKind,
    pub publish_time: Duration,
    pub receive_time: Duration,
    pub messages_received: u64,
    pub messages_published: u64,
    pub error: bool,
    pub error_message: Option<String>,
}

impl WorkerResult {
    /// A lifecycle failure before any message was published.
    #[must_use]
    pub fn failed(worker_id: usize, event: EventKind, message: String) -> Self {
        Self {
            worker_id,
            event,
            publish_time: Duration::ZERO,
            receive_time: Duration::ZERO,
            messages_received: 0,
            messages_published: 0,
            error: true,
            error_message: Some(message),
        }
    }

    /// Receive-side event carrying the counts and timings accumulated so far.
    #[must_use]
    pub fn receive(
        worker_id: usize,
        event: EventKind,
        publish_time: Duration,
        receive_time: Duration,
        messages_published: u64,
        messages_received: u64,
    ) -> Self {
        Self {
            worker_id,
            event,
            publish_time,
            receive_time,
            messages_received,
            messages_published,
            error: event.is_error(),
            error_message: None,
        }
    }

    /// Messages per second on the publish side.
    #[must_use]
    pub fn publish_throughput(&self) -> f64 {
        per_second(self.messages_published, self.publish_time)
    }

    /// Messages per second on the receive side.
    #[must_use]
    pub fn receive_throughput(&self) -> f64 {
        per_second(self.messages_received, self.receive_time)
    }
}

fn per_second(count: u64, elapsed: Duration) -> f64 {
    (count as f64) / elapsed.as_secs_f64().max(1e-9)
}
