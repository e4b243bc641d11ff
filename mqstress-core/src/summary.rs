mod stats;

use serde::Serialize;

use crate::runner::{EventKind, WorkerResult};

pub use stats::{HISTOGRAM_BUCKETS, Histogram, HistogramBucket, histogram, median};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SummaryError {
    #[error("no results collected")]
    Empty,

    #[error("no worker produced a throughput sample")]
    NoUsableSamples,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub clients: usize,
    pub messages_per_client: u64,
    pub total_messages: u64,
    pub messages_published: u64,
    pub messages_received: u64,

    pub errors: usize,
    /// Percentage of clients whose result carries the error flag.
    pub error_rate: f64,

    pub completed: usize,
    pub in_progress: usize,
    pub connect_failed: usize,
    pub subscribe_failed: usize,
    pub timeout_exceeded: usize,
    pub aborted: usize,

    /// Ascending per-worker throughput, msg/s.
    pub publish_throughput: Vec<f64>,
    pub receive_throughput: Vec<f64>,
    pub publish_median: f64,
    pub receive_median: f64,
    pub publish_histogram: Histogram,
    pub receive_histogram: Histogram,
}

impl Summary {
    #[must_use]
    pub fn publish_fastest(&self) -> f64 {
        self.publish_throughput.last().copied().unwrap_or(0.0)
    }

    #[must_use]
    pub fn publish_slowest(&self) -> f64 {
        self.publish_throughput.first().copied().unwrap_or(0.0)
    }

    #[must_use]
    pub fn receive_fastest(&self) -> f64 {
        self.receive_throughput.last().copied().unwrap_or(0.0)
    }

    #[must_use]
    pub fn receive_slowest(&self) -> f64 {
        self.receive_throughput.first().copied().unwrap_or(0.0)
    }
}

/// Reduces the final per-worker results of a run.
///
/// Slots left empty (workers that never started or never reported) contribute
/// nothing.
pub fn build_summary(
    clients: usize,
    messages: u64,
    results: &[Option<WorkerResult>],
) -> Result<Summary, SummaryError> {
    if results.is_empty() {
        return Err(SummaryError::Empty);
    }

    let mut s = Summary {
        clients,
        messages_per_client: messages,
        total_messages: (clients as u64).saturating_mul(messages),
        messages_published: 0,
        messages_received: 0,
        errors: 0,
        error_rate: 0.0,
        completed: 0,
        in_progress: 0,
        connect_failed: 0,
        subscribe_failed: 0,
        timeout_exceeded: 0,
        aborted: 0,
        publish_throughput: Vec::new(),
        receive_throughput: Vec::new(),
        publish_median: 0.0,
        receive_median: 0.0,
        publish_histogram: Histogram::default(),
        receive_histogram: Histogram::default(),
    };

    for r in results.iter().flatten() {
        s.messages_published = s.messages_published.saturating_add(r.messages_published);
        s.messages_received = s.messages_received.saturating_add(r.messages_received);
        if r.error {
            s.errors += 1;
        }

        match r.event {
            EventKind::Completed => s.completed += 1,
            EventKind::ProgressReport => s.in_progress += 1,
            EventKind::ConnectFailed => s.connect_failed += 1,
            EventKind::SubscribeFailed => s.subscribe_failed += 1,
            EventKind::TimeoutExceeded => s.timeout_exceeded += 1,
            EventKind::Aborted => s.aborted += 1,
        }

        if r.event.has_throughput() {
            s.publish_throughput.push(r.publish_throughput());
            s.receive_throughput.push(r.receive_throughput());
        }
    }

    if s.publish_throughput.is_empty() {
        return Err(SummaryError::NoUsableSamples);
    }

    s.publish_throughput.sort_by(f64::total_cmp);
    s.receive_throughput.sort_by(f64::total_cmp);

    s.error_rate = percent(s.errors as f64, clients as f64);
    s.publish_median = median(&s.publish_throughput);
    s.receive_median = median(&s.receive_throughput);

    let sampled = s.completed + s.in_progress;
    s.publish_histogram = histogram(&s.publish_throughput, sampled, HISTOGRAM_BUCKETS);
    s.receive_histogram = histogram(&s.receive_throughput, sampled, HISTOGRAM_BUCKETS);

    Ok(s)
}

/// `part / whole * 100`, `0.0` when `whole` is zero.
#[must_use]
pub fn percent(part: f64, whole: f64) -> f64 {
    if whole == 0.0 {
        0.0
    } else {
        part / whole * 100.0
    }
}
