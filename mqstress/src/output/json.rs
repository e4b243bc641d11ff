use serde::Serialize;
use std::io::Write as _;
use std::sync::Arc;

use mqstress_core::{
    EventKind, ProgressFn, RunConfig, RunEvent, RunOutcome, StopCause, Summary, SummaryError,
    WorkerResult,
};

use super::OutputFormatter;

pub(crate) struct JsonOutput {
    show_progress: bool,
}

impl JsonOutput {
    pub(crate) fn new(show_progress: bool) -> Self {
        Self { show_progress }
    }
}

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _cfg: &RunConfig) {}

    fn progress(&self) -> Option<ProgressFn> {
        let show_progress = self.show_progress;
        Some(Arc::new(move |event| {
            if show_progress || is_notice(&event) {
                emit_json_line(&build_event_line(&event));
            }
        }))
    }

    fn print_summary(&self, summary: &Summary, outcome: &RunOutcome) -> anyhow::Result<()> {
        emit_json_line(&JsonSummaryLine {
            kind: "summary",
            elapsed_secs: outcome.elapsed.as_secs_f64(),
            started: outcome.started,
            finished: outcome.finished,
            stopped: outcome.stopped,
            summary,
        });
        Ok(())
    }

    fn print_no_summary(&self, err: &SummaryError, outcome: &RunOutcome) {
        emit_json_line(&JsonNoSummaryLine {
            kind: "no_summary",
            reason: err.to_string(),
            elapsed_secs: outcome.elapsed.as_secs_f64(),
            started: outcome.started,
            finished: outcome.finished,
            stopped: outcome.stopped,
        });
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonEventLine {
    pub kind: &'static str,
    #[serde(flatten)]
    pub event: JsonEvent,
}

#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub(crate) enum JsonEvent {
    RampUpPause {
        started: usize,
        delay_secs: f64,
    },
    Launched {
        started: usize,
    },
    Result {
        started: usize,
        finished: usize,
        result: JsonWorkerResult,
    },
    Stopping {
        cause: StopCause,
        grace_secs: f64,
    },
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonWorkerResult {
    pub worker_id: usize,
    pub event: EventKind,
    pub error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub messages_published: u64,
    pub messages_received: u64,
    pub publish_secs: f64,
    pub receive_secs: f64,
}

impl From<&WorkerResult> for JsonWorkerResult {
    fn from(r: &WorkerResult) -> Self {
        Self {
            worker_id: r.worker_id,
            event: r.event,
            error: r.error,
            error_message: r.error_message.clone(),
            messages_published: r.messages_published,
            messages_received: r.messages_received,
            publish_secs: r.publish_time.as_secs_f64(),
            receive_secs: r.receive_time.as_secs_f64(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine<'a> {
    pub kind: &'static str,
    pub elapsed_secs: f64,
    pub started: usize,
    pub finished: usize,
    pub stopped: Option<StopCause>,
    pub summary: &'a Summary,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonNoSummaryLine {
    pub kind: &'static str,
    pub reason: String,
    pub elapsed_secs: f64,
    pub started: usize,
    pub finished: usize,
    pub stopped: Option<StopCause>,
}

/// Events printed even with `--no-progress`.
fn is_notice(event: &RunEvent) -> bool {
    matches!(
        event,
        RunEvent::RampUpPause { .. } | RunEvent::Stopping { .. }
    )
}

fn build_event_line(event: &RunEvent) -> JsonEventLine {
    let event = match event {
        RunEvent::RampUpPause { started, delay } => JsonEvent::RampUpPause {
            started: *started,
            delay_secs: delay.as_secs_f64(),
        },
        RunEvent::Launched { started } => JsonEvent::Launched { started: *started },
        RunEvent::Result {
            result,
            finished,
            started,
        } => JsonEvent::Result {
            started: *started,
            finished: *finished,
            result: result.into(),
        },
        RunEvent::Stopping { cause, grace } => JsonEvent::Stopping {
            cause: *cause,
            grace_secs: grace.as_secs_f64(),
        },
    };

    JsonEventLine {
        kind: "progress",
        event,
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}
