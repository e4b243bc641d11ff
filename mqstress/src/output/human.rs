use std::sync::Arc;

mod format;
mod progress;
mod summary;

use format::format_duration;
use progress::HumanProgress;
use summary::{render, render_no_summary};

use mqstress_core::{
    EventKind, ProgressFn, RunConfig, RunEvent, RunOutcome, StopCause, Summary, SummaryError,
};

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new(show_progress: bool) -> Self {
        Self {
            progress: Arc::new(HumanProgress::new(show_progress)),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, cfg: &RunConfig) {
        println!("broker: {}", cfg.client.broker_url);
        println!(
            "clients={} messages={} qos={}/{} rampup={}x{} timeout={} global_timeout={}",
            cfg.clients,
            cfg.messages,
            cfg.publisher_qos.level(),
            cfg.subscriber_qos.level(),
            cfg.effective_ramp_up_size(),
            format_duration(cfg.ramp_up_delay),
            format_duration(cfg.timeout),
            format_duration(cfg.global_timeout),
        );
        self.progress.start(cfg.clients as u64);
    }

    fn progress(&self) -> Option<ProgressFn> {
        let progress = self.progress.clone();

        Some(Arc::new(move |event| match event {
            RunEvent::RampUpPause { started, delay } => {
                progress.notice(&format!(
                    "ramp-up: {started} clients started, next batch in {}",
                    format_duration(delay)
                ));
            }
            RunEvent::Launched { started } => progress.launched(started as u64),
            RunEvent::Result {
                result, finished, ..
            } => {
                let glyph = if result.error {
                    Some('E')
                } else if result.event == EventKind::ProgressReport {
                    Some('.')
                } else {
                    None
                };
                progress.record(glyph, finished as u64);
            }
            RunEvent::Stopping { cause, grace } => {
                let reason = match cause {
                    StopCause::DeadlineExceeded => "global timeout exceeded",
                    StopCause::Interrupted => "interrupted",
                };
                progress.notice(&format!(
                    "{reason}, waiting up to {} for clients to finish",
                    format_duration(grace)
                ));
            }
        }))
    }

    fn print_summary(&self, summary: &Summary, outcome: &RunOutcome) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(summary, outcome));
        Ok(())
    }

    fn print_no_summary(&self, err: &SummaryError, outcome: &RunOutcome) {
        self.progress.finish();
        eprint!("{}", render_no_summary(err, outcome));
    }
}
