use crate::cli::OutputFormat;

use mqstress_core::{ProgressFn, RunConfig, RunOutcome, Summary, SummaryError};

mod human;
mod json;

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, cfg: &RunConfig);
    fn progress(&self) -> Option<ProgressFn>;
    fn print_summary(&self, summary: &Summary, outcome: &RunOutcome) -> anyhow::Result<()>;
    fn print_no_summary(&self, err: &SummaryError, outcome: &RunOutcome);
}

pub(crate) fn formatter(format: OutputFormat, show_progress: bool) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput::new(show_progress)),
        OutputFormat::Json => Box::new(json::JsonOutput::new(show_progress)),
    }
}
