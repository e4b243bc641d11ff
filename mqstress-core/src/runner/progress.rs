use std::time::Duration;

use super::result::WorkerResult;
use super::signal::StopCause;

#[derive(Debug, Clone)]
pub enum RunEvent {
    /// A ramp-up batch was launched; the next one starts after `delay`.
    RampUpPause { started: usize, delay: Duration },

    /// Launch phase is over (all workers started, or the run was stopped first).
    Launched { started: usize },

    /// A worker reported. `finished` counts terminal or failed workers so far.
    Result {
        result: WorkerResult,
        finished: usize,
        started: usize,
    },

    /// The run was stopped; workers get `grace` to report before collection ends.
    Stopping { cause: StopCause, grace: Duration },
}

pub type ProgressFn = std::sync::Arc<dyn Fn(RunEvent) + Send + Sync + 'static>;
