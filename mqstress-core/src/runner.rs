mod config;
mod error;
mod identity;
mod progress;
mod result;
mod run;
mod signal;
mod worker;

pub use config::{
    ClientSettings, DEFAULT_GRACE_PERIOD, DEFAULT_RAMP_UP_SIZE, DEFAULT_TOPIC_BASE, RunConfig,
    WorkerConfig, host_identity,
};
pub use error::{Error, Result};
pub use identity::WorkerIdentity;
pub use progress::{ProgressFn, RunEvent};
pub use result::{EventKind, WorkerResult};
pub use run::{RunOutcome, run_workers};
pub use signal::{StopCause, StopSignal};
pub use worker::run_worker;
