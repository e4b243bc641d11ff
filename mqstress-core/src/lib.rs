pub mod broker;
pub mod payload;
pub mod runner;
pub mod summary;

pub use broker::{
    BrokerError, Connector, Credentials, InboundMessage, QoS, Session, SessionOptions, TlsMaterial,
};
pub use payload::PayloadGenerator;
pub use runner::{
    ClientSettings, Error, EventKind, ProgressFn, Result, RunConfig, RunEvent, RunOutcome,
    StopCause, StopSignal, WorkerConfig, WorkerResult, run_workers,
};
pub use summary::{Histogram, HistogramBucket, Summary, SummaryError, build_summary};
