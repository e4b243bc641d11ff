use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::broker::Connector;

use super::config::RunConfig;
use super::error::Result;
use super::progress::{ProgressFn, RunEvent};
use super::result::WorkerResult;
use super::signal::{StopCause, StopSignal};
use super::worker::run_worker;

#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Last result per worker, indexed by worker id. `None` for workers that
    /// were never started or never reported.
    pub results: Vec<Option<WorkerResult>>,
    pub started: usize,
    /// Workers that reported a terminal or failed result.
    pub finished: usize,
    /// Why the run was stopped early, if it was.
    pub stopped: Option<StopCause>,
    pub elapsed: Duration,
}

impl RunOutcome {
    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.stopped == Some(StopCause::DeadlineExceeded)
    }

    #[must_use]
    pub fn interrupted(&self) -> bool {
        self.stopped == Some(StopCause::Interrupted)
    }
}

/// Launches `cfg.clients` workers in ramp-up batches and collects their results.
///
/// The run ends when every started worker finished, or `cfg.grace_period` after
/// the global deadline passed or `interrupt` resolved, whichever comes first.
pub async fn run_workers<I>(
    cfg: RunConfig,
    connector: Arc<dyn Connector>,
    interrupt: I,
    progress: Option<ProgressFn>,
) -> Result<RunOutcome>
where
    I: Future<Output = ()>,
{
    cfg.validate()?;

    let emit = |event: RunEvent| {
        if let Some(progress) = &progress {
            progress(event);
        }
    };

    let begun = Instant::now();
    let stop = Arc::new(StopSignal::new());
    let (tx, mut rx) = mpsc::channel::<WorkerResult>(cfg.result_capacity());

    let deadline = tokio::time::sleep_until(begun + cfg.global_timeout);
    tokio::pin!(deadline);
    tokio::pin!(interrupt);

    let batch = cfg.effective_ramp_up_size();
    let mut workers = JoinSet::new();
    let mut started: usize = 0;

    while started < cfg.clients {
        if started > 0 && started % batch == 0 {
            emit(RunEvent::RampUpPause {
                started,
                delay: cfg.ramp_up_delay,
            });
            tracing::debug!(started, delay = ?cfg.ramp_up_delay, "ramp-up pause");

            tokio::select! {
                biased;
                () = &mut interrupt => {
                    stop.stop(StopCause::Interrupted);
                    break;
                }
                () = &mut deadline => {
                    stop.stop(StopCause::DeadlineExceeded);
                    break;
                }
                () = tokio::time::sleep(cfg.ramp_up_delay) => {}
            }
        }

        workers.spawn(run_worker(
            cfg.worker(started),
            connector.clone(),
            stop.clone(),
            tx.clone(),
        ));
        started += 1;
    }
    // Only workers hold senders now, so the channel closes once all of them exit.
    drop(tx);

    emit(RunEvent::Launched { started });
    tracing::debug!(started, clients = cfg.clients, "launch phase finished");

    let mut results: Vec<Option<WorkerResult>> = vec![None; cfg.clients];
    let mut finished: usize = 0;

    let grace = tokio::time::sleep_until(begun + cfg.global_timeout);
    tokio::pin!(grace);

    let stopping = |cause: StopCause, grace: std::pin::Pin<&mut tokio::time::Sleep>| {
        grace.reset(Instant::now() + cfg.grace_period);
        match cause {
            StopCause::DeadlineExceeded => {
                tracing::warn!(grace = ?cfg.grace_period, "global timeout reached, stopping workers");
            }
            StopCause::Interrupted => {
                tracing::warn!(grace = ?cfg.grace_period, "interrupted, stopping workers");
            }
        }
        emit(RunEvent::Stopping {
            cause,
            grace: cfg.grace_period,
        });
    };

    if let Some(cause) = stop.cause() {
        stopping(cause, grace.as_mut());
    }

    while finished < started {
        let stopped = stop.cause().is_some();

        tokio::select! {
            biased;

            msg = rx.recv() => {
                let Some(result) = msg else {
                    tracing::debug!(finished, started, "all workers exited");
                    break;
                };

                if result.event.is_terminal() || result.error {
                    finished += 1;
                }
                if result.error {
                    tracing::error!(
                        worker = result.worker_id,
                        event = %result.event,
                        error = result.error_message.as_deref().unwrap_or(""),
                        received = result.messages_received,
                        published = result.messages_published,
                        "worker failed"
                    );
                }
                tracing::debug!(worker = result.worker_id, event = %result.event, finished, started, "result");

                if progress.is_some() {
                    emit(RunEvent::Result {
                        result: result.clone(),
                        finished,
                        started,
                    });
                }
                if let Some(slot) = results.get_mut(result.worker_id) {
                    *slot = Some(result);
                }
            }

            () = &mut deadline, if !stopped => {
                if stop.stop(StopCause::DeadlineExceeded) {
                    stopping(StopCause::DeadlineExceeded, grace.as_mut());
                }
            }

            () = &mut interrupt, if !stopped => {
                if stop.stop(StopCause::Interrupted) {
                    stopping(StopCause::Interrupted, grace.as_mut());
                }
            }

            () = &mut grace, if stopped => {
                tracing::warn!(finished, started, "grace period over, abandoning workers");
                break;
            }
        }
    }

    let elapsed = begun.elapsed();

    if finished >= started {
        // Let workers release their sessions.
        let joined = tokio::time::timeout(cfg.grace_period, async {
            while let Some(res) = workers.join_next().await {
                if let Err(err) = res
                    && err.is_panic()
                {
                    tracing::error!(error = %err, "worker panicked");
                }
            }
        })
        .await;
        if joined.is_err() {
            tracing::warn!("workers still releasing sessions after the grace period");
        }
    }
    workers.shutdown().await;

    Ok(RunOutcome {
        results,
        started,
        finished,
        stopped: stop.cause(),
        elapsed,
    })
}
