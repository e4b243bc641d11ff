use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, serde::Serialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum StopCause {
    /// The global timeout elapsed.
    DeadlineExceeded,
    /// The operator asked to cancel the run.
    Interrupted,
}

const RUNNING: u8 = 0;
const DEADLINE: u8 = 1;
const INTERRUPTED: u8 = 2;

impl StopCause {
    fn encode(self) -> u8 {
        match self {
            Self::DeadlineExceeded => DEADLINE,
            Self::Interrupted => INTERRUPTED,
        }
    }

    fn decode(raw: u8) -> Option<Self> {
        match raw {
            DEADLINE => Some(Self::DeadlineExceeded),
            INTERRUPTED => Some(Self::Interrupted),
            _ => None,
        }
    }
}

/// One-shot broadcast that tells every worker the run is over, and why.
///
/// The first [`StopSignal::stop`] wins; the cause never changes afterwards.
#[derive(Debug)]
pub struct StopSignal {
    cause: AtomicU8,
    notify: Notify,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        Self {
            cause: AtomicU8::new(RUNNING),
            notify: Notify::new(),
        }
    }

    /// Returns `true` if this call fired the signal.
    pub fn stop(&self, cause: StopCause) -> bool {
        let fired = self
            .cause
            .compare_exchange(RUNNING, cause.encode(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if fired {
            self.notify.notify_waiters();
        }
        fired
    }

    pub fn cause(&self) -> Option<StopCause> {
        StopCause::decode(self.cause.load(Ordering::Acquire))
    }

    /// Resolves with the cause once the signal fired. Cancel-safe.
    pub async fn stopped(&self) -> StopCause {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent `stop` cannot be missed.
            notified.as_mut().enable();

            if let Some(cause) = self.cause() {
                return cause;
            }
            notified.await;
        }
    }
}
