use std::collections::VecDeque;
use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

// Only the most recent glyphs stay visible.
const TRAIL_LEN: usize = 40;

pub(crate) struct HumanProgress {
    inner: Mutex<Inner>,
}

struct Inner {
    pb: ProgressBar,
    trail: VecDeque<char>,
}

impl HumanProgress {
    pub(crate) fn new(enabled: bool) -> Self {
        let pb = if enabled {
            let pb = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr_with_hz(5));
            pb.set_style(bar_style());
            pb
        } else {
            ProgressBar::hidden()
        };

        Self {
            inner: Mutex::new(Inner {
                pb,
                trail: VecDeque::with_capacity(TRAIL_LEN),
            }),
        }
    }

    pub(crate) fn start(&self, clients: u64) {
        let inner = self.lock();
        inner.pb.set_length(clients);
        inner.pb.set_position(0);
    }

    /// Workers that will never start do not count towards the bar.
    pub(crate) fn launched(&self, started: u64) {
        self.lock().pb.set_length(started);
    }

    pub(crate) fn record(&self, glyph: Option<char>, finished: u64) {
        let mut inner = self.lock();
        if let Some(glyph) = glyph {
            if inner.trail.len() == TRAIL_LEN {
                inner.trail.pop_front();
            }
            inner.trail.push_back(glyph);
            let msg: String = inner.trail.iter().collect();
            inner.pb.set_message(msg);
        }
        inner.pb.set_position(finished);
    }

    pub(crate) fn notice(&self, msg: &str) {
        self.lock().pb.suspend(|| eprintln!("{msg}"));
    }

    pub(crate) fn finish(&self) {
        self.lock().pb.finish_and_clear();
    }

    #[cfg(test)]
    fn trail(&self) -> String {
        self.lock().trail.iter().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("[ {bar:20.cyan/blue} ] {pos}/{len} clients {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█░")
}
