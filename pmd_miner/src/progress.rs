//! Progress reporting: a monotonic counter of completed commits, exposed
//! to stderr at a rate limited to at most one line per second. A much
//! smaller relative of the teacher's interactive `live_progress` ticker —
//! this batch job has no terminal UI to maintain, just a heartbeat for a
//! long-running, possibly unattended process.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct Progress {
    total: usize,
    done: AtomicUsize,
    last_reported_at: Mutex<Instant>,
}

const MIN_REPORT_INTERVAL: Duration = Duration::from_secs(1);

impl Progress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            done: AtomicUsize::new(0),
            last_reported_at: Mutex::new(Instant::now() - MIN_REPORT_INTERVAL),
        }
    }

    pub fn record_completed(&self) {
        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        self.maybe_report(done);
    }

    fn maybe_report(&self, done: usize) {
        let Ok(mut last) = self.last_reported_at.lock() else {
            return;
        };
        let now = Instant::now();
        if now.duration_since(*last) < MIN_REPORT_INTERVAL && done < self.total {
            return;
        }
        *last = now;
        tracing::info!(done, total = self.total, "batch progress");
    }
}
