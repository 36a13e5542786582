use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Wait group over dispatched jobs, plus the run's counters.
#[derive(Debug, Default)]
pub struct Tracker {
    outstanding: Mutex<usize>,
    drained: Condvar,
    files: AtomicU64,
    bytes: AtomicU64,
    failures: AtomicU64,
}

/// Held by one dispatched job; dropping it marks the job finished.
#[derive(Debug)]
pub struct JobTicket {
    tracker: Arc<Tracker>,
}

impl Drop for JobTicket {
    fn drop(&mut self) {
        let mut outstanding = self.tracker.lock();
        *outstanding -= 1;
        if *outstanding == 0 {
            self.tracker.drained.notify_all();
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Files hashed successfully.
    pub files: u64,
    /// Bytes digested across those files.
    pub bytes: u64,
    /// Files skipped because of a stat, open, read or spawn failure.
    pub failures: u64,
    /// Directories that could not be listed. The tracker never sees these;
    /// `Scheduler::run_walk` fills the field in from the walker.
    pub enumeration_errors: u64,
}

impl Tracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn enter(self: &Arc<Self>) -> JobTicket {
        *self.lock() += 1;
        JobTicket {
            tracker: Arc::clone(self),
        }
    }

    pub fn outstanding(&self) -> usize {
        *self.lock()
    }

    pub fn record_hashed(&self, bytes: u64) {
        self.files.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Blocks until every issued ticket has been dropped. Returns at once if
    /// none are outstanding.
    pub fn join(&self) {
        let mut outstanding = self.lock();
        while *outstanding > 0 {
            outstanding = self
                .drained
                .wait(outstanding)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Counters as of now; stable once [`join`](Self::join) has returned.
    pub fn stats(&self) -> RunStats {
        RunStats {
            files: self.files.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            enumeration_errors: 0,
        }
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.outstanding.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
