//! Dispatcher: turns walked paths into admitted hash jobs.
//!
//! For every path: stat, weigh, open, wait for admission, hand off to a
//! worker thread. Waiting for admission is the only place the loop blocks,
//! which is what keeps the number of in-flight reads matched to the device.

use std::fs::File;
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::error::FileError;
use crate::gate::AdmissionGate;
use crate::profile::Budget;
use crate::tracker::{RunStats, Tracker};
use crate::walker::Walker;
use crate::worker::{self, HashSettings, Job, Report};

pub struct Scheduler {
    budget: Budget,
    gate: Arc<AdmissionGate>,
    tracker: Arc<Tracker>,
    settings: Arc<HashSettings>,
    cancel: CancelToken,
}

impl Scheduler {
    pub fn new(budget: Budget, settings: HashSettings, cancel: CancelToken) -> Self {
        Self {
            gate: AdmissionGate::new(budget.capacity()),
            tracker: Tracker::new(),
            settings: Arc::new(settings),
            budget,
            cancel,
        }
    }

    pub fn gate(&self) -> &Arc<AdmissionGate> {
        &self.gate
    }

    /// Dispatch every path, then wait for all admitted jobs to finish.
    ///
    /// Per-file failures are sent down `reports` and counted; they never stop
    /// the loop. Returns once nothing is left in flight.
    pub fn run<I>(&self, paths: I, reports: &Sender<Report>) -> RunStats
    where
        I: IntoIterator<Item = PathBuf>,
    {
        for path in paths {
            if self.cancel.is_cancelled() {
                break;
            }
            if let Err(err) = self.dispatch(path, reports) {
                self.tracker.record_failure();
                if reports.send(Report::Failed(err)).is_err() {
                    self.cancel.cancel();
                }
            }
        }
        if self.cancel.is_cancelled() {
            debug!("dispatch stopped by cancellation, draining");
        }
        self.tracker.join();
        self.tracker.stats()
    }

    /// [`run`](Self::run) over a directory walk, with the walker's listing
    /// failures folded into the returned stats.
    pub fn run_walk(&self, walker: &mut Walker, reports: &Sender<Report>) -> RunStats {
        let mut stats = self.run(walker.by_ref(), reports);
        stats.enumeration_errors = walker.errors();
        stats
    }

    /// `Ok` also covers the case where cancellation stopped admission.
    fn dispatch(&self, path: PathBuf, reports: &Sender<Report>) -> Result<(), FileError> {
        let len = match std::fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(source) => return Err(FileError::Stat { path, source }),
        };
        let weight = self.budget.weight(len);

        let file = match File::open(&path) {
            Ok(file) => file,
            Err(source) => return Err(FileError::Open { path, source }),
        };

        let permit = match self.gate.try_acquire(weight) {
            Some(permit) => permit,
            None => {
                debug!(
                    path = %path.display(),
                    weight,
                    available = self.gate.available(),
                    "waiting for admission"
                );
                match self.gate.acquire_until(weight, &self.cancel) {
                    Some(permit) => permit,
                    None => return Ok(()),
                }
            }
        };
        // a worker may have cancelled while this path was waiting
        if self.cancel.is_cancelled() {
            return Ok(());
        }

        let ticket = self.tracker.enter();
        debug!(path = %path.display(), len, weight, "admitted");
        let job = Job {
            path,
            file,
            permit,
            ticket,
        };
        worker::spawn(
            job,
            Arc::clone(&self.settings),
            Arc::clone(&self.tracker),
            self.cancel.clone(),
            reports.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::walker::{WalkOptions, Walker};
    use crate::worker::Algorithm;
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;
    use std::sync::mpsc;

    fn settings() -> HashSettings {
        HashSettings {
            algorithm: Algorithm::Blake3,
            chunk_size: 4096,
        }
    }

    fn collect(rx: mpsc::Receiver<Report>) -> (HashMap<PathBuf, String>, Vec<FileError>) {
        let mut hashed = HashMap::new();
        let mut failed = Vec::new();
        for report in rx {
            match report {
                Report::Hashed { path, digest, .. } => {
                    hashed.insert(path, digest);
                }
                Report::Failed(err) => failed.push(err),
            }
        }
        (hashed, failed)
    }

    fn write_tree(root: &Path, count: usize) -> HashMap<PathBuf, Vec<u8>> {
        let mut expected = HashMap::new();
        for i in 0..count {
            let dir = root.join(format!("d{}", i % 4));
            fs::create_dir_all(&dir).unwrap();
            let path = dir.join(format!("f{i}.bin"));
            let content: Vec<u8> = (0..i * 311).map(|b| (b % 256) as u8).collect();
            fs::write(&path, &content).unwrap();
            expected.insert(path.canonicalize().unwrap(), content);
        }
        expected
    }

    #[test]
    fn empty_tree_completes() {
        let tmp = tempfile::tempdir().unwrap();
        let cancel = CancelToken::new();
        let walker = Walker::new(tmp.path(), WalkOptions::default(), cancel.clone()).unwrap();
        let scheduler = Scheduler::new(Budget::new(4, 1024.0), settings(), cancel);
        let (tx, rx) = mpsc::channel();
        let stats = scheduler.run(walker, &tx);
        drop(tx);
        assert_eq!(stats, RunStats::default());
        assert_eq!(rx.iter().count(), 0);
    }

    #[test]
    fn every_file_is_hashed_once_with_the_right_digest() {
        let tmp = tempfile::tempdir().unwrap();
        let expected = write_tree(tmp.path(), 40);
        let cancel = CancelToken::new();
        let walker = Walker::new(tmp.path(), WalkOptions::default(), cancel.clone()).unwrap();
        let scheduler = Scheduler::new(Budget::new(3, 2048.0), settings(), cancel);
        let (tx, rx) = mpsc::channel();

        let stats = scheduler.run(walker, &tx);
        drop(tx);
        let (hashed, failed) = collect(rx);

        assert!(failed.is_empty());
        assert_eq!(hashed.len(), expected.len());
        assert_eq!(stats.files, 40);
        assert_eq!(stats.bytes, expected.values().map(|c| c.len() as u64).sum::<u64>());
        for (path, content) in &expected {
            assert_eq!(hashed[path], blake3::hash(content).to_hex().to_string());
        }
        assert_eq!(scheduler.gate().available(), 3);
    }

    #[test]
    fn failures_do_not_stop_the_run() {
        let tmp = tempfile::tempdir().unwrap();
        let expected = write_tree(tmp.path(), 5);
        let mut paths: Vec<PathBuf> = expected.keys().cloned().collect();
        paths.insert(2, tmp.path().join("missing.bin"));

        let scheduler = Scheduler::new(Budget::new(2, 64.0), settings(), CancelToken::new());
        let (tx, rx) = mpsc::channel();
        let stats = scheduler.run(paths, &tx);
        drop(tx);
        let (hashed, failed) = collect(rx);

        assert_eq!(hashed.len(), 5);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].stage(), "stat");
        assert_eq!(stats.files, 5);
        assert_eq!(stats.failures, 1);
    }

    #[test]
    fn weights_never_exceed_capacity() {
        let tmp = tempfile::tempdir().unwrap();
        let breakpoint = 1024.0;
        // a: 0 bytes (1 unit), b: one breakpoint (1 unit), c: three (3 units),
        // and a batch of files that each need the whole budget.
        fs::write(tmp.path().join("a"), b"").unwrap();
        fs::write(tmp.path().join("b"), vec![1u8; 1024]).unwrap();
        fs::write(tmp.path().join("c"), vec![2u8; 3 * 1024]).unwrap();
        for i in 0..12 {
            fs::write(tmp.path().join(format!("big{i}")), vec![i as u8; 64 * 1024]).unwrap();
        }

        let cancel = CancelToken::new();
        let walker = Walker::new(tmp.path(), WalkOptions::default(), cancel.clone()).unwrap();
        let budget = Budget::new(4, breakpoint);
        assert_eq!([budget.weight(0), budget.weight(1024), budget.weight(3072)], [1, 1, 3]);

        let settings = HashSettings {
            algorithm: Algorithm::Md5,
            chunk_size: 512,
        };
        let scheduler = Scheduler::new(budget, settings, cancel);
        let (tx, rx) = mpsc::channel();
        let stats = scheduler.run(walker, &tx);
        drop(tx);

        assert_eq!(stats.files, 15);
        assert_eq!(collect(rx).0.len(), 15);
        assert!(scheduler.gate().peak_in_flight() <= 4);
        assert_eq!(scheduler.gate().available(), 4);
    }

    #[test]
    fn cancelled_run_admits_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let expected = write_tree(tmp.path(), 6);
        let cancel = CancelToken::new();
        cancel.cancel();
        let scheduler = Scheduler::new(Budget::new(2, 64.0), settings(), cancel);
        let (tx, rx) = mpsc::channel();
        let stats = scheduler.run(expected.into_keys(), &tx);
        drop(tx);
        assert_eq!(stats.files, 0);
        assert_eq!(rx.iter().count(), 0);
    }

    #[test]
    fn lost_receiver_stops_dispatch() {
        let tmp = tempfile::tempdir().unwrap();
        let expected = write_tree(tmp.path(), 50);
        let cancel = CancelToken::new();
        let budget = Budget::new(1, 1024.0 * 1024.0);
        let scheduler = Scheduler::new(budget, settings(), cancel.clone());
        let (tx, rx) = mpsc::channel();
        drop(rx);

        let stats = scheduler.run(expected.into_keys(), &tx);
        assert!(cancel.is_cancelled());
        // the first worker holds the only unit until its send has failed
        assert_eq!(stats.files, 1);
        assert_eq!(scheduler.gate().available(), 1);
    }

    #[test]
    fn run_walk_counts_unreadable_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("gone")).unwrap();
        fs::create_dir_all(root.join("kept")).unwrap();
        fs::write(root.join("first.txt"), b"first").unwrap();
        fs::write(root.join("gone/lost.txt"), b"lost").unwrap();
        fs::write(root.join("kept/found.txt"), b"found").unwrap();

        let cancel = CancelToken::new();
        let mut walker = Walker::new(root, WalkOptions::default(), cancel.clone()).unwrap();
        // listing the root queues both subdirectories before either is read
        assert!(walker.next().unwrap().ends_with("first.txt"));
        fs::remove_dir_all(root.join("gone")).unwrap();

        let scheduler = Scheduler::new(Budget::new(2, 1024.0), settings(), cancel);
        let (tx, rx) = mpsc::channel();
        let stats = scheduler.run_walk(&mut walker, &tx);
        drop(tx);
        let (hashed, failed) = collect(rx);

        assert_eq!(hashed.len(), 1);
        assert!(failed.is_empty());
        assert_eq!(stats.files, 1);
        assert_eq!(stats.failures, 0);
        assert_eq!(stats.enumeration_errors, 1);
    }

    #[cfg(unix)]
    #[test]
    fn open_failure_is_reported_and_releases_nothing() {
        use std::os::unix::net::UnixListener;

        let tmp = tempfile::tempdir().unwrap();
        let expected = write_tree(tmp.path(), 6);
        // stat succeeds on a socket, opening it does not
        let socket = tmp.path().join("listener.sock");
        let _listener = UnixListener::bind(&socket).unwrap();
        let mut paths: Vec<PathBuf> = expected.keys().cloned().collect();
        paths.insert(3, socket);

        let scheduler = Scheduler::new(Budget::new(2, 1024.0), settings(), CancelToken::new());
        let (tx, rx) = mpsc::channel();
        let stats = scheduler.run(paths, &tx);
        drop(tx);
        let (hashed, failed) = collect(rx);

        assert_eq!(hashed.len(), 6);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].stage(), "open");
        assert_eq!(stats.files, 6);
        assert_eq!(stats.failures, 1);
        assert_eq!(scheduler.gate().available(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_file_in_a_walk_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let expected = write_tree(tmp.path(), 10);
        let locked = tmp.path().join("d1").join("locked.bin");
        fs::write(&locked, b"secret").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if File::open(&locked).is_ok() {
            // running as root; permissions are not enforced
            return;
        }

        let cancel = CancelToken::new();
        let mut walker = Walker::new(tmp.path(), WalkOptions::default(), cancel.clone()).unwrap();
        let scheduler = Scheduler::new(Budget::new(3, 1024.0), settings(), cancel);
        let (tx, rx) = mpsc::channel();
        let stats = scheduler.run_walk(&mut walker, &tx);
        drop(tx);
        let (hashed, failed) = collect(rx);

        assert_eq!(hashed.len(), expected.len());
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].stage(), "open");
        assert_eq!(stats.files, 10);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.enumeration_errors, 0);
        assert_eq!(scheduler.gate().available(), 3);
    }
}
