use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;

use crate::cancel::CancelToken;
use crate::error::FileError;
use crate::gate::Permit;
use crate::tracker::{JobTicket, Tracker};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// 128-bit MD5
    #[default]
    Md5,
    /// 256-bit BLAKE3
    Blake3,
}

enum Hasher {
    Md5(Md5),
    Blake3(Box<blake3::Hasher>),
}

impl Hasher {
    fn new(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Md5 => Hasher::Md5(Md5::new()),
            Algorithm::Blake3 => Hasher::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Md5(h) => h.update(data),
            Hasher::Blake3(h) => {
                h.update(data);
            }
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Hasher::Md5(h) => format!("{:x}", h.finalize()),
            Hasher::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

/// Stream `reader` through `algorithm` in `chunk_size` reads, returning the
/// lowercase hex digest and the byte count. Stops early if `cancel` is set.
pub fn digest_reader<R: Read>(
    mut reader: R,
    algorithm: Algorithm,
    chunk_size: usize,
    cancel: &CancelToken,
) -> io::Result<Option<(String, u64)>> {
    let mut hasher = Hasher::new(algorithm);
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;
    loop {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    Ok(Some((hasher.finalize_hex(), total)))
}

/// One admitted file. Owns everything that must be given back when hashing
/// ends: the handle, the gate units and the tracker slot.
#[derive(Debug)]
pub struct Job {
    pub path: PathBuf,
    pub file: File,
    pub permit: Permit,
    pub ticket: JobTicket,
}

#[derive(Debug)]
pub enum Report {
    Hashed { path: PathBuf, digest: String, bytes: u64 },
    Failed(FileError),
}

#[derive(Debug, Clone)]
pub struct HashSettings {
    pub algorithm: Algorithm,
    pub chunk_size: usize,
}

/// Hash one job to completion and send its report.
///
/// The job is consumed. The file is closed as soon as reading stops,
/// successful or not. The permit and then the ticket are released after the
/// report is sent, so a joined tracker implies every report has been
/// delivered. If nobody is listening any more, the run is cancelled.
pub fn run(
    job: Job,
    settings: &HashSettings,
    tracker: &Tracker,
    cancel: &CancelToken,
    reports: &Sender<Report>,
) {
    let Job {
        path,
        file,
        permit,
        ticket,
    } = job;

    let result = digest_reader(&file, settings.algorithm, settings.chunk_size, cancel);
    drop(file);

    let report = match result {
        Ok(Some((digest, bytes))) => {
            tracker.record_hashed(bytes);
            Report::Hashed { path, digest, bytes }
        }
        Ok(None) => {
            tracker.record_failure();
            Report::Failed(FileError::Cancelled { path })
        }
        Err(source) => {
            tracker.record_failure();
            Report::Failed(FileError::Read { path, source })
        }
    };
    if reports.send(report).is_err() {
        cancel.cancel();
    }
    drop(permit);
    drop(ticket);
}

/// Run `job` on its own thread.
pub fn spawn(
    job: Job,
    settings: Arc<HashSettings>,
    tracker: Arc<Tracker>,
    cancel: CancelToken,
    reports: Sender<Report>,
) -> Result<(), FileError> {
    let path = job.path.clone();
    thread::Builder::new()
        .name("hash-worker".into())
        .spawn(move || run(job, &settings, &tracker, &cancel, &reports))
        .map(|_| ())
        .map_err(|source| FileError::Spawn { path, source })
}
