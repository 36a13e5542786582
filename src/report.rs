use std::fmt;
use std::io::{self, Write};
use std::sync::mpsc::Receiver;
use std::time::Duration;
use tracing::warn;

use crate::tracker::RunStats;
use crate::worker::Report;

/// Write one `<path> <digest>` line per hashed file to `out` and log each
/// failure once. Returns when every sender has gone away.
pub fn print_reports<W: Write>(reports: Receiver<Report>, mut out: W) -> io::Result<()> {
    for report in reports {
        match report {
            Report::Hashed { path, digest, .. } => {
                writeln!(out, "{} {}", path.display(), digest)?;
            }
            Report::Failed(err) => {
                warn!(stage = err.stage(), "{err}");
            }
        }
    }
    out.flush()
}

/// Final numbers for a run, shown after join.
pub struct Summary {
    pub stats: RunStats,
    pub elapsed: Duration,
}

impl Summary {
    pub fn files_per_second(&self) -> f64 {
        per_second(self.stats.files as f64, self.elapsed)
    }

    pub fn bytes_per_second(&self) -> f64 {
        per_second(self.stats.bytes as f64, self.elapsed)
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hashed {} files ({}) in {:.1}s, {:.1} files/s, {}/s",
            self.stats.files,
            fmt_size(self.stats.bytes),
            self.elapsed.as_secs_f64(),
            self.files_per_second(),
            fmt_size(self.bytes_per_second() as u64),
        )?;
        if self.stats.failures > 0 || self.stats.enumeration_errors > 0 {
            write!(
                f,
                "; {} files failed, {} directories unreadable",
                self.stats.failures, self.stats.enumeration_errors
            )?;
        }
        Ok(())
    }
}

fn per_second(count: f64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        count / secs
    } else {
        0.0
    }
}

/// Human-readable byte size (e.g. "1.2 GB").
pub fn fmt_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    let b = bytes as f64;
    if b >= GB {
        format!("{:.1} GB", b / GB)
    } else if b >= MB {
        format!("{:.1} MB", b / MB)
    } else if b >= KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{} B", bytes)
    }
}
