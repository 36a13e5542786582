use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A failure confined to one file or directory. None of these stop the run.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("cannot list directory {}: {source}", .path.display())]
    Enumeration { path: PathBuf, source: io::Error },

    #[error("cannot stat {}: {source}", .path.display())]
    Stat { path: PathBuf, source: io::Error },

    #[error("cannot open {}: {source}", .path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("read failed for {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("cannot start worker for {}: {source}", .path.display())]
    Spawn { path: PathBuf, source: io::Error },

    #[error("cancelled while hashing {}", .path.display())]
    Cancelled { path: PathBuf },
}

impl FileError {
    pub fn stage(&self) -> &'static str {
        match self {
            FileError::Enumeration { .. } => "enumerate",
            FileError::Stat { .. } => "stat",
            FileError::Open { .. } => "open",
            FileError::Read { .. } => "read",
            FileError::Spawn { .. } => "spawn",
            FileError::Cancelled { .. } => "cancel",
        }
    }
}

/// Device profile values that cannot produce a usable admission budget.
#[derive(Debug, Error, PartialEq)]
pub enum ProfileError {
    #[error("{field} must be a finite number, got {value}")]
    NotFinite { field: &'static str, value: f64 },

    #[error("{field} must be greater than zero, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    #[error("amplification must be at least 1.0, got {0}")]
    Amplification(f64),

    #[error("buffer size must be at least one byte")]
    EmptyBuffer,

    #[error("buffer size {size} exceeds the {max} byte limit")]
    BufferTooLarge { size: u64, max: u64 },
}
