use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::worker::Algorithm;

#[derive(Parser)]
#[command(name = "pacehash", about = "Hash a directory tree without overrunning the disk")]
pub struct Cli {
    /// Log admission decisions and skipped entries
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print `<path> <digest>` for every file under a directory
    Hash(HashArgs),
    /// Show the admission budget derived from the device profile
    Profile(ProfileArgs),
}

/// Device profile overrides; unset values come from the options file.
#[derive(Args, Clone, Default)]
pub struct ProfileArgs {
    /// Sustained device throughput in bytes per second
    #[arg(long, value_name = "BYTES_PER_SEC")]
    pub throughput: Option<f64>,

    /// Round-trip I/O latency in seconds
    #[arg(long, value_name = "SECONDS")]
    pub latency: Option<f64>,

    /// File size in MiB at which a file starts costing two admission units
    #[arg(long, value_name = "MIB")]
    pub random_access_preference: Option<f64>,

    /// Bytes per read call
    #[arg(long, value_name = "BYTES")]
    pub buffer_size: Option<u64>,

    /// Overhead factor applied to the bandwidth-delay product (>= 1)
    #[arg(long)]
    pub amplification: Option<f64>,
}

#[derive(Args)]
pub struct HashArgs {
    /// Directory (or single file) to hash (default: current directory)
    pub root: Option<PathBuf>,

    /// Digest algorithm
    #[arg(long, value_enum)]
    pub algorithm: Option<Algorithm>,

    /// Follow symbolic links
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Include hidden files and directories
    #[arg(long)]
    pub hidden: bool,

    /// Include only files matching these glob patterns
    #[arg(long, value_name = "GLOB")]
    pub include: Vec<String>,

    /// Exclude files matching these glob patterns
    #[arg(long, value_name = "GLOB")]
    pub exclude: Vec<String>,

    #[command(flatten)]
    pub profile: ProfileArgs,
}
