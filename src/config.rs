use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cli::ProfileArgs;
use crate::profile::DeviceProfile;
use crate::worker::Algorithm;

const OPTIONS_FILE: &str = "pacehash_options.yaml";

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub throughput: Option<f64>,
    pub latency: Option<f64>,
    pub random_access_preference: Option<f64>,
    pub buffer_size: Option<u64>,
    pub amplification: Option<f64>,
    pub algorithm: Option<Algorithm>,
    pub follow_symlinks: bool,
    pub hidden: bool,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl Config {
    /// Load config from pacehash_options.yaml, checking CWD first then exe dir.
    pub fn load() -> Result<Self> {
        for path in &config_candidates() {
            if path.exists() {
                return Self::from_file(path);
            }
        }
        Ok(Config::default())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// CLI values first, then this file, then built-in defaults.
    pub fn device_profile(&self, args: &ProfileArgs) -> DeviceProfile {
        let defaults = DeviceProfile::default();
        DeviceProfile {
            throughput: args.throughput.or(self.throughput).unwrap_or(defaults.throughput),
            latency: args.latency.or(self.latency).unwrap_or(defaults.latency),
            random_access_preference: args
                .random_access_preference
                .or(self.random_access_preference)
                .unwrap_or(defaults.random_access_preference),
            buffer_size: args.buffer_size.or(self.buffer_size).unwrap_or(defaults.buffer_size),
            amplification: args
                .amplification
                .or(self.amplification)
                .unwrap_or(defaults.amplification),
        }
    }
}

fn config_candidates() -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from(OPTIONS_FILE)];
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            candidates.push(dir.join(OPTIONS_FILE));
        }
    }
    candidates
}
