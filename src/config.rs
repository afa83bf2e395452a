// src/config.rs
//! Engine configuration: defaults, `archdoc.toml` loading, CLI overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Item counts below this run single-worker on the calling thread.
/// Pool startup costs more than it buys on small work sets.
pub const SEQUENTIAL_THRESHOLD: usize = 16;

#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on concurrent workers. Capped further by core count
    /// and work-item count at run time.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Skip files whose tracked metadata matches the disk.
    #[serde(default = "default_incremental")]
    pub incremental: bool,

    /// Files larger than this never become work items.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Failure count at which new dispatch stops.
    #[serde(default = "default_max_errors")]
    pub max_errors: usize,

    /// Location of the persisted change-tracking state.
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    /// Compute content signatures so touched-but-unmodified files are
    /// not reprocessed. Costs one full read per changed-looking file.
    #[serde(default)]
    pub use_signatures: bool,

    /// Store successful payloads in the state file and serve them for
    /// unchanged files on later runs.
    #[serde(default)]
    pub cache_payloads: bool,

    /// How long cancellation waits for in-flight items, in milliseconds.
    #[serde(default = "default_cancel_grace_ms")]
    pub cancel_grace_ms: u64,

    #[serde(default)]
    pub verbose: bool,

    /// Substring patterns; when non-empty, only matching paths are scanned.
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// Substring patterns removed from the scan set.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

fn default_max_workers() -> usize {
    num_cpus::get()
}
fn default_incremental() -> bool {
    true
}
fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}
fn default_max_errors() -> usize {
    10
}
fn default_state_path() -> PathBuf {
    PathBuf::from(".archdoc/state.json")
}
fn default_cancel_grace_ms() -> u64 {
    2_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            incremental: default_incremental(),
            max_file_size: default_max_file_size(),
            max_errors: default_max_errors(),
            state_path: default_state_path(),
            use_signatures: false,
            cache_payloads: false,
            cancel_grace_ms: default_cancel_grace_ms(),
            verbose: false,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `archdoc.toml` from `root` when present, falling back to
    /// defaults otherwise.
    ///
    /// # Errors
    /// Returns error only if a config file exists but cannot be parsed.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join("archdoc.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let file: ConfigFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        Ok(file.engine)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns error if limits are degenerate.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.max_workers > 0, "max_workers must be at least 1");
        anyhow::ensure!(self.max_errors > 0, "max_errors must be at least 1");
        Ok(())
    }
}

/// On-disk shape of `archdoc.toml`: everything under an `[engine]` table.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    engine: EngineConfig,
}

/// Picks the worker count for a run. Pure so tests can pin `cores`
/// instead of stubbing the OS.
#[must_use]
pub fn select_worker_count(item_count: usize, max_workers: usize, cores: usize) -> usize {
    if item_count < SEQUENTIAL_THRESHOLD {
        return 1;
    }
    max_workers.min(cores).min(item_count).max(1)
}
