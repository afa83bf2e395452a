// src/cli.rs
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::EngineConfig;

#[derive(Parser)]
#[command(name = "archdoc", version, about = "Incremental parallel source-tree analyzer")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a source tree, reprocessing only what changed
    Scan {
        /// Root directory to scan
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Upper bound on concurrent workers
        #[arg(long)]
        workers: Option<usize>,
        /// Reprocess every file regardless of tracked state
        #[arg(long)]
        no_incremental: bool,
        /// Stop dispatching new files after this many failures
        #[arg(long)]
        max_errors: Option<usize>,
        /// Skip files larger than this many bytes
        #[arg(long)]
        max_file_size: Option<u64>,
        /// Location of the state file
        #[arg(long)]
        state: Option<PathBuf>,
        /// Hash file contents so touched-but-unmodified files are skipped
        #[arg(long)]
        signatures: bool,
        /// Cache payloads in the state file and reuse them for unchanged files
        #[arg(long)]
        cache_payloads: bool,
        /// Emit the merged result map as JSON on stdout
        #[arg(long)]
        json: bool,
        #[arg(long, short)]
        verbose: bool,
    },
}

impl Commands {
    /// Folds CLI flags over the file-loaded configuration.
    #[must_use]
    pub fn apply_to(&self, mut config: EngineConfig) -> EngineConfig {
        let Self::Scan {
            workers,
            no_incremental,
            max_errors,
            max_file_size,
            state,
            signatures,
            cache_payloads,
            verbose,
            ..
        } = self;

        if let Some(w) = workers {
            config.max_workers = *w;
        }
        if *no_incremental {
            config.incremental = false;
        }
        if let Some(n) = max_errors {
            config.max_errors = *n;
        }
        if let Some(n) = max_file_size {
            config.max_file_size = *n;
        }
        if let Some(p) = state {
            config.state_path = p.clone();
        }
        if *signatures {
            config.use_signatures = true;
        }
        if *cache_payloads {
            config.cache_payloads = true;
        }
        if *verbose {
            config.verbose = true;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_flag_overrides() {
        let cli = Cli::parse_from([
            "archdoc",
            "scan",
            ".",
            "--workers",
            "2",
            "--no-incremental",
            "--max-errors",
            "5",
        ]);
        let config = cli.command.apply_to(EngineConfig::default());
        assert_eq!(config.max_workers, 2);
        assert!(!config.incremental);
        assert_eq!(config.max_errors, 5);
    }

    #[test]
    fn test_defaults_untouched_without_flags() {
        let cli = Cli::parse_from(["archdoc", "scan"]);
        let base = EngineConfig::default();
        let config = cli.command.apply_to(base.clone());
        assert_eq!(config.max_errors, base.max_errors);
        assert_eq!(config.incremental, base.incremental);
    }
}
