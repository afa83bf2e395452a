// src/orchestrator.rs
//! The engine facade: classify, dispatch, aggregate, persist.
//!
//! A run is one call to [`Orchestrator::process`]. State is loaded once at
//! the start and persisted exactly once at the end — including threshold
//! and cancellation exits — never incrementally, so a crash mid-run leaves
//! the previous valid state intact and the next run at worst reprocesses
//! files that were already up to date.

use colored::Colorize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::accumulator::ErrorAccumulator;
use crate::cancel::CancelToken;
use crate::config::{select_worker_count, EngineConfig};
use crate::error::Result;
use crate::pool::{PoolOutcome, WorkFn, WorkItem, WorkerPool};
use crate::progress::ProgressReporter;
use crate::tracker::{AnalysisState, FileChangeTracker};
use crate::types::{
    ErrorKind, ErrorRecord, ProcessingResult, RunReport, RunStatus, SkipCause,
};

/// Outcome of pre-dispatch classification for one input file.
enum Classified {
    Work(WorkItem),
    Skip(PathBuf, SkipCause),
    Unreadable(ErrorRecord),
}

pub struct Orchestrator {
    config: EngineConfig,
    tracker: FileChangeTracker,
}

impl Orchestrator {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let tracker = FileChangeTracker::new(config.use_signatures);
        Self { config, tracker }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs `work` over every file that needs it and returns the merged,
    /// path-keyed report.
    ///
    /// # Errors
    /// Only a failure to persist the updated state at the end of the run
    /// propagates; every per-file problem is surfaced as data in the report.
    pub fn process(
        &self,
        files: &[PathBuf],
        work: &WorkFn,
        cancel: &CancelToken,
    ) -> Result<RunReport> {
        let start = Instant::now();
        let mut state = self.tracker.load(&self.config.state_path);

        let mut work_items = Vec::new();
        let mut skipped = BTreeMap::new();
        let mut reused = Vec::new();
        let mut results: BTreeMap<PathBuf, serde_json::Value> = BTreeMap::new();
        let mut pre_dispatch_errors = Vec::new();

        for file in files {
            match self.classify(&state, file) {
                Classified::Work(item) => work_items.push(item),
                Classified::Skip(path, cause) => {
                    if cause == SkipCause::Unchanged && self.config.cache_payloads {
                        if let Some(payload) =
                            state.record(&path).and_then(|r| r.payload.clone())
                        {
                            results.insert(path.clone(), payload);
                            reused.push(path.clone());
                        }
                    }
                    skipped.insert(path, cause);
                }
                Classified::Unreadable(rec) => pre_dispatch_errors.push(rec),
            }
        }

        let outcome = self.dispatch(work_items, work, cancel);

        let mut processed = 0;
        for result in &outcome.results {
            if let ProcessingResult::Success { path, payload } = result {
                let cached = self.config.cache_payloads.then(|| payload.clone());
                self.tracker.record_success(&mut state, path, cached);
                results.insert(path.clone(), payload.clone());
            }
            processed += 1;
        }

        // The single write of the run. Threshold and cancellation exits
        // still persist what succeeded, so finished work is not redone.
        self.tracker.save(&state, &self.config.state_path)?;

        let mut errors = pre_dispatch_errors;
        errors.extend(outcome.results.into_iter().filter_map(|r| match r {
            ProcessingResult::Failure(rec) => Some(rec),
            _ => None,
        }));

        Ok(RunReport {
            status: outcome.status,
            results,
            skipped,
            reused,
            errors,
            processed,
            duration: start.elapsed(),
        })
    }

    fn classify(&self, state: &AnalysisState, file: &Path) -> Classified {
        let path = canonical(file);

        let meta = match std::fs::metadata(&path) {
            Ok(m) => m,
            Err(e) => {
                return Classified::Unreadable(ErrorRecord::new(
                    path,
                    format!("cannot stat: {e}"),
                    ErrorKind::Read,
                ))
            }
        };

        // Oversized files are a warning, not an error: they never become
        // work items and never count toward the threshold.
        if meta.len() > self.config.max_file_size {
            if self.config.verbose {
                eprintln!(
                    "{} {} ({} bytes, limit {})",
                    "WARN: skipping oversized file".yellow(),
                    path.display(),
                    meta.len(),
                    self.config.max_file_size
                );
            }
            return Classified::Skip(
                path,
                SkipCause::TooLarge {
                    size: meta.len(),
                    limit: self.config.max_file_size,
                },
            );
        }

        if self.config.incremental && !self.tracker.has_changed(state, &path) {
            return Classified::Skip(path, SkipCause::Unchanged);
        }

        Classified::Work(WorkItem { path })
    }

    fn dispatch(&self, items: Vec<WorkItem>, work: &WorkFn, cancel: &CancelToken) -> PoolOutcome {
        if items.is_empty() {
            return PoolOutcome {
                results: Vec::new(),
                status: RunStatus::Completed,
            };
        }

        let workers = select_worker_count(items.len(), self.config.max_workers, num_cpus::get());
        let pool = WorkerPool::new(workers, Duration::from_millis(self.config.cancel_grace_ms));
        let errors = Arc::new(ErrorAccumulator::new(self.config.max_errors));

        let mut reporter = ProgressReporter::new(items.len());
        let verbose = self.config.verbose;

        pool.run(items, work, &errors, cancel, |_result| {
            reporter.on_completed(1);
            if verbose && reporter.should_render() {
                eprintln!("  {}", reporter.render_line());
            }
        })
    }
}

/// Canonicalizes a path for use as a state/report key. Falls back to the
/// given path when canonicalization fails (e.g. the file vanished); the
/// stat in `classify` then reports it properly.
fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
