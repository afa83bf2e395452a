// src/types.rs
//! Common data structures shared across the engine.
//!
//! Everything here is plain, owned data: results cross thread boundaries
//! (worker -> collector) and must carry no live handles.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Why a file was skipped without ever becoming a work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipCause {
    /// Tracked metadata matches the file on disk; incremental mode elides it.
    Unchanged,
    /// File exceeds the configured size ceiling.
    TooLarge { size: u64, limit: u64 },
}

impl std::fmt::Display for SkipCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unchanged => write!(f, "unchanged"),
            Self::TooLarge { size, limit } => {
                write!(f, "exceeds size limit ({size} > {limit} bytes)")
            }
        }
    }
}

/// Classifies where a per-file failure originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The file could not be read or stat'd.
    Read,
    /// The work function returned an error.
    Work,
    /// The work function panicked; caught at the worker boundary.
    Panic,
}

/// One per-file failure. Appended by the completion path, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub path: PathBuf,
    pub message: String,
    pub kind: ErrorKind,
}

impl ErrorRecord {
    #[must_use]
    pub fn new(path: PathBuf, message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            path,
            message: message.into(),
            kind,
        }
    }
}

/// Outcome of one file passing through the engine.
#[derive(Debug, Clone)]
pub enum ProcessingResult {
    Success {
        path: PathBuf,
        payload: serde_json::Value,
    },
    Failure(ErrorRecord),
    Skipped {
        path: PathBuf,
        cause: SkipCause,
    },
}

impl ProcessingResult {
    #[must_use]
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Success { path, .. } | Self::Skipped { path, .. } => path,
            Self::Failure(rec) => &rec.path,
        }
    }
}

/// How a run ended. Callers need to tell "too many bad files" apart from
/// "the user interrupted us".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Completed,
    ThresholdExceeded,
    Cancelled,
}

/// Merged output of a run, keyed by canonical path so the result is a
/// deterministic function of the input set regardless of completion order.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: RunStatus,
    /// Payloads of files processed this run, plus cached payloads of
    /// unchanged files when payload caching is enabled.
    pub results: BTreeMap<PathBuf, serde_json::Value>,
    /// Files that never became work items, with the reason.
    pub skipped: BTreeMap<PathBuf, SkipCause>,
    /// Subset of `results` served from the state cache rather than recomputed.
    pub reused: Vec<PathBuf>,
    pub errors: Vec<ErrorRecord>,
    /// Count of files actually run through the work function.
    pub processed: usize,
    pub duration: Duration,
}

impl RunReport {
    /// True when every input file either succeeded or was skipped.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.status == RunStatus::Completed && self.errors.is_empty()
    }
}
