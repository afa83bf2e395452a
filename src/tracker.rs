// src/tracker.rs
//! File change tracking and state persistence.
//!
//! The tracker decides which files actually need reprocessing. It keys
//! everything by canonical absolute path so a file tracked under two
//! relative spellings cannot produce duplicate records.
//!
//! The state file is loaded once per run and written exactly once at the
//! end, via temp-file-then-rename, so a crash mid-write leaves the previous
//! valid state on disk. An unreadable or schema-mismatched state degrades
//! to a cold start with a warning; it is never a fatal error.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::error::{EngineError, Result};

/// Bump on breaking schema changes. States with a different version are
/// discarded (cold start), never migrated in place.
pub const STATE_VERSION: u32 = 1;

/// Metadata snapshot for one tracked file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub size: u64,
    /// Modification time as milliseconds since the Unix epoch.
    pub mtime_ms: u64,
    /// Hex SHA-256 of the content. Present only when signatures are enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Cached work payload. Present only when payload caching is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// Persistent mapping from canonical path to its last-known metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisState {
    pub version: u32,
    pub files: HashMap<PathBuf, FileRecord>,
}

impl AnalysisState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION,
            files: HashMap::new(),
        }
    }

    #[must_use]
    pub fn record(&self, path: &Path) -> Option<&FileRecord> {
        self.files.get(path)
    }
}

impl Default for AnalysisState {
    fn default() -> Self {
        Self::new()
    }
}

/// Decides whether files need reprocessing and persists the decisions.
#[derive(Debug, Clone)]
pub struct FileChangeTracker {
    /// When true, a stored signature can veto an mtime mismatch and a
    /// signature mismatch forces reprocessing even when mtime agrees.
    use_signatures: bool,
}

impl FileChangeTracker {
    #[must_use]
    pub fn new(use_signatures: bool) -> Self {
        Self { use_signatures }
    }

    /// Loads state from disk. Fails soft: any read, parse, or version
    /// problem yields an empty state and a warning on stderr.
    #[must_use]
    pub fn load(&self, path: &Path) -> AnalysisState {
        if !path.exists() {
            return AnalysisState::new();
        }
        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<AnalysisState>(&content) {
                Ok(state) if state.version == STATE_VERSION => state,
                Ok(state) => {
                    eprintln!(
                        "WARN: state file {} has version {} (expected {}), starting cold",
                        path.display(),
                        state.version,
                        STATE_VERSION
                    );
                    AnalysisState::new()
                }
                Err(e) => {
                    eprintln!(
                        "WARN: state file {} is unreadable ({e}), starting cold",
                        path.display()
                    );
                    AnalysisState::new()
                }
            },
            Err(e) => {
                eprintln!(
                    "WARN: failed to read state file {} ({e}), starting cold",
                    path.display()
                );
                AnalysisState::new()
            }
        }
    }

    /// Returns true when `path` is untracked or its on-disk metadata
    /// differs from the stored record.
    ///
    /// With signatures enabled, a matching signature overrides an mtime
    /// mismatch (touched-but-unmodified files are not reprocessed) and a
    /// mismatching one forces reprocessing.
    #[must_use]
    pub fn has_changed(&self, state: &AnalysisState, path: &Path) -> bool {
        let Some(record) = state.record(path) else {
            return true;
        };
        let Ok(meta) = fs::metadata(path) else {
            // Vanished or unreadable; let the dispatch path surface it.
            return true;
        };

        let size_matches = meta.len() == record.size;
        let mtime_matches = mtime_millis(&meta) == Some(record.mtime_ms);

        if self.use_signatures {
            if let Some(stored) = &record.signature {
                if size_matches && mtime_matches {
                    return false;
                }
                // Metadata drifted: the content hash is the tiebreaker.
                return match content_signature(path) {
                    Some(current) => current != *stored,
                    None => true,
                };
            }
        }

        !(size_matches && mtime_matches)
    }

    /// Updates `state` with `path`'s *current* metadata, captured now
    /// rather than at work-item creation, so a concurrent external edit
    /// is picked up on the next run instead of being masked.
    pub fn record_success(
        &self,
        state: &mut AnalysisState,
        path: &Path,
        payload: Option<serde_json::Value>,
    ) {
        let Ok(meta) = fs::metadata(path) else {
            // File vanished between processing and bookkeeping. Leave any
            // prior record alone so the next run retries it.
            return;
        };
        let signature = if self.use_signatures {
            content_signature(path)
        } else {
            None
        };
        state.files.insert(
            path.to_path_buf(),
            FileRecord {
                size: meta.len(),
                mtime_ms: mtime_millis(&meta).unwrap_or(0),
                signature,
                payload,
            },
        );
    }

    /// Persists `state` atomically: serialize to a sibling temp file, then
    /// rename over the target.
    ///
    /// # Errors
    /// Returns `EngineError::StatePersist` on any write failure. This is
    /// the one engine error allowed to reach the caller as a hard error.
    pub fn save(&self, state: &AnalysisState, path: &Path) -> Result<()> {
        let persist_err = |source: std::io::Error| EngineError::StatePersist {
            source,
            path: path.to_path_buf(),
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(persist_err)?;
            }
        }

        let content = serde_json::to_string_pretty(state)
            .map_err(|e| persist_err(std::io::Error::other(e)))?;

        let tmp = temp_sibling(path);
        fs::write(&tmp, content).map_err(persist_err)?;
        fs::rename(&tmp, path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            persist_err(e)
        })?;
        Ok(())
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map_or_else(
        || std::ffi::OsString::from("state"),
        std::ffi::OsStr::to_os_string,
    );
    name.push(".tmp");
    path.with_file_name(name)
}

fn mtime_millis(meta: &fs::Metadata) -> Option<u64> {
    let mtime = meta.modified().ok()?;
    let since = mtime.duration_since(UNIX_EPOCH).ok()?;
    u64::try_from(since.as_millis()).ok()
}

/// Hex SHA-256 of the file content, or None if unreadable.
fn content_signature(path: &Path) -> Option<String> {
    let content = fs::read(path).ok()?;
    let mut hasher = Sha256::new();
    hasher.update(&content);
    Some(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let p = dir.path().join(name);
        fs::write(&p, content).unwrap();
        p
    }

    #[test]
    fn test_untracked_file_is_changed() {
        let dir = TempDir::new().unwrap();
        let f = write_file(&dir, "a.rs", "fn main() {}");
        let tracker = FileChangeTracker::new(false);
        let state = AnalysisState::new();
        assert!(tracker.has_changed(&state, &f));
    }

    #[test]
    fn test_recorded_file_is_unchanged() {
        let dir = TempDir::new().unwrap();
        let f = write_file(&dir, "a.rs", "fn main() {}");
        let tracker = FileChangeTracker::new(false);
        let mut state = AnalysisState::new();
        tracker.record_success(&mut state, &f, None);
        assert!(!tracker.has_changed(&state, &f));
    }

    #[test]
    fn test_content_edit_is_detected() {
        let dir = TempDir::new().unwrap();
        let f = write_file(&dir, "a.rs", "fn main() {}");
        let tracker = FileChangeTracker::new(false);
        let mut state = AnalysisState::new();
        tracker.record_success(&mut state, &f, None);

        fs::write(&f, "fn main() { println!(); }").unwrap();
        assert!(tracker.has_changed(&state, &f));
    }

    #[test]
    fn test_signature_match_overrides_mtime_drift() {
        let dir = TempDir::new().unwrap();
        let f = write_file(&dir, "a.rs", "fn main() {}");
        let tracker = FileChangeTracker::new(true);
        let mut state = AnalysisState::new();
        tracker.record_success(&mut state, &f, None);

        // Rewrite identical content: mtime moves, bytes do not.
        fs::write(&f, "fn main() {}").unwrap();
        let rec = state.record(&f).unwrap().clone();
        // Force an apparent mtime mismatch regardless of filesystem
        // timestamp granularity.
        state.files.get_mut(&f).unwrap().mtime_ms = rec.mtime_ms.wrapping_sub(10_000);
        assert!(!tracker.has_changed(&state, &f));
    }

    #[test]
    fn test_signature_mismatch_forces_reprocess() {
        let dir = TempDir::new().unwrap();
        let f = write_file(&dir, "a.rs", "old");
        let tracker = FileChangeTracker::new(true);
        let mut state = AnalysisState::new();
        tracker.record_success(&mut state, &f, None);

        fs::write(&f, "new").unwrap();
        assert!(tracker.has_changed(&state, &f));
    }

    #[test]
    fn test_save_load_round_trip_preserves_decisions() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a.rs", "alpha");
        let b = write_file(&dir, "b.rs", "beta");
        let state_path = dir.path().join("state.json");

        let tracker = FileChangeTracker::new(false);
        let mut state = AnalysisState::new();
        tracker.record_success(&mut state, &a, None);
        tracker.save(&state, &state_path).unwrap();

        let loaded = tracker.load(&state_path);
        assert!(!tracker.has_changed(&loaded, &a));
        assert!(tracker.has_changed(&loaded, &b));
    }

    #[test]
    fn test_corrupt_state_is_cold_start() {
        let dir = TempDir::new().unwrap();
        let state_path = dir.path().join("state.json");
        fs::write(&state_path, "{ not json").unwrap();

        let tracker = FileChangeTracker::new(false);
        let state = tracker.load(&state_path);
        assert!(state.files.is_empty());
        assert_eq!(state.version, STATE_VERSION);
    }

    #[test]
    fn test_version_mismatch_is_cold_start() {
        let dir = TempDir::new().unwrap();
        let state_path = dir.path().join("state.json");
        fs::write(&state_path, r#"{"version": 999, "files": {}}"#).unwrap();

        let tracker = FileChangeTracker::new(false);
        let state = tracker.load(&state_path);
        assert!(state.files.is_empty());
        assert_eq!(state.version, STATE_VERSION);
    }

    #[test]
    fn test_missing_state_is_cold_start() {
        let tracker = FileChangeTracker::new(false);
        let state = tracker.load(Path::new("/nonexistent/state.json"));
        assert!(state.files.is_empty());
    }

    #[test]
    fn test_save_creates_parent_and_no_tmp_residue() {
        let dir = TempDir::new().unwrap();
        let state_path = dir.path().join("nested/dir/state.json");

        let tracker = FileChangeTracker::new(false);
        tracker.save(&AnalysisState::new(), &state_path).unwrap();
        assert!(state_path.exists());
        assert!(!temp_sibling(&state_path).exists());
    }

    #[test]
    fn test_payload_round_trips_through_state() {
        let dir = TempDir::new().unwrap();
        let f = write_file(&dir, "a.rs", "x");
        let state_path = dir.path().join("state.json");

        let tracker = FileChangeTracker::new(false);
        let mut state = AnalysisState::new();
        tracker.record_success(&mut state, &f, Some(serde_json::json!({"lines": 1})));
        tracker.save(&state, &state_path).unwrap();

        let loaded = tracker.load(&state_path);
        let rec = loaded.record(&f).unwrap();
        assert_eq!(rec.payload, Some(serde_json::json!({"lines": 1})));
    }
}
