// src/error.rs
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error: {source} (path: {path})")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },

    /// The one engine error that reaches callers as a hard failure: a
    /// state file that cannot be written threatens every future
    /// incremental run.
    #[error("Failed to persist analysis state to {path}: {source}")]
    StatePersist {
        source: std::io::Error,
        path: PathBuf,
    },
}

pub type Result<T> = std::result::Result<T, EngineError>;

// Allow `?` on std::io::Error by converting to EngineError::Io with unknown path.
impl From<std::io::Error> for EngineError {
    fn from(source: std::io::Error) -> Self {
        EngineError::Io {
            source,
            path: PathBuf::from("<unknown>"),
        }
    }
}
