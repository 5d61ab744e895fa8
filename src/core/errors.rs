use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for the orchestration library.
///
/// Most engine- and stage-level code works with `anyhow::Result` and wraps
/// failures with context; this enum covers the boundaries where callers
/// want to match on the failure class (git plumbing, snapshots, config).
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A git subprocess returned a non-zero status or could not be spawned.
    #[error("git {operation} failed: {message}")]
    Git { operation: String, message: String },

    /// Filesystem errors around worktree directories and data dirs.
    #[error("io operation failed: {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// Snapshot save/load errors (serialization or filesystem).
    #[error("snapshot {operation} failed at {path}")]
    Snapshot {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Team configuration errors.
    #[error("configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

pub type Result<T, E = OrchestratorError> = std::result::Result<T, E>;

impl OrchestratorError {
    pub fn git(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Git {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_operation() {
        let err = OrchestratorError::git("merge feature/x", "conflict");
        assert_eq!(err.to_string(), "git merge feature/x failed: conflict");
    }
}
