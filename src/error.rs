use std::path::PathBuf;
use thiserror::Error;

/// Reasons a persisted cache document cannot be trusted.
///
/// Every variant degrades to "no cache" at the call site; none of them is
/// surfaced to the user as a failure.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache file not found: {0}")]
    Missing(PathBuf),

    #[error("cache schema version {found} does not match expected {expected}")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("cache file {path} is not valid JSON: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize cache document: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failures while turning a finished run into cache entries.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no coverage report or module graph found (looked for {0})")]
    CoverageMissing(PathBuf),

    #[error("no test results found (looked for {0})")]
    ResultsMissing(PathBuf),

    #[error("malformed coverage report {path}: {reason}")]
    MalformedCoverage { path: PathBuf, reason: String },

    #[error("malformed test results {path}: {reason}")]
    MalformedResults { path: PathBuf, reason: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to discover step definitions: {0}")]
    Discovery(String),

    #[error("hashing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl ExtractError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Missing inputs mean the run produced nothing to record; the update is a
    /// no-op rather than a failure.
    pub fn is_missing_input(&self) -> bool {
        matches!(self, Self::CoverageMissing(_) | Self::ResultsMissing(_))
    }
}
