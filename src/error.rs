//! Error taxonomy of the cause search

use thiserror::Error;

/// Errors surfaced by the level-wise cause search
///
/// `CacheMiss` and `CorruptCache` are recovered inside the searcher (they
/// send it down the discovery path); every other variant aborts the search
/// without reporting a partial cause set.
#[derive(Error, Debug)]
pub enum CauseSearchError {
    #[error("Trees cannot be paired below `{parent}`: {reason}")]
    StructuralMismatch { parent: String, reason: String },

    #[error("Measurement of {frontier} node(s) for {test_case} failed: {source}")]
    MeasurementFailed {
        test_case: String,
        frontier: usize,
        #[source]
        source: MeasurementError,
    },

    #[error("No cached search at {path}")]
    CacheMiss { path: String },

    #[error("Cache entry {path} is corrupt: {reason}")]
    CorruptCache { path: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to read trace {path}: {reason}")]
    TraceSource { path: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for cause search operations
pub type Result<T> = std::result::Result<T, CauseSearchError>;

/// Errors reported by a [`Measurer`](crate::searcher::Measurer)
#[derive(Error, Debug)]
pub enum MeasurementError {
    #[error("Failed to launch `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Run {vm} of version {version} exited with {status}")]
    ExitStatus {
        version: String,
        vm: usize,
        status: String,
    },

    #[error("Run {vm} of version {version} exceeded the timeout of {timeout_secs}s")]
    Timeout {
        version: String,
        vm: usize,
        timeout_secs: u64,
    },

    #[error("Invalid measurement record: {0}")]
    InvalidRecord(String),

    #[error("Target process crashed: {0}")]
    Crashed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
