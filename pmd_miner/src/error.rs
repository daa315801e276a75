//! Error kinds, one `thiserror` enum per component, following the bucket
//! semantics fixed by the error-handling design: per-commit errors are
//! recovered locally, setup-phase errors are surfaced and map to an exit
//! code.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("failed to clone {url}: {source}")]
    CloneFailed {
        url: String,
        #[source]
        source: git2::Error,
    },

    #[error("failed to open repository at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: git2::Error,
    },

    #[error("failed to enumerate commits: {0}")]
    EnumerationFailed(#[source] git2::Error),

    #[error("failed to acquire worktree for worker {worker_id}: {source}")]
    WorktreeAcquireFailed {
        worker_id: usize,
        #[source]
        source: git2::Error,
    },

    #[error("failed to acquire worktree for worker {worker_id}: {reason}")]
    WorktreeAcquireIoFailed { worker_id: usize, reason: String },

    #[error("checkout of {commit_hash} failed: {reason}")]
    CheckoutFailure { commit_hash: String, reason: String },
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache file at {path} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("failed to persist cache to {path}: {source}")]
    PersistFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("analyzer unreachable at {url} after {deadline_secs}s")]
    Unreachable { url: String, deadline_secs: u64 },

    #[error("analyzer returned an unexpected status {status}: {body}")]
    Protocol { status: u16, body: String },

    #[error("analyzer reported an internal error: {message}")]
    Internal { message: String },

    #[error("transport error talking to analyzer: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error(transparent)]
    Repository(#[from] RepoError),

    #[error(transparent)]
    Analyzer(#[from] AnalyzerError),

    #[error("disk error: {0}")]
    Disk(#[source] std::io::Error),
}

impl PipelineError {
    /// Maps a setup-phase error to its CLI exit code. Per-commit outcomes
    /// (skipped/failed) never go through here — only failures that abort
    /// the whole batch do.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::InvalidArguments(_) => 2,
            PipelineError::Repository(_) => 3,
            PipelineError::Analyzer(_) => 4,
            PipelineError::Disk(_) => 1,
        }
    }
}
