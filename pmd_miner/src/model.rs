//! Data types shared across the pipeline: commits, files, cache keys,
//! findings, and the documents persisted to disk.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A commit reachable from the default branch's tip, as enumerated by the
/// repository manager. Immutable once discovered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Commit {
    pub hash: String,
    pub parent_hash: Option<String>,
    pub author_date: i64,
}

/// One `.java` file discovered in a worktree at a given commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileEntry {
    /// Slash-separated path relative to the worktree root.
    pub rel_path: String,
    pub content_hash: String,
}

/// `(content-hash, ruleset-id)` — the unit the file hash cache is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub content_hash: String,
    pub ruleset_id: String,
}

/// A single analyzer warning, kept verbatim from the Analyzer's JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub rule: String,
    pub severity: String,
    pub file: String,
    pub begin_line: u32,
    pub begin_column: u32,
    pub end_line: u32,
    pub end_column: u32,
    pub description: String,
}

/// The persisted per-commit document at `pmd_results/<commit_hash>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitResult {
    pub commit_hash: String,
    pub num_java_files: usize,
    pub findings: Vec<Finding>,
}

/// What happened to one commit during the batch. Exactly one variant is
/// ever produced per commit, and `Success` is the only one that leaves a
/// file behind in `pmd_results/`.
#[derive(Debug, Clone)]
pub enum CommitOutcome {
    Success(CommitResult),
    Skipped { hash: String, reason: String },
    Failed { hash: String, reason: String },
}

impl CommitOutcome {
    pub fn commit_hash(&self) -> &str {
        match self {
            CommitOutcome::Success(result) => &result.commit_hash,
            CommitOutcome::Skipped { hash, .. } | CommitOutcome::Failed { hash, .. } => hash,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RepoStats {
    pub number_of_commits: usize,
    pub avg_of_num_java_files: f64,
    pub avg_of_num_warnings: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ErrorStats {
    pub skipped: usize,
    pub failed: usize,
}

/// The persisted aggregate document at `summary.json`.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub location: String,
    pub stat_of_repository: RepoStats,
    pub stat_of_warnings: BTreeMap<String, u64>,
    pub stat_of_errors: ErrorStats,
}
