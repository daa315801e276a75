//! Repository Manager: clones or locates the source repo, enumerates its
//! commits, and owns the lifecycle of per-worker worktrees.
//!
//! Every method opens its own short-lived `git2::Repository` handle rather
//! than holding one across calls — libgit2 handles are not meant to be
//! driven concurrently from multiple threads, and keeping `RepositoryManager`
//! itself free of any `git2` state means it is trivially `Send + Sync` and
//! can be shared by reference across the worker pool.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::RepoError;
use crate::model::Commit;

pub struct RepositoryManager {
    base_path: PathBuf,
    work_root: PathBuf,
}

impl RepositoryManager {
    /// `initialize(repo_location, work_root) -> {base_path, commits[]}`.
    pub fn initialize(
        repo_location: &str,
        work_root: &Path,
    ) -> Result<(Self, Vec<Commit>), RepoError> {
        let base_path = if is_remote_location(repo_location) {
            let dest = work_root.join("repo_base");
            git2::Repository::clone(repo_location, &dest).map_err(|source| {
                RepoError::CloneFailed {
                    url: repo_location.to_string(),
                    source,
                }
            })?;
            dest
        } else {
            PathBuf::from(repo_location)
        };

        let repo = git2::Repository::open(&base_path).map_err(|source| RepoError::OpenFailed {
            path: base_path.clone(),
            source,
        })?;
        let commits = enumerate_commits(&repo)?;

        Ok((
            Self {
                base_path,
                work_root: work_root.to_path_buf(),
            },
            commits,
        ))
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn open_base(&self) -> Result<git2::Repository, RepoError> {
        git2::Repository::open(&self.base_path).map_err(|source| RepoError::OpenFailed {
            path: self.base_path.clone(),
            source,
        })
    }

    fn worktree_path(&self, worker_id: usize) -> PathBuf {
        self.work_root
            .join("worktrees")
            .join(format!("worker-{worker_id}"))
    }

    fn worktree_name(worker_id: usize) -> String {
        format!("worker-{worker_id}")
    }

    /// `acquire_worktree(worker_id) -> path`. Succeeds even if a stale
    /// worktree directory or administrative entry survives from a prior
    /// aborted run: the stale entry is pruned and any residual directory is
    /// removed before a fresh worktree is created in its place.
    pub fn acquire_worktree(&self, worker_id: usize) -> Result<PathBuf, RepoError> {
        let repo = self.open_base()?;
        let name = Self::worktree_name(worker_id);
        let path = self.worktree_path(worker_id);

        if let Ok(existing) = repo.find_worktree(&name) {
            let mut prune_opts = git2::WorktreePruneOptions::new();
            prune_opts.valid(true).locked(true).working_tree(true);
            let _ = existing.prune(Some(&mut prune_opts));
        }
        if path.exists() {
            std::fs::remove_dir_all(&path).map_err(|source| {
                RepoError::WorktreeAcquireIoFailed {
                    worker_id,
                    reason: source.to_string(),
                }
            })?;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| {
                RepoError::WorktreeAcquireIoFailed {
                    worker_id,
                    reason: source.to_string(),
                }
            })?;
        }

        let worktree = repo
            .worktree(&name, &path, None)
            .map_err(|source| RepoError::WorktreeAcquireFailed { worker_id, source })?;
        worktree
            .validate()
            .map_err(|source| RepoError::WorktreeAcquireFailed { worker_id, source })?;

        Ok(path)
    }

    /// `checkout(worktree, commit_hash)`. Detaches HEAD at the target
    /// commit; never updates a branch ref. Untracked residue from the
    /// previous commit is removed first so file discovery at the new
    /// commit is not polluted. Retries up to 3 times with 200ms+jitter
    /// backoff on index/ref lock contention, matching the base clone's own
    /// locking protocol for concurrent worktree checkouts.
    pub fn checkout(&self, worktree_path: &Path, commit_hash: &str) -> Result<(), RepoError> {
        const MAX_ATTEMPTS: u32 = 3;
        let mut attempt = 0;
        loop {
            match checkout_once(worktree_path, commit_hash) {
                Ok(()) => return Ok(()),
                Err(source) if attempt < MAX_ATTEMPTS && is_lock_contention(&source) => {
                    attempt += 1;
                    std::thread::sleep(Duration::from_millis(200 + jitter_ms()));
                }
                Err(source) => {
                    return Err(RepoError::CheckoutFailure {
                        commit_hash: commit_hash.to_string(),
                        reason: source.to_string(),
                    });
                }
            }
        }
    }

    /// `release_all()`. Removes every worktree and prunes its
    /// administrative entry from the base. Best-effort: a failure to
    /// remove one worktree does not prevent cleanup of the others.
    pub fn release_all(&self) -> Result<(), RepoError> {
        if let Ok(repo) = self.open_base() {
            if let Ok(names) = repo.worktrees() {
                for name in names.iter().flatten() {
                    if let Ok(worktree) = repo.find_worktree(name) {
                        let mut prune_opts = git2::WorktreePruneOptions::new();
                        prune_opts.valid(true).locked(true).working_tree(true);
                        let _ = worktree.prune(Some(&mut prune_opts));
                    }
                }
            }
        }
        let worktrees_dir = self.work_root.join("worktrees");
        if worktrees_dir.exists() {
            let _ = std::fs::remove_dir_all(&worktrees_dir);
        }
        Ok(())
    }
}

fn checkout_once(worktree_path: &Path, commit_hash: &str) -> Result<(), git2::Error> {
    let repo = git2::Repository::open(worktree_path)?;
    clean_untracked(&repo)?;

    let oid = git2::Oid::from_str(commit_hash)?;
    let commit = repo.find_commit(oid)?;
    repo.set_head_detached(oid)?;

    let mut builder = git2::build::CheckoutBuilder::new();
    builder.force().remove_untracked(true);
    repo.checkout_tree(commit.as_object(), Some(&mut builder))?;
    Ok(())
}

fn clean_untracked(repo: &git2::Repository) -> Result<(), git2::Error> {
    let Some(workdir) = repo.workdir().map(Path::to_path_buf) else {
        return Ok(());
    };
    let mut opts = git2::StatusOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(false);
    let statuses = repo.statuses(Some(&mut opts))?;
    for entry in statuses.iter() {
        if !entry.status().contains(git2::Status::WT_NEW) {
            continue;
        }
        let Some(rel) = entry.path() else { continue };
        let full = workdir.join(rel);
        let _ = std::fs::remove_file(&full).or_else(|_| std::fs::remove_dir_all(&full));
    }
    Ok(())
}

fn is_lock_contention(err: &git2::Error) -> bool {
    err.code() == git2::ErrorCode::Locked
}

fn jitter_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64 % 200)
        .unwrap_or(0)
}

fn enumerate_commits(repo: &git2::Repository) -> Result<Vec<Commit>, RepoError> {
    let head = match repo.head() {
        Ok(head) => head,
        Err(err)
            if err.code() == git2::ErrorCode::UnbornBranch
                || err.code() == git2::ErrorCode::NotFound =>
        {
            return Ok(vec![]);
        }
        Err(err) => return Err(RepoError::EnumerationFailed(err)),
    };
    let Some(head_oid) = head.target() else {
        return Ok(vec![]);
    };

    let mut revwalk = repo.revwalk().map_err(RepoError::EnumerationFailed)?;
    revwalk
        .push(head_oid)
        .map_err(RepoError::EnumerationFailed)?;
    revwalk
        .set_sorting(git2::Sort::TIME | git2::Sort::REVERSE)
        .map_err(RepoError::EnumerationFailed)?;

    let mut commits = Vec::new();
    for oid in revwalk {
        let oid = oid.map_err(RepoError::EnumerationFailed)?;
        let commit = repo
            .find_commit(oid)
            .map_err(RepoError::EnumerationFailed)?;
        let parent_hash = commit.parent_id(0).ok().map(|id| id.to_string());
        commits.push(Commit {
            hash: oid.to_string(),
            parent_hash,
            author_date: commit.author().when().seconds(),
        });
    }
    Ok(commits)
}

fn is_remote_location(repo_location: &str) -> bool {
    repo_location.contains("://") || repo_location.starts_with("git@")
}
