//! Worker pool / scheduler: fans commits out across a bounded pool of
//! workers, each owning one worktree for the whole batch, pulling from a
//! single FIFO queue with bounded backpressure so memory stays flat even
//! across a repo with millions of commits. The queue is fed by a producer
//! thread rather than a pre-sharded slice, since a commit list that size
//! can't be held as strided chunks up front.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::sync_channel;
use std::sync::{Arc, Mutex};

use crate::analyzer::AnalyzerClient;
use crate::cache::FileHashCache;
use crate::job::{run_commit_job, JobContext};
use crate::model::{Commit, CommitOutcome};
use crate::progress::Progress;
use crate::repo::RepositoryManager;

pub enum PipelineOutcome {
    Completed(Vec<CommitOutcome>),
    Cancelled(Vec<CommitOutcome>),
    Fatal(std::io::Error),
}

#[allow(clippy::too_many_arguments)]
pub fn run_scheduler(
    repo: &RepositoryManager,
    commits: Vec<Commit>,
    worker_count: usize,
    cache: &FileHashCache,
    analyzer: &AnalyzerClient,
    ruleset_path: &Path,
    ruleset_id: &str,
    aux_classpath: Option<&str>,
    output_dir: &Path,
    cancel: Arc<AtomicBool>,
    progress: &Progress,
) -> PipelineOutcome {
    if commits.is_empty() {
        return PipelineOutcome::Completed(vec![]);
    }

    let worker_count = worker_count.max(1);
    let queue_bound = (worker_count * 4).max(1);
    let (tx, rx) = sync_channel::<Commit>(queue_bound);
    let rx = Arc::new(Mutex::new(rx));
    let fatal: Arc<Mutex<Option<std::io::Error>>> = Arc::new(Mutex::new(None));
    let outcomes: Arc<Mutex<Vec<CommitOutcome>>> = Arc::new(Mutex::new(Vec::with_capacity(commits.len())));

    // Worktrees are acquired up front, sequentially, on this thread: each
    // call opens and drops its own short-lived `git2::Repository` handle
    // (see repo.rs), but doing the acquisition itself off the worker
    // threads keeps worktree setup ordered and its errors easy to surface.
    let mut worktree_paths = Vec::with_capacity(worker_count);
    for worker_id in 0..worker_count {
        match repo.acquire_worktree(worker_id) {
            Ok(path) => worktree_paths.push(path),
            Err(err) => return PipelineOutcome::Fatal(std::io::Error::other(err.to_string())),
        }
    }

    std::thread::scope(|scope| {
        {
            let cancel = Arc::clone(&cancel);
            scope.spawn(move || {
                for commit in commits {
                    if cancel.load(Ordering::SeqCst) {
                        break;
                    }
                    if tx.send(commit).is_err() {
                        break;
                    }
                }
            });
        }

        for worktree_path in &worktree_paths {
            let rx = Arc::clone(&rx);
            let cancel = Arc::clone(&cancel);
            let fatal = Arc::clone(&fatal);
            let outcomes = Arc::clone(&outcomes);
            let ctx = JobContext {
                repo,
                cache,
                analyzer,
                ruleset_path,
                ruleset_id,
                aux_classpath,
                output_dir,
            };
            scope.spawn(move || {
                worker_loop(&ctx, worktree_path, &rx, &cancel, &fatal, &outcomes, progress);
            });
        }
    });

    if let Some(err) = fatal.lock().expect("fatal mutex poisoned").take() {
        return PipelineOutcome::Fatal(err);
    }
    let outcomes = Arc::try_unwrap(outcomes)
        .unwrap_or_else(|arc| Mutex::new(arc.lock().expect("outcomes mutex poisoned").clone()))
        .into_inner()
        .expect("outcomes mutex poisoned");

    if cancel.load(Ordering::SeqCst) {
        PipelineOutcome::Cancelled(outcomes)
    } else {
        PipelineOutcome::Completed(outcomes)
    }
}

#[allow(clippy::too_many_arguments)]
fn worker_loop(
    ctx: &JobContext<'_>,
    worktree_path: &Path,
    rx: &Arc<Mutex<std::sync::mpsc::Receiver<Commit>>>,
    cancel: &Arc<AtomicBool>,
    fatal: &Arc<Mutex<Option<std::io::Error>>>,
    outcomes: &Arc<Mutex<Vec<CommitOutcome>>>,
    progress: &Progress,
) {
    loop {
        if cancel.load(Ordering::SeqCst) {
            return;
        }
        let received = {
            let guard = rx.lock().expect("queue mutex poisoned");
            guard.recv()
        };
        let Ok(commit) = received else {
            return;
        };
        // A commit delivered after cancellation was requested is dropped
        // rather than started — only in-flight work finishes.
        if cancel.load(Ordering::SeqCst) {
            return;
        }

        match run_commit_job(ctx, worktree_path, &commit.hash) {
            Ok(outcome) => {
                progress.record_completed();
                outcomes.lock().expect("outcomes mutex poisoned").push(outcome);
            }
            Err(disk_err) => {
                let mut guard = fatal.lock().expect("fatal mutex poisoned");
                if guard.is_none() {
                    *guard = Some(disk_err);
                }
                cancel.store(true, Ordering::SeqCst);
                return;
            }
        }
    }
}
