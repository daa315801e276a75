use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use pmd_miner::analyzer::AnalyzerClient;
use pmd_miner::analyzer_process::AnalyzerProcess;
use pmd_miner::cache::FileHashCache;
use pmd_miner::cli::Cli;
use pmd_miner::error::{CacheError, PipelineError};
use pmd_miner::model::{CommitOutcome, Summary};
use pmd_miner::progress::Progress;
use pmd_miner::repo::RepositoryManager;
use pmd_miner::scheduler::{run_scheduler, PipelineOutcome};
use pmd_miner::{aggregate, hash};

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);
    let code = run(&cli).unwrap_or_else(|err| {
        eprintln!("pmd-miner: {err}");
        err.exit_code()
    });
    std::process::exit(code);
}

fn init_tracing(cli: &Cli) {
    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn run(cli: &Cli) -> Result<i32, PipelineError> {
    validate_args(cli)?;
    std::fs::create_dir_all(&cli.output_dir).map_err(PipelineError::Disk)?;

    let (repo, commits) = RepositoryManager::initialize(&cli.repo_location, &cli.output_dir)?;
    tracing::info!(count = commits.len(), "enumerated commits");

    if cli.dry_run {
        println!("{}", commits.len());
        return Ok(0);
    }

    let ruleset_id = hash::hash_file(&cli.ruleset).map_err(PipelineError::Disk)?;
    let cache_path = (!cli.no_cache).then(|| {
        cli.cache_file
            .clone()
            .unwrap_or_else(|| cli.output_dir.join("cache.bin"))
    });
    let cache = load_cache(cache_path.as_deref());

    let _analyzer_process;
    let base_url = if let Some(cmd) = &cli.analyzer_cmd {
        let process = AnalyzerProcess::spawn(cmd)?;
        let url = process.base_url();
        _analyzer_process = Some(process);
        url
    } else {
        _analyzer_process = None;
        cli.analyzer_url.clone().expect("validated above")
    };
    let analyzer = AnalyzerClient::new(base_url);
    analyzer.wait_until_ready(None)?;

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        let _ = ctrlc::set_handler(move || cancel.store(true, Ordering::SeqCst));
    }

    let progress = Progress::new(commits.len());
    let aux_classpath = cli.aux_classpath();
    let outcome = run_scheduler(
        &repo,
        commits,
        cli.worker_count(),
        &cache,
        &analyzer,
        &cli.ruleset,
        &ruleset_id,
        aux_classpath.as_deref(),
        &cli.output_dir,
        Arc::clone(&cancel),
        &progress,
    );

    match outcome {
        PipelineOutcome::Fatal(err) => Err(PipelineError::Disk(err)),
        PipelineOutcome::Cancelled(_) => {
            tracing::warn!("run cancelled; summary.json not written");
            if let Err(err) = repo.release_all() {
                tracing::warn!(%err, "failed to release worktrees after cancellation");
            }
            Ok(130)
        }
        PipelineOutcome::Completed(outcomes) => {
            if let Some(path) = &cache_path {
                if let Err(err) = cache.persist(path) {
                    tracing::warn!(%err, "failed to persist cache snapshot");
                }
            }
            persist_summary(&cli.output_dir, &outcomes)?;
            if let Err(err) = repo.release_all() {
                tracing::warn!(%err, "failed to release worktrees after shutdown");
            }
            Ok(exit_code_for(&outcomes))
        }
    }
}

fn validate_args(cli: &Cli) -> Result<(), PipelineError> {
    if cli.analyzer_url.is_none() && cli.analyzer_cmd.is_none() {
        return Err(PipelineError::InvalidArguments(
            "one of --analyzer-url or --analyzer-cmd is required".to_string(),
        ));
    }
    Ok(())
}

/// Loads a persisted cache snapshot when `cache_path` names a file that
/// already exists. A corrupt snapshot is discarded with a single warning
/// rather than aborting the run.
fn load_cache(cache_path: Option<&Path>) -> FileHashCache {
    let Some(path) = cache_path else {
        return FileHashCache::new();
    };
    if !path.exists() {
        return FileHashCache::new();
    }
    match FileHashCache::load(path) {
        Ok(cache) => cache,
        Err(CacheError::Corrupt { path, message }) => {
            tracing::warn!(path = %path.display(), message, "cache file corrupt, starting empty");
            FileHashCache::new()
        }
        Err(err) => {
            tracing::warn!(%err, "failed to load cache, starting empty");
            FileHashCache::new()
        }
    }
}

fn persist_summary(output_dir: &Path, outcomes: &[CommitOutcome]) -> Result<(), PipelineError> {
    let location = output_dir
        .canonicalize()
        .unwrap_or_else(|_| output_dir.to_path_buf());
    let summary: Summary = aggregate::aggregate(&location.to_string_lossy(), outcomes);

    let final_path = output_dir.join("summary.json");
    let tmp_path = output_dir.join(".summary.json.tmp");
    let bytes = serde_json::to_vec_pretty(&summary).map_err(|err| {
        PipelineError::Disk(std::io::Error::other(err.to_string()))
    })?;
    std::fs::write(&tmp_path, &bytes).map_err(PipelineError::Disk)?;
    std::fs::rename(&tmp_path, &final_path).map_err(PipelineError::Disk)?;
    Ok(())
}

/// Exit code reflects the worst outcome observed: success if every commit
/// succeeded, partial (5) if any commit was skipped or failed.
fn exit_code_for(outcomes: &[CommitOutcome]) -> i32 {
    let any_trouble = outcomes
        .iter()
        .any(|o| !matches!(o, CommitOutcome::Success(_)));
    if any_trouble {
        5
    } else {
        0
    }
}
