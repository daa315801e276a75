//! CLI surface: a `clap` derive struct mirroring the teacher's own `args`
//! module conventions, with explicit exit-code handling rather than
//! `clap`'s auto-exit so the pipeline's own exit codes are the only ones
//! the process ever returns.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "pmd-miner", about = "Mines commit history through an external Java analyzer")]
pub struct Cli {
    /// Git URL or local path to the repository to mine.
    pub repo_location: String,

    /// Ruleset XML passed through to the Analyzer.
    #[arg(short, long)]
    pub ruleset: PathBuf,

    /// Output root for results, cache, and worktrees.
    #[arg(short, long)]
    pub output_dir: PathBuf,

    /// Worker count; defaults to the available CPU count.
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Extra classpath entries passed through to the Analyzer.
    #[arg(long = "aux-jars", num_args = 0.., value_delimiter = ',')]
    pub aux_jars: Vec<String>,

    #[arg(short, long)]
    pub verbose: bool,

    #[arg(short, long)]
    pub quiet: bool,

    /// Base URL of an already-running Analyzer service.
    #[arg(long, conflicts_with = "analyzer_cmd")]
    pub analyzer_url: Option<String>,

    /// Command to launch the Analyzer as a sibling process; its stdout is
    /// expected to print the listening port as its first line.
    #[arg(long, conflicts_with = "analyzer_url")]
    pub analyzer_cmd: Option<String>,

    /// Override the File Hash Cache snapshot path (default `<output>/cache.bin`).
    #[arg(long)]
    pub cache_file: Option<PathBuf>,

    /// Skip loading and persisting the File Hash Cache snapshot entirely.
    #[arg(long)]
    pub no_cache: bool,

    /// Enumerate commits and print the count without invoking the Analyzer.
    #[arg(long)]
    pub dry_run: bool,
}

impl Cli {
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get)
    }

    pub fn aux_classpath(&self) -> Option<String> {
        if self.aux_jars.is_empty() {
            None
        } else {
            Some(self.aux_jars.join(platform_path_separator()))
        }
    }
}

#[cfg(unix)]
fn platform_path_separator() -> &'static str {
    ":"
}

#[cfg(windows)]
fn platform_path_separator() -> &'static str {
    ";"
}
