//! Commit Job: the pure-per-commit pipeline step run once per commit
//! within a worker — checkout, discover files, hash and classify, dispatch
//! to the Analyzer for cache misses, merge, store in cache, and persist.

use std::collections::HashMap;
use std::io;
use std::path::Path;

use crate::analyzer::AnalyzerClient;
use crate::cache::FileHashCache;
use crate::error::RepoError;
use crate::model::{CacheKey, CommitOutcome, CommitResult, FileEntry, Finding};
use crate::repo::RepositoryManager;

pub struct JobContext<'a> {
    pub repo: &'a RepositoryManager,
    pub cache: &'a FileHashCache,
    pub analyzer: &'a AnalyzerClient,
    pub ruleset_path: &'a Path,
    pub ruleset_id: &'a str,
    pub aux_classpath: Option<&'a str>,
    pub output_dir: &'a Path,
}

/// Runs one commit to completion. `Ok` carries the commit's outcome
/// (success/skipped/failed); `Err` is reserved for the one failure mode
/// that is fatal to the whole batch — a disk error while persisting the
/// result.
pub fn run_commit_job(ctx: &JobContext<'_>, worktree_path: &Path, commit_hash: &str) -> Result<CommitOutcome, io::Error> {
    if let Err(source) = checkout(ctx, worktree_path, commit_hash) {
        return Ok(CommitOutcome::Skipped {
            hash: commit_hash.to_string(),
            reason: source.to_string(),
        });
    }

    let files = match discover_java_files(worktree_path) {
        Ok(files) => files,
        Err(source) => {
            return Ok(CommitOutcome::Skipped {
                hash: commit_hash.to_string(),
                reason: source.to_string(),
            });
        }
    };

    let (cached_findings, to_analyze) = classify(ctx, &files);

    let fresh_by_file = if to_analyze.is_empty() {
        HashMap::new()
    } else {
        let rel_paths: Vec<String> = to_analyze.iter().map(|f| f.rel_path.clone()).collect();
        match ctx
            .analyzer
            .analyze(worktree_path, ctx.ruleset_path, ctx.aux_classpath, &rel_paths)
        {
            Ok(findings) => group_by_file(findings),
            Err(source) => {
                return Ok(CommitOutcome::Failed {
                    hash: commit_hash.to_string(),
                    reason: source.to_string(),
                });
            }
        }
    };

    let mut all_findings = cached_findings;
    store_and_merge(ctx, &to_analyze, fresh_by_file, &mut all_findings);
    sort_findings(&mut all_findings);

    let result = CommitResult {
        commit_hash: commit_hash.to_string(),
        num_java_files: files.len(),
        findings: all_findings,
    };
    persist_commit_result(ctx.output_dir, &result)?;
    Ok(CommitOutcome::Success(result))
}

fn checkout(ctx: &JobContext<'_>, worktree_path: &Path, commit_hash: &str) -> Result<(), RepoError> {
    ctx.repo.checkout(worktree_path, commit_hash)
}

fn classify(ctx: &JobContext<'_>, files: &[FileEntry]) -> (Vec<Finding>, Vec<FileEntry>) {
    let mut cached_findings = Vec::new();
    let mut to_analyze = Vec::new();
    for file in files {
        let key = CacheKey {
            content_hash: file.content_hash.clone(),
            ruleset_id: ctx.ruleset_id.to_string(),
        };
        match ctx.cache.get(&key) {
            Some(findings) => cached_findings.extend(findings),
            None => to_analyze.push(file.clone()),
        }
    }
    (cached_findings, to_analyze)
}

fn group_by_file(findings: Vec<Finding>) -> HashMap<String, Vec<Finding>> {
    let mut grouped: HashMap<String, Vec<Finding>> = HashMap::new();
    for finding in findings {
        grouped.entry(finding.file.clone()).or_default().push(finding);
    }
    grouped
}

/// Stores every cache-miss file's findings under its `CacheKey` — including
/// an empty list when the Analyzer reported nothing for it, otherwise the
/// miss would repeat on the next commit that reintroduces identical bytes —
/// and folds the fresh findings into the merged result.
fn store_and_merge(
    ctx: &JobContext<'_>,
    to_analyze: &[FileEntry],
    mut fresh_by_file: HashMap<String, Vec<Finding>>,
    all_findings: &mut Vec<Finding>,
) {
    for file in to_analyze {
        let findings = fresh_by_file.remove(&file.rel_path).unwrap_or_default();
        let key = CacheKey {
            content_hash: file.content_hash.clone(),
            ruleset_id: ctx.ruleset_id.to_string(),
        };
        ctx.cache.put(key, findings.clone());
        all_findings.extend(findings);
    }
}

/// Primary key file path (lexicographic), secondary begin-line ascending,
/// tertiary rule name — required so downstream diffs between adjacent
/// commits are stable regardless of worker scheduling order.
fn sort_findings(findings: &mut [Finding]) {
    findings.sort_by(|a, b| {
        a.file
            .cmp(&b.file)
            .then(a.begin_line.cmp(&b.begin_line))
            .then(a.rule.cmp(&b.rule))
    });
}

fn discover_java_files(root: &Path) -> io::Result<Vec<FileEntry>> {
    let walker = ignore::WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(false)
        .git_exclude(false)
        .git_global(false)
        .build();

    let mut out = Vec::new();
    for entry in walker {
        let entry = entry.map_err(io::Error::other)?;
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let path = entry.path();
        if path.components().any(|c| c.as_os_str() == ".git") {
            continue;
        }
        if path.extension().and_then(|ext| ext.to_str()) != Some("java") {
            continue;
        }
        let rel_path = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        let content_hash = crate::hash::hash_file(path)?;
        out.push(FileEntry {
            rel_path,
            content_hash,
        });
    }
    out.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(out)
}

fn persist_commit_result(output_dir: &Path, result: &CommitResult) -> io::Result<()> {
    let dir = output_dir.join("pmd_results");
    std::fs::create_dir_all(&dir)?;
    let final_path = dir.join(format!("{}.json", result.commit_hash));
    let tmp_path = dir.join(format!(".{}.json.tmp", result.commit_hash));
    let bytes = serde_json::to_vec_pretty(result).map_err(io::Error::other)?;
    std::fs::write(&tmp_path, &bytes)?;
    std::fs::rename(&tmp_path, &final_path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(file: &str, rule: &str, begin_line: u32) -> Finding {
        Finding {
            rule: rule.to_string(),
            severity: "warning".to_string(),
            file: file.to_string(),
            begin_line,
            begin_column: 1,
            end_line: begin_line,
            end_column: 1,
            description: "desc".to_string(),
        }
    }

    #[test]
    fn sort_findings_orders_by_file_then_line_then_rule() {
        let mut findings = vec![
            finding("B.java", "RuleA", 1),
            finding("A.java", "RuleB", 5),
            finding("A.java", "RuleA", 5),
            finding("A.java", "RuleZ", 1),
        ];
        sort_findings(&mut findings);
        let order: Vec<(&str, &str, u32)> = findings
            .iter()
            .map(|f| (f.file.as_str(), f.rule.as_str(), f.begin_line))
            .collect();
        assert_eq!(
            order,
            vec![
                ("A.java", "RuleZ", 1),
                ("A.java", "RuleA", 5),
                ("A.java", "RuleB", 5),
                ("B.java", "RuleA", 1),
            ]
        );
    }

    #[test]
    fn discover_java_files_skips_dot_git_and_non_java() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".git/objects")).unwrap();
        std::fs::write(dir.path().join(".git/objects/pack-ish"), b"x").unwrap();
        std::fs::write(dir.path().join("A.java"), b"class A {}").unwrap();
        std::fs::write(dir.path().join("README.md"), b"hi").unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/B.java"), b"class B {}").unwrap();

        let files = discover_java_files(dir.path()).unwrap();
        let rel_paths: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(rel_paths, vec!["A.java", "src/B.java"]);
    }

    #[test]
    fn persist_commit_result_writes_readable_json() {
        let dir = tempfile::tempdir().unwrap();
        let result = CommitResult {
            commit_hash: "abc123".to_string(),
            num_java_files: 1,
            findings: vec![finding("A.java", "RuleA", 1)],
        };
        persist_commit_result(dir.path(), &result).unwrap();

        let path = dir.path().join("pmd_results/abc123.json");
        let contents = std::fs::read_to_string(path).unwrap();
        let reparsed: CommitResult = serde_json::from_str(&contents).unwrap();
        assert_eq!(reparsed.commit_hash, "abc123");
        assert_eq!(reparsed.findings.len(), 1);
    }
}
