//! Aggregator: folds every commit's outcome into the run's `summary.json`
//! once the batch finishes (or is abandoned on cancellation, in which case
//! the caller never calls this at all).

use std::collections::BTreeMap;

use crate::model::{CommitOutcome, ErrorStats, RepoStats, Summary};

pub fn aggregate(location: &str, outcomes: &[CommitOutcome]) -> Summary {
    let mut total_java_files = 0u64;
    let mut total_warnings = 0u64;
    let mut stat_of_warnings: BTreeMap<String, u64> = BTreeMap::new();
    let mut skipped = 0usize;
    let mut failed = 0usize;
    let mut successful = 0usize;

    for outcome in outcomes {
        match outcome {
            CommitOutcome::Success(result) => {
                successful += 1;
                total_java_files += result.num_java_files as u64;
                total_warnings += result.findings.len() as u64;
                for finding in &result.findings {
                    *stat_of_warnings.entry(finding.rule.clone()).or_insert(0) += 1;
                }
            }
            CommitOutcome::Skipped { .. } => skipped += 1,
            CommitOutcome::Failed { .. } => failed += 1,
        }
    }

    let avg_of_num_java_files = checked_avg(total_java_files, successful);
    let avg_of_num_warnings = checked_avg(total_warnings, successful);

    Summary {
        location: location.to_string(),
        stat_of_repository: RepoStats {
            number_of_commits: successful,
            avg_of_num_java_files,
            avg_of_num_warnings,
        },
        stat_of_warnings,
        stat_of_errors: ErrorStats { skipped, failed },
    }
}

/// Division by zero yields `0.0` rather than `NaN` — an empty or
/// all-skipped batch still produces a summary a caller can serialize and
/// compare without special-casing `NaN`.
fn checked_avg(total: u64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        total as f64 / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CommitResult, Finding};

    fn finding(rule: &str) -> Finding {
        Finding {
            rule: rule.to_string(),
            severity: "warning".to_string(),
            file: "A.java".to_string(),
            begin_line: 1,
            begin_column: 1,
            end_line: 1,
            end_column: 1,
            description: "desc".to_string(),
        }
    }

    #[test]
    fn empty_batch_has_zeroed_averages() {
        let summary = aggregate("/repo", &[]);
        assert_eq!(summary.stat_of_repository.number_of_commits, 0);
        assert_eq!(summary.stat_of_repository.avg_of_num_java_files, 0.0);
        assert_eq!(summary.stat_of_repository.avg_of_num_warnings, 0.0);
    }

    #[test]
    fn number_of_commits_and_averages_count_only_successful_commits() {
        let outcomes = vec![
            CommitOutcome::Success(CommitResult {
                commit_hash: "a".to_string(),
                num_java_files: 10,
                findings: vec![finding("RuleA"), finding("RuleA")],
            }),
            CommitOutcome::Skipped {
                hash: "b".to_string(),
                reason: "checkout failed".to_string(),
            },
            CommitOutcome::Failed {
                hash: "c".to_string(),
                reason: "analyzer error".to_string(),
            },
        ];
        let summary = aggregate("/repo", &outcomes);

        assert_eq!(summary.stat_of_repository.number_of_commits, 1);
        assert_eq!(summary.stat_of_repository.avg_of_num_java_files, 10.0);
        assert_eq!(summary.stat_of_repository.avg_of_num_warnings, 2.0);
        assert_eq!(summary.stat_of_errors.skipped, 1);
        assert_eq!(summary.stat_of_errors.failed, 1);
        assert_eq!(summary.stat_of_warnings.get("RuleA"), Some(&2));
    }

    #[test]
    fn stat_of_warnings_counts_across_commits() {
        let outcomes = vec![
            CommitOutcome::Success(CommitResult {
                commit_hash: "a".to_string(),
                num_java_files: 1,
                findings: vec![finding("RuleA")],
            }),
            CommitOutcome::Success(CommitResult {
                commit_hash: "b".to_string(),
                num_java_files: 1,
                findings: vec![finding("RuleA"), finding("RuleB")],
            }),
        ];
        let summary = aggregate("/repo", &outcomes);
        assert_eq!(summary.stat_of_warnings.get("RuleA"), Some(&2));
        assert_eq!(summary.stat_of_warnings.get("RuleB"), Some(&1));
    }
}
