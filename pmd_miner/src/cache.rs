//! File Hash Cache: a concurrent, write-once map from `CacheKey` to the
//! findings the Analyzer produced for that exact file contents under that
//! exact ruleset. No TTL, no eviction — it only grows within a run.

use std::collections::BTreeMap;
use std::path::Path;

use dashmap::DashMap;

use crate::error::CacheError;
use crate::model::{CacheKey, Finding};

pub struct FileHashCache {
    entries: DashMap<CacheKey, Vec<Finding>>,
}

impl FileHashCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Vec<Finding>> {
        self.entries.get(key).map(|entry| entry.clone())
    }

    /// Write-once: the first write for a key wins. A second writer racing
    /// on the same cache miss stores a byte-equal value (the Analyzer is
    /// deterministic for identical input), so last-writer-wins would be
    /// just as correct, but `entry().or_insert()` avoids the redundant
    /// write and makes the write-once discipline explicit.
    pub fn put(&self, key: CacheKey, findings: Vec<Finding>) {
        self.entries.entry(key).or_insert(findings);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Loads a persisted snapshot. A corrupt or unreadable file is reported
    /// as `CacheError::Corrupt`; the caller is expected to discard it and
    /// continue with an empty cache per the CacheCorrupt error policy.
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        let bytes = std::fs::read(path).map_err(|source| CacheError::Corrupt {
            path: path.to_path_buf(),
            message: source.to_string(),
        })?;
        let snapshot: BTreeMap<CacheKey, Vec<Finding>> =
            bincode::deserialize(&bytes).map_err(|source| CacheError::Corrupt {
                path: path.to_path_buf(),
                message: source.to_string(),
            })?;
        let entries = DashMap::new();
        for (key, value) in snapshot {
            entries.insert(key, value);
        }
        Ok(Self { entries })
    }

    /// Persists a snapshot via write-then-rename, the same atomic-publish
    /// pattern used for per-commit results.
    pub fn persist(&self, path: &Path) -> Result<(), CacheError> {
        let snapshot: BTreeMap<CacheKey, Vec<Finding>> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        let bytes = bincode::serialize(&snapshot).map_err(|source| CacheError::PersistFailed {
            path: path.to_path_buf(),
            source: std::io::Error::other(source.to_string()),
        })?;
        let tmp_path = path.with_extension("bin.tmp");
        std::fs::write(&tmp_path, &bytes).map_err(|source| CacheError::PersistFailed {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::rename(&tmp_path, path).map_err(|source| CacheError::PersistFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }
}

impl Default for FileHashCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn get_before_put_is_none() {
        let cache = FileHashCache::new();
        let key = CacheKey {
            content_hash: "abc".to_string(),
            ruleset_id: "r1".to_string(),
        };
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn put_then_get_round_trips() {
        let cache = FileHashCache::new();
        let key = CacheKey {
            content_hash: "abc".to_string(),
            ruleset_id: "r1".to_string(),
        };
        cache.put(key.clone(), vec![finding("UnusedPrivateField")]);
        assert_eq!(cache.get(&key).unwrap(), vec![finding("UnusedPrivateField")]);
    }

    #[test]
    fn second_write_to_same_key_is_ignored() {
        let cache = FileHashCache::new();
        let key = CacheKey {
            content_hash: "abc".to_string(),
            ruleset_id: "r1".to_string(),
        };
        cache.put(key.clone(), vec![finding("RuleA")]);
        cache.put(key.clone(), vec![finding("RuleB")]);
        assert_eq!(cache.get(&key).unwrap(), vec![finding("RuleA")]);
    }

    #[test]
    fn empty_findings_list_is_stored_and_distinguishable_from_miss() {
        let cache = FileHashCache::new();
        let key = CacheKey {
            content_hash: "abc".to_string(),
            ruleset_id: "r1".to_string(),
        };
        cache.put(key.clone(), vec![]);
        assert_eq!(cache.get(&key), Some(vec![]));
    }

    #[test]
    fn persist_then_load_round_trips() {
        let cache = FileHashCache::new();
        let key = CacheKey {
            content_hash: "abc".to_string(),
            ruleset_id: "r1".to_string(),
        };
        cache.put(key.clone(), vec![finding("RuleA")]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.bin");
        cache.persist(&path).unwrap();

        let reloaded = FileHashCache::load(&path).unwrap();
        assert_eq!(reloaded.get(&key).unwrap(), vec![finding("RuleA")]);
    }

    #[test]
    fn load_of_corrupt_file_reports_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.bin");
        std::fs::write(&path, b"not a valid bincode snapshot at all, definitely").unwrap();

        let result = FileHashCache::load(&path);
        assert!(matches!(result, Err(CacheError::Corrupt { .. })));
    }
}
