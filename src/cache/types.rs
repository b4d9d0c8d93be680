use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Schema version of the persisted document. Bump on any incompatible change;
/// documents with another version are discarded whole.
pub const CACHE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheDocument {
    pub version: u32,
    #[serde(default)]
    pub last_full_run_revision: String,
    #[serde(default)]
    pub entries: BTreeMap<String, CacheEntry>,
}

impl Default for CacheDocument {
    fn default() -> Self {
        Self {
            version: CACHE_VERSION,
            last_full_run_revision: String::new(),
            entries: BTreeMap::new(),
        }
    }
}

impl CacheDocument {
    pub fn get(&self, artifact: &str) -> Option<&CacheEntry> {
        self.entries.get(artifact)
    }
}

/// Record of the last passing run of one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub last_passed_revision: String,
    pub last_passed_timestamp: DateTime<Utc>,
    pub artifact_content_hash: String,
    pub dependencies: BTreeSet<String>,
    pub dependency_hashes: BTreeMap<String, String>,
}

impl CacheEntry {
    /// Builds an entry whose dependency set is exactly the keys of
    /// `dependency_hashes`.
    pub fn new(
        revision: impl Into<String>,
        timestamp: DateTime<Utc>,
        artifact_content_hash: impl Into<String>,
        dependency_hashes: BTreeMap<String, String>,
    ) -> Self {
        Self {
            last_passed_revision: revision.into(),
            last_passed_timestamp: timestamp,
            artifact_content_hash: artifact_content_hash.into(),
            dependencies: dependency_hashes.keys().cloned().collect(),
            dependency_hashes,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.dependencies.len() == self.dependency_hashes.len()
            && self
                .dependencies
                .iter()
                .all(|dep| self.dependency_hashes.contains_key(dep))
    }
}
