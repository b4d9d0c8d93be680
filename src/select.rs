//! Selection engine: which artifacts must run for the current change.
//!
//! Classification is stateless over an immutable snapshot of the cache
//! document. Every uncertainty resolves toward running the artifact.

pub mod rules;

use anyhow::Result;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::cache::{CacheDocument, CacheEntry};
use crate::git::ChangeSet;
use crate::hash::HashMemo;
use crate::suite::Suite;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", content = "path", rename_all = "camelCase")]
pub enum Reason {
    NoCacheEntry,
    BaselineUnresolvable,
    GlobalDependencyChanged(String),
    ArtifactHashChanged,
    StepDefinitionChangedWithoutDependencies(String),
    UnrecordedStepDefinitionChanged(String),
    ArtifactInDiff,
    DependencyInDiff(String),
    DependencyHashChanged(String),
    AllDependenciesUnchanged,
}

impl Reason {
    pub fn needs_run(&self) -> bool {
        !matches!(self, Reason::AllDependenciesUnchanged)
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::NoCacheEntry => write!(f, "no recorded passing run"),
            Reason::BaselineUnresolvable => write!(f, "base revision cannot be resolved"),
            Reason::GlobalDependencyChanged(path) => {
                write!(f, "global dependency changed: {}", path)
            }
            Reason::ArtifactHashChanged => write!(f, "artifact content changed"),
            Reason::StepDefinitionChangedWithoutDependencies(path) => write!(
                f,
                "step definition changed and no dependencies recorded: {}",
                path
            ),
            Reason::UnrecordedStepDefinitionChanged(path) => {
                write!(f, "step definition not among recorded dependencies changed: {}", path)
            }
            Reason::ArtifactInDiff => write!(f, "artifact changed since last full run"),
            Reason::DependencyInDiff(path) => write!(f, "dependency in diff: {}", path),
            Reason::DependencyHashChanged(path) => {
                write!(f, "dependency content changed: {}", path)
            }
            Reason::AllDependenciesUnchanged => write!(f, "all dependencies unchanged"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub artifact: String,
    pub needs_run: bool,
    pub reason: Reason,
}

impl Decision {
    fn new(artifact: impl Into<String>, reason: Reason) -> Self {
        Self {
            artifact: artifact.into(),
            needs_run: reason.needs_run(),
            reason,
        }
    }
}

/// Decides one artifact. Rules are evaluated in order and the first match wins:
///
/// 1. no recorded passing run
/// 2. a global dependency changed (or the base revision is unknown)
/// 3. the artifact's own content hash changed
/// 4. suite-specific rules
/// 5. the artifact is in the diff
/// 6. a dependency is in the diff
/// 7. a dependency's content hash changed
/// 8. otherwise the artifact can be skipped
pub fn decide(
    suite: &dyn Suite,
    artifact: &str,
    entry: Option<&CacheEntry>,
    changes: &ChangeSet,
    hasher: &HashMemo,
) -> Decision {
    let Some(entry) = entry else {
        return Decision::new(artifact, Reason::NoCacheEntry);
    };

    let reason = global_reason(suite, changes)
        .or_else(|| rules::artifact_hash_changed(artifact, entry, hasher))
        .or_else(|| suite.extra_rules(entry, changes))
        .or_else(|| rules::artifact_in_diff(artifact, changes))
        .or_else(|| rules::dependency_in_diff(entry, changes))
        .or_else(|| rules::dependency_hash_changed(entry, hasher))
        .unwrap_or(Reason::AllDependenciesUnchanged);

    Decision::new(artifact, reason)
}

/// Reasons that apply to the whole suite at once.
pub fn global_reason(suite: &dyn Suite, changes: &ChangeSet) -> Option<Reason> {
    rules::baseline_unresolvable(changes)
        .or_else(|| rules::global_dependency_changed(changes, &suite.settings().global_dependencies))
}

/// Outcome of classifying every artifact of a suite.
#[derive(Debug, Clone)]
pub struct Selection {
    /// One decision per discovered artifact, sorted by artifact path.
    pub decisions: Vec<Decision>,
    /// Set when the whole suite was selected without per-artifact evaluation.
    pub global: Option<Reason>,
    pub cached_entries: usize,
}

impl Selection {
    pub fn artifact_count(&self) -> usize {
        self.decisions.len()
    }

    pub fn to_run(&self) -> Vec<&str> {
        self.decisions
            .iter()
            .filter(|d| d.needs_run)
            .map(|d| d.artifact.as_str())
            .collect()
    }

    pub fn run_count(&self) -> usize {
        self.decisions.iter().filter(|d| d.needs_run).count()
    }

    pub fn is_empty(&self) -> bool {
        self.run_count() == 0
    }

    /// Percentage of artifacts skipped thanks to the cache.
    pub fn hit_rate(&self) -> f64 {
        let total = self.artifact_count();
        if total == 0 {
            return 0.0;
        }
        (total - self.run_count()) as f64 * 100.0 / total as f64
    }

    /// Every artifact selected for the same reason.
    pub fn everything(artifacts: Vec<String>, reason: Reason, cached_entries: usize) -> Self {
        let decisions = artifacts
            .into_iter()
            .map(|artifact| Decision::new(artifact, reason.clone()))
            .collect();
        Self {
            decisions,
            global: Some(reason),
            cached_entries,
        }
    }
}

pub async fn discover(suite: Arc<dyn Suite>, root: &Path) -> Result<Vec<String>> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || suite.discover(&root)).await?
}

/// Classifies every artifact of `suite`.
///
/// Without a document every artifact runs. A global reason selects the whole
/// suite without evaluating any artifact. Otherwise artifacts are decided in
/// parallel on the blocking pool, sharing one memoizing hasher.
pub async fn select(
    suite: Arc<dyn Suite>,
    root: &Path,
    doc: Option<Arc<CacheDocument>>,
    changes: Arc<ChangeSet>,
) -> Result<Selection> {
    let artifacts = discover(Arc::clone(&suite), root).await?;

    let Some(doc) = doc else {
        info!(artifacts = artifacts.len(), "no usable cache, selecting everything");
        let decisions = artifacts
            .into_iter()
            .map(|artifact| Decision::new(artifact, Reason::NoCacheEntry))
            .collect();
        return Ok(Selection {
            decisions,
            global: None,
            cached_entries: 0,
        });
    };

    if let Some(reason) = global_reason(suite.as_ref(), &changes) {
        info!(%reason, artifacts = artifacts.len(), "selecting every artifact");
        return Ok(Selection::everything(artifacts, reason, doc.entries.len()));
    }

    let hasher = Arc::new(HashMemo::new(root));
    let chunk_size = artifacts.len().div_ceil(num_cpus::get().max(1)).max(1);
    let mut join_set = JoinSet::new();

    for chunk in artifacts.chunks(chunk_size) {
        let chunk = chunk.to_vec();
        let suite = Arc::clone(&suite);
        let doc = Arc::clone(&doc);
        let changes = Arc::clone(&changes);
        let hasher = Arc::clone(&hasher);

        join_set.spawn_blocking(move || {
            chunk
                .iter()
                .map(|artifact| {
                    decide(
                        suite.as_ref(),
                        artifact,
                        doc.get(artifact),
                        &changes,
                        &hasher,
                    )
                })
                .collect::<Vec<_>>()
        });
    }

    let mut decisions = Vec::with_capacity(artifacts.len());
    while let Some(chunk) = join_set.join_next().await {
        decisions.extend(chunk?);
    }
    decisions.sort_by(|a, b| a.artifact.cmp(&b.artifact));

    for decision in &decisions {
        debug!(
            artifact = %decision.artifact,
            run = decision.needs_run,
            reason = %decision.reason,
            "decision"
        );
    }

    let selection = Selection {
        decisions,
        global: None,
        cached_entries: doc.entries.len(),
    };
    info!(
        artifacts = selection.artifact_count(),
        selected = selection.run_count(),
        "selection complete"
    );
    Ok(selection)
}
