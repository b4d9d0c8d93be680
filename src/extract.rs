//! Dependency extraction: turns a finished run into cache entries.
//!
//! Coverage reports are usually aggregate over the whole run and cannot tell
//! which artifact executed which file. In that case every executed artifact is
//! recorded as depending on the full covered set. This over-invalidates (an
//! edit to any covered file reruns every artifact of the run) but can never
//! miss an artifact that really depends on the edited file. A per-artifact
//! module graph, when the runner provides one, gives exact edges instead.

pub mod coverage;
pub mod paths;
pub mod results;

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{CACHE_VERSION, CacheDocument, CacheEntry, CacheStore};
use crate::config::SuiteSettings;
use crate::error::ExtractError;
use crate::hash::{HashMemo, MISSING};
use crate::suite::Suite;
use paths::{is_excluded, normalize_reported};
use results::{Outcome, Outcomes};

/// Files read by an update, resolved against the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateInputs {
    pub coverage: PathBuf,
    pub results: Vec<PathBuf>,
    pub module_graph: PathBuf,
}

impl UpdateInputs {
    pub fn from_settings(root: &Path, settings: &SuiteSettings) -> Self {
        Self {
            coverage: root.join(&settings.coverage),
            results: settings.results.iter().map(|r| root.join(r)).collect(),
            module_graph: root.join(&settings.module_graph),
        }
    }
}

/// Which files each executed artifact is recorded as depending on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribution {
    /// One covered set shared by every artifact of the run.
    Aggregate(BTreeSet<String>),
    PerArtifact(BTreeMap<String, BTreeSet<String>>),
}

impl Attribution {
    fn dependencies_of(&self, artifact: &str) -> Option<&BTreeSet<String>> {
        match self {
            Attribution::Aggregate(covered) => Some(covered),
            Attribution::PerArtifact(graph) => graph.get(artifact),
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, Attribution::Aggregate(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    /// Entries written for artifacts that passed.
    pub recorded: usize,
    /// Previous entries dropped because their artifact failed, was skipped, or
    /// has no recorded edges.
    pub removed: usize,
    /// Entries carried over for artifacts that did not run.
    pub kept: usize,
    pub aggregate: bool,
    pub revision: String,
}

/// Reads every results file that exists. At least one must.
pub async fn load_outcomes(
    suite: &dyn Suite,
    root: &Path,
    inputs: &UpdateInputs,
) -> Result<Outcomes, ExtractError> {
    let mut reports = Vec::new();
    for path in &inputs.results {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => reports.push(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "results file not found");
            }
            Err(e) => return Err(ExtractError::io(path, e)),
        }
    }

    if reports.is_empty() {
        let looked_for = inputs.results.first().cloned().unwrap_or_default();
        return Err(ExtractError::ResultsMissing(looked_for));
    }

    suite
        .parse_results(&reports, root)
        .map_err(|reason| ExtractError::MalformedResults {
            path: inputs.results.first().cloned().unwrap_or_default(),
            reason,
        })
}

/// Prefers the per-artifact module graph; falls back to aggregate coverage.
pub async fn load_attribution(
    settings: &SuiteSettings,
    root: &Path,
    inputs: &UpdateInputs,
) -> Result<Attribution, ExtractError> {
    if let Some(content) = read_optional(&inputs.module_graph).await? {
        let graph = coverage::parse_module_graph(&content).map_err(|reason| {
            ExtractError::MalformedCoverage {
                path: inputs.module_graph.clone(),
                reason,
            }
        })?;

        let graph = graph
            .into_iter()
            .filter_map(|(artifact, deps)| {
                let artifact = normalize_reported(&artifact, root)?;
                Some((artifact, filter_dependencies(deps, root, settings)))
            })
            .collect();
        return Ok(Attribution::PerArtifact(graph));
    }

    if let Some(content) = read_optional(&inputs.coverage).await? {
        let covered = coverage::parse_coverage(&content).map_err(|reason| {
            ExtractError::MalformedCoverage {
                path: inputs.coverage.clone(),
                reason,
            }
        })?;
        return Ok(Attribution::Aggregate(filter_dependencies(
            covered, root, settings,
        )));
    }

    Err(ExtractError::CoverageMissing(inputs.coverage.clone()))
}

async fn read_optional(path: &Path) -> Result<Option<String>, ExtractError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ExtractError::io(path, e)),
    }
}

fn filter_dependencies(
    reported: BTreeSet<String>,
    root: &Path,
    settings: &SuiteSettings,
) -> BTreeSet<String> {
    reported
        .iter()
        .filter_map(|raw| normalize_reported(raw, root))
        .filter(|path| !is_excluded(path, &settings.ignore_dirs))
        .collect()
}

/// Applies one run to the previous document.
///
/// Passing artifacts get a fresh entry built wholesale; failing or skipped ones
/// lose theirs; artifacts that did not run keep what they had.
pub fn build_document(
    previous: CacheDocument,
    outcomes: &Outcomes,
    attribution: &Attribution,
    implicit: &[String],
    revision: &str,
    timestamp: DateTime<Utc>,
    hasher: &HashMemo,
) -> (CacheDocument, UpdateSummary) {
    let mut doc = previous;
    let mut summary = UpdateSummary {
        aggregate: attribution.is_aggregate(),
        revision: revision.to_string(),
        ..Default::default()
    };

    for (artifact, outcome) in outcomes {
        let entry = match outcome {
            Outcome::Passed => {
                record_entry(artifact, attribution, implicit, revision, timestamp, hasher)
            }
            Outcome::Failed | Outcome::Skipped => None,
        };

        match entry {
            Some(entry) => {
                doc.entries.insert(artifact.clone(), entry);
                summary.recorded += 1;
            }
            None => {
                if doc.entries.remove(artifact).is_some() {
                    summary.removed += 1;
                }
            }
        }
    }

    summary.kept = doc.entries.len() - summary.recorded;
    doc.version = CACHE_VERSION;
    doc.last_full_run_revision = revision.to_string();
    (doc, summary)
}

fn record_entry(
    artifact: &str,
    attribution: &Attribution,
    implicit: &[String],
    revision: &str,
    timestamp: DateTime<Utc>,
    hasher: &HashMemo,
) -> Option<CacheEntry> {
    let Some(recorded) = attribution.dependencies_of(artifact) else {
        warn!(artifact, "passed but has no module graph entry, not caching");
        return None;
    };

    let artifact_hash = hasher.hash(artifact);
    if artifact_hash == MISSING {
        warn!(artifact, "passed but can no longer be read, not caching");
        return None;
    }

    let mut dependency_hashes = BTreeMap::new();
    for dep in recorded.iter().chain(implicit) {
        if dep == artifact {
            continue;
        }
        let hash = hasher.hash(dep);
        if hash == MISSING {
            debug!(artifact, dependency = %dep, "dependency no longer exists, not recorded");
            continue;
        }
        dependency_hashes.insert(dep.clone(), hash);
    }

    Some(CacheEntry::new(revision, timestamp, artifact_hash, dependency_hashes))
}

/// Runs the whole extraction and persists the result.
///
/// Nothing is written unless every input was read and parsed; the previous
/// document stays in place on any error.
pub async fn update_cache(
    suite: Arc<dyn Suite>,
    root: &Path,
    store: &CacheStore,
    inputs: &UpdateInputs,
    revision: &str,
) -> Result<UpdateSummary, ExtractError> {
    let outcomes = load_outcomes(suite.as_ref(), root, inputs).await?;
    let attribution = load_attribution(suite.settings(), root, inputs).await?;
    let previous = store.load().await.unwrap_or_default();

    let root_buf = root.to_path_buf();
    let revision_owned = revision.to_string();
    let (doc, summary) = tokio::task::spawn_blocking(move || {
        let implicit = suite
            .implicit_dependencies(&root_buf)
            .map_err(|e| ExtractError::Discovery(e.to_string()))?;
        let hasher = HashMemo::new(&root_buf);
        Ok::<_, ExtractError>(build_document(
            previous,
            &outcomes,
            &attribution,
            &implicit,
            &revision_owned,
            Utc::now(),
            &hasher,
        ))
    })
    .await??;

    store.save(&doc).await?;

    info!(
        recorded = summary.recorded,
        removed = summary.removed,
        kept = summary.kept,
        aggregate = summary.aggregate,
        revision = %summary.revision,
        "cache updated"
    );
    Ok(summary)
}
