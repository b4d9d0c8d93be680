//! Individual invalidation rules. Each returns the reason an artifact must run,
//! or `None` when the rule does not apply.

use super::Reason;
use crate::cache::CacheEntry;
use crate::git::ChangeSet;
use crate::hash::{HashMemo, MISSING};

/// Without a resolvable base revision the diff cannot bound what changed.
pub fn baseline_unresolvable(changes: &ChangeSet) -> Option<Reason> {
    (!changes.is_resolvable()).then_some(Reason::BaselineUnresolvable)
}

pub fn global_dependency_changed(changes: &ChangeSet, globals: &[String]) -> Option<Reason> {
    globals
        .iter()
        .find(|global| changes.contains(global))
        .map(|global| Reason::GlobalDependencyChanged(global.clone()))
}

/// Catches edits the diff cannot see: uncommitted work, rewritten history.
pub fn artifact_hash_changed(
    artifact: &str,
    entry: &CacheEntry,
    hasher: &HashMemo,
) -> Option<Reason> {
    (hasher.hash(artifact) != entry.artifact_content_hash).then_some(Reason::ArtifactHashChanged)
}

pub fn artifact_in_diff(artifact: &str, changes: &ChangeSet) -> Option<Reason> {
    changes.contains(artifact).then_some(Reason::ArtifactInDiff)
}

/// First dependency, in sorted order, that the diff touched.
pub fn dependency_in_diff(entry: &CacheEntry, changes: &ChangeSet) -> Option<Reason> {
    entry
        .dependencies
        .iter()
        .find(|dep| changes.contains(dep))
        .map(|dep| Reason::DependencyInDiff(dep.clone()))
}

/// First dependency whose current content no longer matches the recorded hash.
/// A dependency that can no longer be read always counts as changed.
pub fn dependency_hash_changed(entry: &CacheEntry, hasher: &HashMemo) -> Option<Reason> {
    entry
        .dependencies
        .iter()
        .find(|dep| {
            let current = hasher.hash(dep);
            current == MISSING || entry.dependency_hashes.get(dep.as_str()) != Some(&current)
        })
        .map(|dep| Reason::DependencyHashChanged(dep.clone()))
}
