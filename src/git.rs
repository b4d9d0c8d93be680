use anyhow::{Result, anyhow};
use std::collections::BTreeSet;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, warn};

/// Files changed between a recorded revision and `HEAD`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeSet {
    Known(BTreeSet<String>),
    /// The base revision could not be resolved (history rewritten, shallow
    /// clone, never recorded). Callers treat this as having no baseline.
    Unresolvable,
}

impl ChangeSet {
    pub fn empty() -> Self {
        Self::Known(BTreeSet::new())
    }

    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Known(paths.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, path: &str) -> bool {
        match self {
            Self::Known(paths) => paths.contains(path),
            Self::Unresolvable => false,
        }
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        let paths = match self {
            Self::Known(paths) => Some(paths),
            Self::Unresolvable => None,
        };
        paths.into_iter().flatten().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Known(paths) => paths.len(),
            Self::Unresolvable => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_resolvable(&self) -> bool {
        matches!(self, Self::Known(_))
    }
}

pub async fn current_revision(root: &Path) -> Result<String> {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(root)
        .output()
        .await?;

    if !output.status.success() {
        return Err(anyhow!("git rev-parse HEAD failed"));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

pub async fn revision_exists(root: &Path, revision: &str) -> bool {
    if revision.is_empty() {
        return false;
    }

    let output = Command::new("git")
        .args([
            "rev-parse",
            "--verify",
            "--quiet",
            &format!("{}^{{commit}}", revision),
        ])
        .current_dir(root)
        .output()
        .await;

    matches!(output, Ok(o) if o.status.success())
}

/// Diff between `since` and `HEAD`. Never fails: anything that prevents the
/// diff from being computed yields [`ChangeSet::Unresolvable`].
pub async fn changed_files(root: &Path, since: &str) -> ChangeSet {
    if !revision_exists(root, since).await {
        warn!(revision = since, "base revision cannot be resolved");
        return ChangeSet::Unresolvable;
    }

    let output = Command::new("git")
        .args(["-c", "core.quotepath=false", "diff", "--name-status", since, "HEAD"])
        .current_dir(root)
        .output()
        .await;

    let output = match output {
        Ok(o) if o.status.success() => o,
        Ok(o) => {
            warn!(
                revision = since,
                stderr = %String::from_utf8_lossy(&o.stderr).trim(),
                "git diff failed"
            );
            return ChangeSet::Unresolvable;
        }
        Err(e) => {
            warn!(error = %e, "could not run git diff");
            return ChangeSet::Unresolvable;
        }
    };

    let changed = parse_name_status(&String::from_utf8_lossy(&output.stdout));
    debug!(revision = since, count = changed.len(), "computed diff");
    ChangeSet::Known(changed)
}

/// Parses `git diff --name-status` output. Renames contribute both the old and
/// the new path so that artifacts depending on the old location are caught.
pub fn parse_name_status(stdout: &str) -> BTreeSet<String> {
    let mut changed = BTreeSet::new();

    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split('\t').collect();
        let status = parts[0];

        if status.starts_with('R') {
            changed.extend(parts.iter().skip(1).map(|p| p.to_string()));
        } else if status.starts_with('C') {
            if let Some(to) = parts.get(2) {
                changed.insert(to.to_string());
            }
        } else if let Some(path) = parts.get(1) {
            changed.insert(path.to_string());
        }
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;
    use tempfile::tempdir;

    #[test]
    fn parses_modified_added_deleted() {
        let changed = parse_name_status("M\tsrc/a.ts\nA\tsrc/b.ts\nD\tsrc/c.ts\n");
        let expected: BTreeSet<String> = ["src/a.ts", "src/b.ts", "src/c.ts"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(changed, expected);
    }

    #[test]
    fn renames_include_both_paths() {
        let changed = parse_name_status("R087\tsrc/old.ts\tsrc/new.ts\n");
        assert!(changed.contains("src/old.ts"));
        assert!(changed.contains("src/new.ts"));
    }

    #[test]
    fn copies_include_only_destination() {
        let changed = parse_name_status("C100\tsrc/a.ts\tsrc/a_copy.ts\n");
        assert!(!changed.contains("src/a.ts"));
        assert!(changed.contains("src/a_copy.ts"));
    }

    #[test]
    fn unresolvable_contains_nothing() {
        let changes = ChangeSet::Unresolvable;
        assert!(!changes.contains("src/a.ts"));
        assert!(changes.is_empty());
        assert!(!changes.is_resolvable());
    }

    fn git(dir: &Path, args: &[&str]) -> bool {
        StdCommand::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn diff_against_previous_commit() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        if !git(root, &["init", "-q"]) {
            return;
        }
        git(root, &["config", "user.email", "ci@example.com"]);
        git(root, &["config", "user.name", "ci"]);
        git(root, &["config", "commit.gpgsign", "false"]);
        std::fs::write(root.join("a.ts"), "1").unwrap();
        git(root, &["add", "."]);
        git(root, &["commit", "-qm", "one"]);
        let base = current_revision(root).await.unwrap();

        std::fs::write(root.join("b.ts"), "2").unwrap();
        git(root, &["add", "."]);
        git(root, &["commit", "-qm", "two"]);

        assert!(revision_exists(root, &base).await);
        let changes = changed_files(root, &base).await;
        assert_eq!(changes, ChangeSet::from_paths(["b.ts"]));

        let bogus = changed_files(root, "0123456789abcdef0123456789abcdef01234567").await;
        assert_eq!(bogus, ChangeSet::Unresolvable);
        assert_eq!(changed_files(root, "").await, ChangeSet::Unresolvable);
    }
}
