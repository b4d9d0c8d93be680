use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Resolves the directory every cached path is relative to.
///
/// The enclosing git work tree wins, since diffs are reported against it.
/// Outside git, the nearest directory with a `package.json` is used, and
/// failing that the starting directory itself.
pub async fn find_project_root(path: Option<PathBuf>) -> Result<PathBuf> {
    let start = match path {
        Some(p) => {
            if p.is_absolute() {
                p
            } else {
                std::env::current_dir()?.join(p)
            }
        }
        None => std::env::current_dir()?,
    };

    let start = fs::canonicalize(&start)
        .await
        .with_context(|| format!("Failed to canonicalize path: {}", start.display()))?;

    if let Some(git_root) = find_git_root(&start).await {
        return Ok(git_root);
    }

    if let Some(package_root) = find_package_root(&start).await {
        return Ok(package_root);
    }

    Ok(start)
}

async fn find_git_root(start: &Path) -> Option<PathBuf> {
    find_upwards(start, ".git").await
}

async fn find_package_root(start: &Path) -> Option<PathBuf> {
    find_upwards(start, "package.json").await
}

async fn find_upwards(start: &Path, marker: &str) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        if fs::metadata(current.join(marker)).await.is_ok() {
            return Some(current);
        }
        if !current.pop() {
            return None;
        }
    }
}
