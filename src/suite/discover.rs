use anyhow::Result;
use ignore::WalkBuilder;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;

use crate::extract::paths::relative_to;

/// Recursively lists files under `search_roots` (relative to `root`) for which
/// `accept` returns true, skipping any directory named in `ignore_dirs`.
///
/// Results are repository-relative and sorted.
pub fn walk_files<F>(
    root: &Path,
    search_roots: &[String],
    ignore_dirs: &[String],
    accept: F,
) -> Result<Vec<String>>
where
    F: Fn(&str) -> bool + Sync,
{
    let files = Mutex::new(BTreeSet::new());

    for search_root in search_roots {
        let start = root.join(search_root);
        if !start.exists() {
            continue;
        }

        let walker = WalkBuilder::new(&start)
            .hidden(false)
            .ignore(true)
            .git_ignore(true)
            .git_exclude(true)
            .parents(true)
            .threads(num_cpus::get())
            .build_parallel();

        walker.run(|| {
            let files = &files;
            let accept = &accept;

            Box::new(move |entry| {
                let entry = match entry {
                    Ok(e) => e,
                    Err(_) => return ignore::WalkState::Continue,
                };

                let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
                if is_dir {
                    let name = entry.file_name().to_string_lossy();
                    if entry.depth() > 0 && ignore_dirs.iter().any(|d| *d == name) {
                        return ignore::WalkState::Skip;
                    }
                    return ignore::WalkState::Continue;
                }

                let Some(relative) = relative_to(entry.path(), root) else {
                    return ignore::WalkState::Continue;
                };

                if accept(&relative) {
                    if let Ok(mut files) = files.lock() {
                        files.insert(relative);
                    }
                }

                ignore::WalkState::Continue
            })
        });
    }

    let files = files
        .into_inner()
        .map_err(|_| anyhow::anyhow!("artifact walk panicked"))?;
    Ok(files.into_iter().collect())
}
