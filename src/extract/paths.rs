//! Repository-relative path handling.
//!
//! Coverage tools and reporters emit absolute paths, `file://` URIs, Windows
//! separators or `./`-prefixed relative paths. Everything stored in the cache is
//! reduced to a forward-slash path relative to the project root.

use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use url::Url;

/// File names that belong to test code rather than to the code under test.
/// Mock modules (`__mocks__/`) are code a test loads, not tests, so they stay.
static TEST_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|/)__tests__/|\.(test|spec)\.[A-Za-z0-9]+$|\.feature$").expect("valid regex")
});

pub fn relative_to(path: &Path, root: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect();
    Some(parts.join("/"))
}

/// Reduces a reported path to repository-relative form, or `None` when it lies
/// outside `root`, tries to escape it, or is a `file:` URL on another host.
pub fn normalize_reported(raw: &str, root: &Path) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let candidate = if raw.starts_with("file:") {
        Url::parse(raw).ok()?.to_file_path().ok()?
    } else {
        PathBuf::from(raw.replace('\\', "/"))
    };

    let relative = if candidate.is_absolute() {
        relative_to(&candidate, root).or_else(|| {
            let canonical = root.canonicalize().ok()?;
            relative_to(&candidate, &canonical)
        })?
    } else {
        candidate.to_string_lossy().into_owned()
    };

    clean_relative(&relative)
}

/// `true` for vendored/build output and for test files themselves, neither of
/// which is recorded as a dependency.
pub fn is_excluded(relative: &str, ignore_dirs: &[String]) -> bool {
    let mut components = relative.split('/');
    let file_name = components.next_back().unwrap_or("");
    if file_name.is_empty() {
        return true;
    }
    if components.any(|dir| ignore_dirs.iter().any(|ignored| ignored == dir)) {
        return true;
    }
    TEST_FILE.is_match(relative)
}

fn clean_relative(path: &str) -> Option<String> {
    let mut parts = Vec::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
