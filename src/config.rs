//! Suite settings: built-in defaults, optionally overridden by a
//! `testgate.toml` at the project root.
//!
//! ```toml
//! [unit]
//! roots = ["src", "tests"]
//! global_dependencies = ["package.json", "vitest.config.ts"]
//!
//! [feature]
//! results = ["ci-output/shard-1/cucumber.json", "ci-output/shard-2/cucumber.json"]
//! step_definitions = ["e2e/steps"]
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const CONFIG_FILE: &str = "testgate.toml";
pub const DEFAULT_CACHE_DIR: &str = ".test-cache";

/// Directories never searched for artifacts nor recorded as dependencies.
pub const DEFAULT_IGNORE_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    "dist",
    "build",
    "coverage",
    "vendor",
    "target",
    ".next",
    ".turbo",
    DEFAULT_CACHE_DIR,
];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub unit: SuiteOverrides,
    #[serde(default)]
    pub feature: SuiteOverrides,
}

/// Per-suite keys accepted in `testgate.toml`. Absent keys keep the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuiteOverrides {
    pub roots: Option<Vec<String>>,
    pub ignore_dirs: Option<Vec<String>>,
    pub global_dependencies: Option<Vec<String>>,
    pub coverage: Option<String>,
    pub results: Option<Vec<String>>,
    pub module_graph: Option<String>,
    pub step_definitions: Option<Vec<String>>,
}

/// Resolved settings for one suite. All paths are repository-relative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteSettings {
    /// Directories searched for artifacts. `"."` searches the whole repository.
    pub roots: Vec<String>,
    pub ignore_dirs: Vec<String>,
    /// Files whose change invalidates every artifact of the suite.
    pub global_dependencies: Vec<String>,
    /// Coverage report written by the last full run.
    pub coverage: String,
    /// Reporter output(s) giving the pass/fail outcome of each artifact.
    pub results: Vec<String>,
    /// Per-artifact import graph; preferred over `coverage` when present.
    pub module_graph: String,
    /// Directories holding step definitions (feature suites only).
    pub step_definitions: Vec<String>,
}

impl SuiteSettings {
    pub fn apply(mut self, overrides: &SuiteOverrides) -> Self {
        if let Some(roots) = &overrides.roots {
            self.roots = roots.clone();
        }
        if let Some(dirs) = &overrides.ignore_dirs {
            self.ignore_dirs = dirs.clone();
        }
        if let Some(globals) = &overrides.global_dependencies {
            self.global_dependencies = globals.clone();
        }
        if let Some(coverage) = &overrides.coverage {
            self.coverage = coverage.clone();
        }
        if let Some(results) = &overrides.results {
            self.results = results.clone();
        }
        if let Some(graph) = &overrides.module_graph {
            self.module_graph = graph.clone();
        }
        if let Some(steps) = &overrides.step_definitions {
            self.step_definitions = steps.clone();
        }
        self
    }
}

pub(crate) fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Reads `path`, falling back to defaults when it is absent or invalid. A bad
/// config file must not stop selection from running.
pub async fn load_file_config(path: &Path) -> FileConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no config file, using defaults");
            return FileConfig::default();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read config, using defaults");
            return FileConfig::default();
        }
    };

    match toml::from_str(&content) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "invalid config, using defaults");
            FileConfig::default()
        }
    }
}

pub fn config_path(root: &Path, explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) => root.join(path),
        None => root.join(CONFIG_FILE),
    }
}

pub fn cache_dir(root: &Path, explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) => root.join(path),
        None => root.join(DEFAULT_CACHE_DIR),
    }
}
