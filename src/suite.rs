//! Suite strategies.
//!
//! The selection walk and the dependency extraction are shared; a [`Suite`]
//! supplies what differs between unit tests and feature files: how artifacts
//! are found, which files are global, how the reporter output looks, and any
//! extra invalidation rule.

pub mod discover;

use anyhow::Result;
use regex::Regex;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use crate::cache::CacheEntry;
use crate::config::{DEFAULT_IGNORE_DIRS, FileConfig, SuiteSettings, strings};
use crate::extract::results::{Outcomes, parse_cucumber, parse_jest};
use crate::git::ChangeSet;
use crate::select::Reason;
use discover::walk_files;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SuiteKind {
    Unit,
    Feature,
}

pub trait Suite: Send + Sync + std::fmt::Debug {
    fn kind(&self) -> SuiteKind;

    fn settings(&self) -> &SuiteSettings;

    /// File name of this suite's cache document inside the cache directory.
    fn cache_file_name(&self) -> &'static str;

    /// Filter arguments that make the runner execute nothing and still succeed.
    fn empty_filter(&self) -> &'static str;

    fn is_artifact(&self, relative: &str) -> bool;

    /// Turns the reporter output(s) of a run into per-artifact outcomes.
    fn parse_results(&self, reports: &[String], root: &Path) -> Result<Outcomes, String>;

    /// All artifacts of the suite, repository-relative and sorted.
    fn discover(&self, root: &Path) -> Result<Vec<String>> {
        let settings = self.settings();
        walk_files(root, &settings.roots, &settings.ignore_dirs, |p| {
            self.is_artifact(p)
        })
    }

    /// Suite-specific invalidation evaluated after the artifact hash check.
    fn extra_rules(&self, _entry: &CacheEntry, _changes: &ChangeSet) -> Option<Reason> {
        None
    }

    /// Files every artifact depends on regardless of what coverage recorded.
    fn implicit_dependencies(&self, _root: &Path) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

pub fn for_kind(kind: SuiteKind, config: &FileConfig) -> Arc<dyn Suite> {
    match kind {
        SuiteKind::Unit => Arc::new(UnitSuite::new(
            UnitSuite::default_settings().apply(&config.unit),
        )),
        SuiteKind::Feature => Arc::new(FeatureSuite::new(
            FeatureSuite::default_settings().apply(&config.feature),
        )),
    }
}

static UNIT_TEST_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\.(test|spec)\.[cm]?[jt]sx?$)|((^|/)__tests__/.+\.[cm]?[jt]sx?$)")
        .expect("valid regex")
});

/// Vitest/Jest test files: `*.test.ts`, `*.spec.jsx`, `__tests__/*.ts`, …
#[derive(Debug, Clone)]
pub struct UnitSuite {
    settings: SuiteSettings,
}

impl UnitSuite {
    pub fn new(settings: SuiteSettings) -> Self {
        Self { settings }
    }

    pub fn default_settings() -> SuiteSettings {
        SuiteSettings {
            roots: strings(&["."]),
            ignore_dirs: strings(DEFAULT_IGNORE_DIRS),
            global_dependencies: strings(&[
                "package.json",
                "package-lock.json",
                "pnpm-lock.yaml",
                "yarn.lock",
                "tsconfig.json",
                "vitest.config.ts",
                "vitest.config.mts",
                "vitest.config.js",
                "vitest.setup.ts",
                "vitest.workspace.ts",
                "jest.config.js",
                "jest.config.ts",
                "jest.setup.ts",
                "jest.setup.js",
            ]),
            coverage: "coverage/coverage-final.json".into(),
            results: strings(&["test-results.json"]),
            module_graph: "test-module-graph.json".into(),
            step_definitions: Vec::new(),
        }
    }
}

impl Default for UnitSuite {
    fn default() -> Self {
        Self::new(Self::default_settings())
    }
}

impl Suite for UnitSuite {
    fn kind(&self) -> SuiteKind {
        SuiteKind::Unit
    }

    fn settings(&self) -> &SuiteSettings {
        &self.settings
    }

    fn cache_file_name(&self) -> &'static str {
        "unit-test-cache.json"
    }

    fn empty_filter(&self) -> &'static str {
        "--passWithNoTests __none__"
    }

    fn is_artifact(&self, relative: &str) -> bool {
        UNIT_TEST_FILE.is_match(relative)
    }

    fn parse_results(&self, reports: &[String], root: &Path) -> Result<Outcomes, String> {
        let mut outcomes = Outcomes::new();
        for report in reports {
            for (artifact, outcome) in parse_jest(report, root)? {
                let merged = outcomes
                    .get(&artifact)
                    .map_or(outcome, |existing| existing.merge(outcome));
                outcomes.insert(artifact, merged);
            }
        }
        Ok(outcomes)
    }
}

/// Cucumber `.feature` files with their step definitions.
#[derive(Debug, Clone)]
pub struct FeatureSuite {
    settings: SuiteSettings,
}

impl FeatureSuite {
    pub fn new(settings: SuiteSettings) -> Self {
        Self { settings }
    }

    pub fn default_settings() -> SuiteSettings {
        SuiteSettings {
            roots: strings(&["e2e", "features"]),
            ignore_dirs: strings(DEFAULT_IGNORE_DIRS),
            global_dependencies: strings(&[
                "package.json",
                "package-lock.json",
                "pnpm-lock.yaml",
                "yarn.lock",
                "tsconfig.json",
                "cucumber.js",
                "cucumber.json",
                "cucumber.mjs",
                "playwright.config.ts",
                "e2e/support/hooks.ts",
                "e2e/support/world.ts",
                "e2e/support/setup.ts",
            ]),
            coverage: "coverage-e2e/coverage-final.json".into(),
            results: strings(&["cucumber-report.json"]),
            module_graph: "feature-module-graph.json".into(),
            step_definitions: strings(&[
                "e2e/steps",
                "e2e/step_definitions",
                "features/step_definitions",
            ]),
        }
    }

    pub fn is_step_definition(&self, relative: &str) -> bool {
        self.settings.step_definitions.iter().any(|dir| {
            let dir = dir.trim_end_matches('/');
            relative
                .strip_prefix(dir)
                .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

impl Default for FeatureSuite {
    fn default() -> Self {
        Self::new(Self::default_settings())
    }
}

impl Suite for FeatureSuite {
    fn kind(&self) -> SuiteKind {
        SuiteKind::Feature
    }

    fn settings(&self) -> &SuiteSettings {
        &self.settings
    }

    fn cache_file_name(&self) -> &'static str {
        "feature-test-cache.json"
    }

    fn empty_filter(&self) -> &'static str {
        "--tags @__none__"
    }

    fn is_artifact(&self, relative: &str) -> bool {
        relative.ends_with(".feature")
    }

    fn parse_results(&self, reports: &[String], root: &Path) -> Result<Outcomes, String> {
        parse_cucumber(reports.iter().map(String::as_str), root)
    }

    /// Step-definition changes the entry cannot account for. With no recorded
    /// edges any step change forces a run; otherwise a changed step file that is
    /// not among the dependencies (added after the entry was written) does, since
    /// Cucumber loads every step file and a new one can change matching.
    fn extra_rules(&self, entry: &CacheEntry, changes: &ChangeSet) -> Option<Reason> {
        let mut steps = changes.paths().filter(|path| self.is_step_definition(path));
        if entry.dependencies.is_empty() {
            return steps
                .next()
                .map(|path| Reason::StepDefinitionChangedWithoutDependencies(path.to_string()));
        }
        steps
            .find(|path| !entry.dependencies.contains(*path))
            .map(|path| Reason::UnrecordedStepDefinitionChanged(path.to_string()))
    }

    /// Step definitions are loaded for every scenario, so each feature depends
    /// on all of them.
    fn implicit_dependencies(&self, root: &Path) -> Result<Vec<String>> {
        walk_files(
            root,
            &self.settings.step_definitions,
            &self.settings.ignore_dirs,
            |_| true,
        )
    }
}
