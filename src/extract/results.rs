//! Reporter output readers: which artifacts passed in the last run.

use super::paths::normalize_reported;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Outcome of one artifact across the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Outcome {
    Skipped,
    Passed,
    Failed,
}

impl Outcome {
    /// Combines the outcomes of two shards that both ran the artifact. Any
    /// failure wins, then any pass.
    pub fn merge(self, other: Outcome) -> Outcome {
        self.max(other)
    }
}

pub type Outcomes = BTreeMap<String, Outcome>;

fn record(outcomes: &mut Outcomes, artifact: String, outcome: Outcome) {
    outcomes
        .entry(artifact)
        .and_modify(|existing| *existing = existing.merge(outcome))
        .or_insert(outcome);
}

/// Vitest/Jest JSON reporter root.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JestReport {
    test_results: Vec<JestFileResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JestFileResult {
    /// Absolute path to the test file.
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    assertion_results: Vec<JestAssertion>,
}

#[derive(Debug, Deserialize)]
struct JestAssertion {
    #[serde(default)]
    status: String,
}

/// Parses a Vitest or Jest `--reporter=json` file.
///
/// A file passes when its status is `passed` and at least one assertion
/// passed; a file whose assertions were all skipped or todo counts as skipped.
pub fn parse_jest(content: &str, root: &Path) -> Result<Outcomes, String> {
    let report: JestReport = serde_json::from_str(content).map_err(|e| e.to_string())?;
    let mut outcomes = Outcomes::new();

    for file in report.test_results {
        let Some(artifact) = normalize_reported(&file.name, root) else {
            continue;
        };
        record(&mut outcomes, artifact, jest_outcome(&file));
    }

    Ok(outcomes)
}

fn jest_outcome(file: &JestFileResult) -> Outcome {
    if file.status != "passed" {
        return if file.status == "skipped" || file.status == "pending" {
            Outcome::Skipped
        } else {
            Outcome::Failed
        };
    }

    if file.assertion_results.iter().any(|a| a.status == "failed") {
        return Outcome::Failed;
    }

    if file.assertion_results.iter().any(|a| a.status == "passed") {
        Outcome::Passed
    } else {
        Outcome::Skipped
    }
}

/// Cucumber JSON formatter output: an array of features.
#[derive(Debug, Deserialize)]
struct CucumberFeature {
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    elements: Vec<CucumberElement>,
}

#[derive(Debug, Deserialize)]
struct CucumberElement {
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    steps: Vec<CucumberStep>,
}

#[derive(Debug, Deserialize)]
struct CucumberStep {
    #[serde(default)]
    result: CucumberResult,
}

#[derive(Debug, Default, Deserialize)]
struct CucumberResult {
    #[serde(default)]
    status: String,
}

const FAILING_STEP_STATUSES: &[&str] = &["failed", "undefined", "pending", "ambiguous"];

/// Parses one or more Cucumber JSON reports, typically one per CI shard.
///
/// A feature fails if any scenario step in any shard failed, was undefined,
/// pending or ambiguous. It passes if some scenario ran every step to a pass
/// and no scenario stopped partway (passed steps followed by skipped ones).
/// Otherwise it is skipped.
pub fn parse_cucumber<'a, I>(reports: I, root: &Path) -> Result<Outcomes, String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut outcomes = Outcomes::new();

    for content in reports {
        let features: Vec<CucumberFeature> =
            serde_json::from_str(content).map_err(|e| e.to_string())?;

        for feature in features {
            let Some(artifact) = feature
                .uri
                .as_deref()
                .and_then(|uri| normalize_reported(uri, root))
            else {
                continue;
            };
            record(&mut outcomes, artifact, cucumber_outcome(&feature));
        }
    }

    Ok(outcomes)
}

fn cucumber_outcome(feature: &CucumberFeature) -> Outcome {
    let mut outcome = Outcome::Skipped;
    for element in &feature.elements {
        if element.kind != "scenario" && element.kind != "background" {
            continue;
        }
        match scenario_run(element) {
            ScenarioRun::Failed => return Outcome::Failed,
            ScenarioRun::Partial => return Outcome::Skipped,
            ScenarioRun::Passed => outcome = Outcome::Passed,
            ScenarioRun::NotRun => {}
        }
    }
    outcome
}

enum ScenarioRun {
    Failed,
    Passed,
    /// Some steps passed, the rest never ran.
    Partial,
    NotRun,
}

fn scenario_run(element: &CucumberElement) -> ScenarioRun {
    let mut passed = false;
    let mut not_run = false;
    for status in element.steps.iter().map(|step| step.result.status.as_str()) {
        if FAILING_STEP_STATUSES.contains(&status) {
            return ScenarioRun::Failed;
        }
        if status == "passed" {
            passed = true;
        } else {
            not_run = true;
        }
    }
    match (passed, not_run) {
        (true, false) => ScenarioRun::Passed,
        (true, true) => ScenarioRun::Partial,
        (false, _) => ScenarioRun::NotRun,
    }
}
