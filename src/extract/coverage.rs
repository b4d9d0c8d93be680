//! Coverage and module-graph readers.
//!
//! Two coverage shapes are understood, detected from the document itself:
//!
//! * Istanbul `coverage-final.json`: an object keyed by file path.
//! * V8 coverage (`NODE_V8_COVERAGE`): `{ "result": [ { "url": "file:///…" } ] }`.
//!
//! Both are aggregate over the whole run. A module graph
//! (`{ "<artifact>": ["<dependency>", …] }`) gives per-artifact edges instead.

use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Deserialize)]
struct V8Coverage {
    result: Vec<V8Script>,
}

#[derive(Debug, Deserialize)]
struct V8Script {
    #[serde(default)]
    url: String,
}

/// Every source path the report says was loaded during the run, as written in
/// the report (not yet normalized).
///
/// Files that were loaded but whose counters are all zero are still returned:
/// a module can be imported without any of its counted statements running, and
/// an edit to it can still change behavior.
pub fn parse_coverage(content: &str) -> Result<BTreeSet<String>, String> {
    let value: Value = serde_json::from_str(content).map_err(|e| e.to_string())?;

    if value.get("result").is_some_and(Value::is_array) {
        return parse_v8(value);
    }

    match value {
        Value::Object(map) => Ok(parse_istanbul(&map)),
        _ => Err("expected a JSON object".to_string()),
    }
}

fn parse_istanbul(map: &serde_json::Map<String, Value>) -> BTreeSet<String> {
    map.iter()
        .map(|(key, file)| {
            file.get("path")
                .and_then(Value::as_str)
                .unwrap_or(key)
                .to_string()
        })
        .collect()
}

fn parse_v8(value: Value) -> Result<BTreeSet<String>, String> {
    let coverage: V8Coverage = serde_json::from_value(value).map_err(|e| e.to_string())?;
    Ok(coverage
        .result
        .into_iter()
        .filter(|script| script.url.starts_with("file://"))
        .map(|script| script.url)
        .collect())
}

/// Per-artifact dependency lists, keyed and valued as written in the report.
pub fn parse_module_graph(content: &str) -> Result<BTreeMap<String, BTreeSet<String>>, String> {
    serde_json::from_str(content).map_err(|e| e.to_string())
}
