//! Command handlers shared by both binaries.
//!
//! Selection commands fail open: whatever goes wrong, they print the answer
//! that runs everything. `update-cache` never fails the job; it leaves the
//! previous cache in place and says why on stderr.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::{CacheDocument, CacheStore};
use crate::cli::{Action, GlobalArgs, UpdateArgs};
use crate::config::{self, load_file_config};
use crate::detect::find_project_root;
use crate::extract::{self, UpdateInputs};
use crate::git::{self, ChangeSet};
use crate::select::{self, Reason, Selection};
use crate::suite::{self, Suite, SuiteKind};

struct Workspace {
    root: PathBuf,
    suite: Arc<dyn Suite>,
    store: CacheStore,
}

impl Workspace {
    async fn open(kind: SuiteKind, global: &GlobalArgs) -> Result<Self> {
        let root = find_project_root(global.root.clone()).await?;
        let config_file = config::config_path(&root, global.config.as_deref());
        let file_config = load_file_config(&config_file).await;
        let suite = suite::for_kind(kind, &file_config);
        let cache_dir = config::cache_dir(&root, global.cache_dir.as_deref());
        let store = CacheStore::new(cache_dir.join(suite.cache_file_name()));

        Ok(Self { root, suite, store })
    }

    async fn select(&self) -> Result<(Option<Arc<CacheDocument>>, Selection)> {
        let doc = self.store.load().await.map(Arc::new);
        let changes = match &doc {
            Some(doc) => git::changed_files(&self.root, &doc.last_full_run_revision).await,
            None => ChangeSet::empty(),
        };

        let selection = select::select(
            Arc::clone(&self.suite),
            &self.root,
            doc.clone(),
            Arc::new(changes),
        )
        .await
        .context("Failed to select artifacts")?;

        Ok((doc, selection))
    }
}

pub async fn run(kind: SuiteKind, global: GlobalArgs, action: Action) -> ExitCode {
    let workspace = match Workspace::open(kind, &global).await {
        Ok(workspace) => workspace,
        Err(e) => return unavailable(&action, &e),
    };

    match action {
        Action::List => list(&workspace).await,
        Action::ShouldSkipAll => should_skip_all(&workspace).await,
        Action::Filter => filter(&workspace).await,
        Action::UpdateCache(args) => update_cache(&workspace, &args).await,
        Action::Stats { json } => report(stats(&workspace, json).await),
        Action::Explain { all } => report(explain(&workspace, all).await),
    }
}

/// Safe answer when the project itself cannot be resolved.
fn unavailable(action: &Action, error: &anyhow::Error) -> ExitCode {
    warn!(error = %format!("{error:#}"), "cannot open project");
    match action {
        Action::ShouldSkipAll => {
            println!("false");
            ExitCode::FAILURE
        }
        Action::Filter => {
            println!();
            ExitCode::SUCCESS
        }
        Action::UpdateCache(_) => ExitCode::SUCCESS,
        Action::List | Action::Stats { .. } | Action::Explain { .. } => {
            eprintln!("Error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn report(result: Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn list(workspace: &Workspace) -> ExitCode {
    let to_run = match workspace.select().await {
        Ok((_, selection)) => selection.to_run().into_iter().map(String::from).collect(),
        Err(e) => {
            warn!(error = %format!("{e:#}"), "selection failed, listing every artifact");
            match select::discover(Arc::clone(&workspace.suite), &workspace.root).await {
                Ok(all) => all,
                Err(e) => {
                    eprintln!("Error: {e:#}");
                    return ExitCode::FAILURE;
                }
            }
        }
    };

    match serde_json::to_string(&to_run) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn should_skip_all(workspace: &Workspace) -> ExitCode {
    let skip = match workspace.select().await {
        Ok((_, selection)) => selection.is_empty(),
        Err(e) => {
            warn!(error = %format!("{e:#}"), "selection failed, not skipping");
            false
        }
    };

    println!("{skip}");
    if skip {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// An empty line means "no filter": the runner executes everything.
async fn filter(workspace: &Workspace) -> ExitCode {
    match workspace.select().await {
        Ok((_, selection)) if selection.is_empty() => {
            println!("{}", workspace.suite.empty_filter());
        }
        Ok((_, selection)) => println!("{}", selection.to_run().join(" ")),
        Err(e) => {
            warn!(error = %format!("{e:#}"), "selection failed, running everything");
            println!();
        }
    }
    ExitCode::SUCCESS
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn update_inputs(workspace: &Workspace, args: &UpdateArgs) -> UpdateInputs {
    let root = &workspace.root;
    let mut inputs = UpdateInputs::from_settings(root, workspace.suite.settings());
    if let Some(coverage) = &args.coverage {
        inputs.coverage = resolve(root, coverage);
    }
    if !args.results.is_empty() {
        inputs.results = args.results.iter().map(|r| resolve(root, r)).collect();
    }
    if let Some(graph) = &args.module_graph {
        inputs.module_graph = resolve(root, graph);
    }
    inputs
}

async fn update_cache(workspace: &Workspace, args: &UpdateArgs) -> ExitCode {
    let inputs = update_inputs(workspace, args);

    let revision = match git::current_revision(&workspace.root).await {
        Ok(revision) => revision,
        Err(e) => {
            warn!(
                error = %format!("{e:#}"),
                "cannot read current revision, next selection will run everything"
            );
            String::new()
        }
    };

    match extract::update_cache(
        Arc::clone(&workspace.suite),
        &workspace.root,
        &workspace.store,
        &inputs,
        &revision,
    )
    .await
    {
        Ok(summary) => {
            eprintln!(
                "Cache updated: {} recorded, {} removed, {} kept",
                summary.recorded, summary.removed, summary.kept
            );
        }
        Err(e) if e.is_missing_input() => {
            info!(reason = %e, "nothing to record, cache left untouched");
        }
        Err(e) => {
            warn!(error = %e, "cache update failed, previous cache left in place");
        }
    }
    ExitCode::SUCCESS
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Stats {
    suite: &'static str,
    artifacts: usize,
    cached_entries: usize,
    selected: usize,
    hit_rate: f64,
    last_full_run_revision: Option<String>,
    global_reason: Option<Reason>,
}

async fn stats(workspace: &Workspace, json: bool) -> Result<()> {
    let (doc, selection) = workspace.select().await?;
    let stats = Stats {
        suite: match workspace.suite.kind() {
            SuiteKind::Unit => "unit",
            SuiteKind::Feature => "feature",
        },
        artifacts: selection.artifact_count(),
        cached_entries: selection.cached_entries,
        selected: selection.run_count(),
        hit_rate: selection.hit_rate(),
        last_full_run_revision: doc
            .map(|d| d.last_full_run_revision.clone())
            .filter(|r| !r.is_empty()),
        global_reason: selection.global.clone(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Suite:          {}", stats.suite);
    println!("Artifacts:      {}", stats.artifacts);
    println!("Cached entries: {}", stats.cached_entries);
    println!("Selected:       {}", stats.selected);
    println!("Hit rate:       {:.1}%", stats.hit_rate);
    println!(
        "Last full run:  {}",
        stats.last_full_run_revision.as_deref().unwrap_or("never")
    );
    if let Some(reason) = &stats.global_reason {
        println!("Running all:    {}", reason);
    }
    Ok(())
}

async fn explain(workspace: &Workspace, all: bool) -> Result<()> {
    let (_, selection) = workspace.select().await?;

    if let Some(reason) = &selection.global {
        println!("# every artifact runs: {}", reason);
    }
    for decision in &selection.decisions {
        if !decision.needs_run && !all {
            continue;
        }
        let verdict = if decision.needs_run { "RUN " } else { "SKIP" };
        println!("{} {}  ({})", verdict, decision.artifact, decision.reason);
    }
    Ok(())
}
