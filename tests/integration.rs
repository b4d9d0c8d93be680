use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

struct Repo {
    _dir: TempDir,
    root: PathBuf,
}

impl Repo {
    /// `None` when git is not installed; callers skip the test.
    fn new() -> Option<Self> {
        if !git_available() {
            eprintln!("git not available, skipping");
            return None;
        }
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = dir.path().canonicalize().expect("Failed to canonicalize");
        let repo = Self { _dir: dir, root };
        repo.git(&["init", "-q"]);
        Some(repo)
    }

    fn path(&self, relative: &str) -> String {
        self.root.join(relative).to_string_lossy().into_owned()
    }

    fn write(&self, relative: &str, content: &str) {
        let path = self.root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn git(&self, args: &[&str]) {
        let output = Command::new("git")
            .args([
                "-c",
                "user.name=testgate",
                "-c",
                "user.email=testgate@example.com",
                "-c",
                "commit.gpgsign=false",
            ])
            .args(args)
            .current_dir(&self.root)
            .output()
            .expect("Failed to run git");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    fn commit(&self, message: &str) {
        self.git(&["add", "-A"]);
        self.git(&["commit", "-q", "--allow-empty", "-m", message]);
    }

    fn run(&self, bin: &str, args: &[&str]) -> (bool, String, String) {
        let output = Command::new(bin)
            .args(args)
            .current_dir(&self.root)
            .env_remove("TEST_CACHE_DIR")
            .env_remove("TEST_CACHE_VERBOSE")
            .env_remove("RUST_LOG")
            .output()
            .expect("Failed to run binary");

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        (output.status.success(), stdout, stderr)
    }

    fn unit(&self, args: &[&str]) -> (bool, String, String) {
        self.run(env!("CARGO_BIN_EXE_test-cache"), args)
    }

    fn feature(&self, args: &[&str]) -> (bool, String, String) {
        self.run(env!("CARGO_BIN_EXE_feature-cache"), args)
    }

    fn cache_file(&self, name: &str) -> PathBuf {
        self.root.join(".test-cache").join(name)
    }
}

fn list(stdout: &str) -> Vec<String> {
    serde_json::from_str(stdout.trim())
        .unwrap_or_else(|e| panic!("not a JSON array ({}): {}", e, stdout))
}

fn stats(stdout: &str) -> serde_json::Value {
    serde_json::from_str(stdout).unwrap_or_else(|e| panic!("bad stats JSON ({}): {}", e, stdout))
}

mod unit_suite {
    use super::*;

    const TESTS: [&str; 3] = ["src/a.test.ts", "src/b.test.ts", "src/c.test.ts"];

    fn project() -> Option<Repo> {
        let repo = Repo::new()?;
        repo.write("package.json", r#"{ "name": "app" }"#);
        repo.write("src/x.ts", "export const x = 1;\n");
        repo.write("src/y.ts", "export const y = 2;\n");
        for test in TESTS {
            repo.write(test, "import { x } from './x';\n");
        }
        repo.write(".gitignore", "coverage/\n.test-cache/\ntest-results.json\ntest-module-graph.json\n");
        repo.commit("init");
        Some(repo)
    }

    fn write_passing_results(repo: &Repo) {
        let results: Vec<_> = TESTS
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": repo.path(t),
                    "status": "passed",
                    "assertionResults": [{ "status": "passed" }]
                })
            })
            .collect();
        repo.write(
            "test-results.json",
            &serde_json::json!({ "testResults": results }).to_string(),
        );
    }

    fn write_aggregate_coverage(repo: &Repo) {
        let coverage = serde_json::json!({
            repo.path("src/x.ts"): { "path": repo.path("src/x.ts"), "s": { "0": 1 } },
            repo.path("src/y.ts"): { "path": repo.path("src/y.ts"), "s": { "0": 0 } },
        });
        repo.write("coverage/coverage-final.json", &coverage.to_string());
    }

    fn write_module_graph(repo: &Repo) {
        let graph = serde_json::json!({
            "src/a.test.ts": ["src/x.ts"],
            "src/b.test.ts": ["src/y.ts"],
            "src/c.test.ts": [],
        });
        repo.write("test-module-graph.json", &graph.to_string());
    }

    fn recorded_project() -> Option<Repo> {
        let repo = project()?;
        write_passing_results(&repo);
        write_aggregate_coverage(&repo);
        let (ok, _, stderr) = repo.unit(&["update-cache"]);
        assert!(ok, "update-cache failed: {}", stderr);
        Some(repo)
    }

    #[test]
    fn no_cache_runs_everything() {
        let Some(repo) = project() else { return };

        let (ok, stdout, _) = repo.unit(&["list-tests-to-run"]);
        assert!(ok);
        assert_eq!(list(&stdout), TESTS);

        let (ok, stdout, _) = repo.unit(&["should-skip-all"]);
        assert!(!ok);
        assert_eq!(stdout.trim(), "false");
    }

    #[test]
    fn fresh_cache_skips_everything() {
        let Some(repo) = recorded_project() else { return };

        let (ok, stdout, _) = repo.unit(&["should-skip-all"]);
        assert!(ok);
        assert_eq!(stdout.trim(), "true");

        let (ok, stdout, _) = repo.unit(&["get-test-filter"]);
        assert!(ok);
        assert_eq!(stdout.trim(), "--passWithNoTests __none__");

        let (_, stdout, _) = repo.unit(&["stats", "--json"]);
        let stats = stats(&stdout);
        assert_eq!(stats["artifacts"], 3);
        assert_eq!(stats["cachedEntries"], 3);
        assert_eq!(stats["selected"], 0);
        assert_eq!(stats["hitRate"], 100.0);
    }

    #[test]
    fn global_dependency_change_runs_everything() {
        let Some(repo) = recorded_project() else { return };

        repo.write("package.json", r#"{ "name": "app", "version": "2.0.0" }"#);
        repo.commit("bump");

        let (ok, stdout, _) = repo.unit(&["list-tests-to-run"]);
        assert!(ok);
        assert_eq!(list(&stdout), TESTS);

        let (_, stdout, _) = repo.unit(&["stats", "--json"]);
        let stats = stats(&stdout);
        assert_eq!(stats["selected"], 3);
        assert_eq!(stats["hitRate"], 0.0);
        assert_eq!(stats["globalReason"]["rule"], "globalDependencyChanged");
        assert_eq!(stats["globalReason"]["path"], "package.json");
    }

    #[test]
    fn aggregate_coverage_reruns_every_test_on_covered_change() {
        let Some(repo) = recorded_project() else { return };

        repo.write("src/y.ts", "export const y = 3;\n");
        repo.commit("touch y");

        let (_, stdout, _) = repo.unit(&["list-tests-to-run"]);
        assert_eq!(list(&stdout), TESTS);
    }

    #[test]
    fn module_graph_narrows_selection() {
        let Some(repo) = project() else { return };
        write_passing_results(&repo);
        write_module_graph(&repo);
        let (ok, _, stderr) = repo.unit(&["update-cache"]);
        assert!(ok, "{}", stderr);

        repo.write("src/x.ts", "export const x = 10;\n");
        repo.commit("touch x");

        let (_, stdout, _) = repo.unit(&["list-tests-to-run"]);
        assert_eq!(list(&stdout), ["src/a.test.ts"]);

        // Uncommitted edits are caught by content hash.
        repo.write("src/y.ts", "export const y = 20;\n");
        let (_, stdout, _) = repo.unit(&["get-test-filter"]);
        assert_eq!(stdout.trim(), "src/a.test.ts src/b.test.ts");

        let (_, stdout, _) = repo.unit(&["explain"]);
        assert!(stdout.contains("src/a.test.ts  (dependency in diff: src/x.ts)"), "{}", stdout);
        assert!(stdout.contains("src/b.test.ts  (dependency content changed: src/y.ts)"), "{}", stdout);
        assert!(!stdout.contains("src/c.test.ts"), "{}", stdout);

        let (_, stdout, _) = repo.unit(&["explain", "--all"]);
        assert!(stdout.contains("SKIP src/c.test.ts"), "{}", stdout);
    }

    #[test]
    fn rewritten_history_runs_everything() {
        let Some(repo) = recorded_project() else { return };

        repo.write("src/x.ts", "export const x = 5;\n");
        repo.git(&["add", "-A"]);
        repo.git(&["commit", "-q", "--amend", "-m", "init (amended)"]);
        repo.git(&["reflog", "expire", "--expire=now", "--all"]);
        repo.git(&["gc", "-q", "--prune=now"]);

        let (ok, stdout, _) = repo.unit(&["list-tests-to-run"]);
        assert!(ok);
        assert_eq!(list(&stdout), TESTS);

        let (_, stdout, _) = repo.unit(&["stats", "--json"]);
        let stats = stats(&stdout);
        assert_eq!(stats["selected"], 3);
        assert_eq!(stats["hitRate"], 0.0);
        assert_eq!(stats["globalReason"]["rule"], "baselineUnresolvable");

        let (ok, stdout, _) = repo.unit(&["should-skip-all"]);
        assert!(!ok);
        assert_eq!(stdout.trim(), "false");
    }

    #[test]
    fn new_test_file_is_selected() {
        let Some(repo) = recorded_project() else { return };

        repo.write("src/d.test.ts", "import { x } from './x';\n");
        repo.commit("add d");

        let (_, stdout, _) = repo.unit(&["list-tests-to-run"]);
        assert_eq!(list(&stdout), ["src/d.test.ts"]);
    }

    #[test]
    fn corrupt_cache_fails_open() {
        let Some(repo) = recorded_project() else { return };
        std::fs::write(repo.cache_file("unit-test-cache.json"), "{ \"version\": 1, \"entr").unwrap();

        let (ok, stdout, _) = repo.unit(&["list-tests-to-run"]);
        assert!(ok);
        assert_eq!(list(&stdout), TESTS);

        let (ok, stdout, _) = repo.unit(&["should-skip-all"]);
        assert!(!ok);
        assert_eq!(stdout.trim(), "false");
    }

    #[test]
    fn update_without_coverage_is_a_no_op() {
        let Some(repo) = project() else { return };
        write_passing_results(&repo);

        let (ok, _, _) = repo.unit(&["update-cache"]);
        assert!(ok);
        assert!(!repo.cache_file("unit-test-cache.json").exists());
    }

    #[test]
    fn failing_test_is_not_cached() {
        let Some(repo) = recorded_project() else { return };

        let results = serde_json::json!({ "testResults": [{
            "name": repo.path("src/b.test.ts"),
            "status": "failed",
            "assertionResults": [{ "status": "failed" }]
        }]});
        repo.write("test-results.json", &results.to_string());
        let (ok, _, _) = repo.unit(&["update-cache"]);
        assert!(ok);

        let (_, stdout, _) = repo.unit(&["list-tests-to-run"]);
        assert_eq!(list(&stdout), ["src/b.test.ts"]);
    }

    #[test]
    fn cache_dir_can_be_relocated() {
        let Some(repo) = project() else { return };
        write_passing_results(&repo);
        write_aggregate_coverage(&repo);

        let (ok, _, _) = repo.unit(&["update-cache", "--cache-dir", "ci-cache"]);
        assert!(ok);
        assert!(repo.root.join("ci-cache/unit-test-cache.json").exists());
        assert!(!repo.cache_file("unit-test-cache.json").exists());
    }
}

mod feature_suite {
    use super::*;

    fn project() -> Option<Repo> {
        let repo = Repo::new()?;
        repo.write("package.json", r#"{ "name": "app" }"#);
        repo.write("src/app.ts", "export const app = 1;\n");
        repo.write("e2e/features/login.feature", "Feature: Login\n");
        repo.write("e2e/features/cart.feature", "Feature: Cart\n");
        repo.write("e2e/steps/login.steps.ts", "Given('a user', () => {});\n");
        repo.write(".gitignore", "coverage-e2e/\n.test-cache/\ncucumber-report.json\n");
        repo.commit("init");

        let report = serde_json::json!([
            {
                "uri": "e2e/features/login.feature",
                "elements": [{ "type": "scenario", "steps": [{ "result": { "status": "passed" } }] }]
            },
            {
                "uri": "e2e/features/cart.feature",
                "elements": [{ "type": "scenario", "steps": [{ "result": { "status": "passed" } }] }]
            }
        ]);
        repo.write("cucumber-report.json", &report.to_string());
        let coverage = serde_json::json!({
            repo.path("src/app.ts"): { "s": { "0": 1 } },
        });
        repo.write("coverage-e2e/coverage-final.json", &coverage.to_string());

        let (ok, _, stderr) = repo.feature(&["update-cache"]);
        assert!(ok, "update-cache failed: {}", stderr);
        Some(repo)
    }

    #[test]
    fn fresh_cache_skips_everything() {
        let Some(repo) = project() else { return };

        let (ok, stdout, _) = repo.feature(&["should-skip-all"]);
        assert!(ok);
        assert_eq!(stdout.trim(), "true");

        let (_, stdout, _) = repo.feature(&["get-feature-filter"]);
        assert_eq!(stdout.trim(), "--tags @__none__");
    }

    #[test]
    fn step_definition_change_is_a_recorded_dependency() {
        let Some(repo) = project() else { return };

        repo.write("e2e/steps/login.steps.ts", "Given('an admin', () => {});\n");
        repo.commit("steps");

        let (_, stdout, _) = repo.feature(&["list-features-to-run"]);
        assert_eq!(
            list(&stdout),
            ["e2e/features/cart.feature", "e2e/features/login.feature"]
        );

        let (_, stdout, _) = repo.feature(&["explain"]);
        assert!(
            stdout.contains("e2e/features/login.feature  (dependency in diff: e2e/steps/login.steps.ts)"),
            "{}",
            stdout
        );
    }

    #[test]
    fn feature_edit_selects_only_that_feature() {
        let Some(repo) = project() else { return };

        repo.write("e2e/features/cart.feature", "Feature: Cart\n  Scenario: empty\n");
        repo.commit("cart");

        let (_, stdout, _) = repo.feature(&["get-feature-filter"]);
        assert_eq!(stdout.trim(), "e2e/features/cart.feature");
    }

    #[test]
    fn caches_do_not_collide() {
        let Some(repo) = project() else { return };

        assert!(repo.cache_file("feature-test-cache.json").exists());
        assert!(!repo.cache_file("unit-test-cache.json").exists());
    }
}

#[test]
fn help_lists_suite_specific_commands() {
    let output = Command::new(env!("CARGO_BIN_EXE_feature-cache"))
        .arg("--help")
        .output()
        .expect("Failed to run feature-cache");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("list-features-to-run"));
    assert!(stdout.contains("get-feature-filter"));

    let output = Command::new(env!("CARGO_BIN_EXE_test-cache"))
        .arg("--help")
        .current_dir(Path::new(env!("CARGO_MANIFEST_DIR")))
        .output()
        .expect("Failed to run test-cache");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("list-tests-to-run"));
}
