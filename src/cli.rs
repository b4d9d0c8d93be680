//! Command-line surface of the two binaries.
//!
//! `test-cache` and `feature-cache` accept the same commands under
//! suite-specific names; both are mapped onto one [`Action`].

use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Project root (default: enclosing git work tree of the current directory)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Directory holding the cache files, relative to the project root
    #[arg(long, global = true, env = "TEST_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Settings file (default: testgate.toml at the project root)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log every per-artifact decision to stderr
    #[arg(
        short,
        long,
        global = true,
        env = "TEST_CACHE_VERBOSE",
        value_parser = BoolishValueParser::new()
    )]
    pub verbose: bool,
}

/// Reporter outputs that replace the configured locations for one update.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateArgs {
    /// Coverage report of the run
    #[arg(long)]
    pub coverage: Option<PathBuf>,

    /// Results report of the run; repeat for sharded runs
    #[arg(long = "results")]
    pub results: Vec<PathBuf>,

    /// Per-artifact module graph of the run
    #[arg(long)]
    pub module_graph: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    List,
    ShouldSkipAll,
    Filter,
    UpdateCache(UpdateArgs),
    Stats { json: bool },
    Explain { all: bool },
}

/// Incremental selection for unit test files
#[derive(Parser, Debug)]
#[command(name = "test-cache", version)]
pub struct UnitCli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: UnitCommand,
}

#[derive(Subcommand, Debug)]
pub enum UnitCommand {
    /// Print the test files that must run as a JSON array
    ListTestsToRun,
    /// Print `true` and exit 0 when no test file needs to run
    ShouldSkipAll,
    /// Print runner arguments selecting exactly the tests that must run
    GetTestFilter,
    /// Record the finished run's coverage and results
    UpdateCache(UpdateArgs),
    /// Summarize the cache and the current selection
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Show the decision and reason for every test file
    Explain {
        /// Include skipped test files
        #[arg(long)]
        all: bool,
    },
}

impl From<UnitCommand> for Action {
    fn from(command: UnitCommand) -> Self {
        match command {
            UnitCommand::ListTestsToRun => Action::List,
            UnitCommand::ShouldSkipAll => Action::ShouldSkipAll,
            UnitCommand::GetTestFilter => Action::Filter,
            UnitCommand::UpdateCache(args) => Action::UpdateCache(args),
            UnitCommand::Stats { json } => Action::Stats { json },
            UnitCommand::Explain { all } => Action::Explain { all },
        }
    }
}

/// Incremental selection for feature files
#[derive(Parser, Debug)]
#[command(name = "feature-cache", version)]
pub struct FeatureCli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: FeatureCommand,
}

#[derive(Subcommand, Debug)]
pub enum FeatureCommand {
    /// Print the feature files that must run as a JSON array
    ListFeaturesToRun,
    /// Print `true` and exit 0 when no feature file needs to run
    ShouldSkipAll,
    /// Print runner arguments selecting exactly the features that must run
    GetFeatureFilter,
    /// Record the finished run's coverage and results
    UpdateCache(UpdateArgs),
    /// Summarize the cache and the current selection
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Show the decision and reason for every feature file
    Explain {
        /// Include skipped feature files
        #[arg(long)]
        all: bool,
    },
}

impl From<FeatureCommand> for Action {
    fn from(command: FeatureCommand) -> Self {
        match command {
            FeatureCommand::ListFeaturesToRun => Action::List,
            FeatureCommand::ShouldSkipAll => Action::ShouldSkipAll,
            FeatureCommand::GetFeatureFilter => Action::Filter,
            FeatureCommand::UpdateCache(args) => Action::UpdateCache(args),
            FeatureCommand::Stats { json } => Action::Stats { json },
            FeatureCommand::Explain { all } => Action::Explain { all },
        }
    }
}

/// Logs go to stderr; stdout carries only command output.
pub fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("testgate=debug")
        } else {
            EnvFilter::new("testgate=warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}
