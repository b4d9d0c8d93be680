use clap::Parser;
use std::process::ExitCode;
use testgate::cli::{FeatureCli, init_logging};
use testgate::commands;
use testgate::suite::SuiteKind;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = FeatureCli::parse();
    init_logging(cli.global.verbose);

    commands::run(SuiteKind::Feature, cli.global, cli.command.into()).await
}
