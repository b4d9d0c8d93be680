use clap::Parser;
use std::process::ExitCode;
use testgate::cli::{UnitCli, init_logging};
use testgate::commands;
use testgate::suite::SuiteKind;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = UnitCli::parse();
    init_logging(cli.global.verbose);

    commands::run(SuiteKind::Unit, cli.global, cli.command.into()).await
}
