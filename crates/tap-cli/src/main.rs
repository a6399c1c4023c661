//! tap - package descriptor runner

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tap_cli::cmd;
use tap_cli::{Cli, Commands};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = cmd::Options {
        home: cli.home,
        prefix: cli.prefix,
        quiet: cli.quiet,
    };

    let result = match cli.command {
        Commands::Fetch { formula } => cmd::fetch::fetch(&ctx, &formula).await,
        Commands::Install { formula, verbose } => {
            cmd::install::install(&ctx, &formula, verbose).await
        }
        Commands::Test { formula } => cmd::test::test(&ctx, &formula),
        Commands::Run { formula, verbose } => cmd::run::run(&ctx, &formula, verbose).await,
        Commands::Check { formula } => cmd::check::check(&ctx, &formula),
        Commands::Show { formula } => cmd::check::show(&ctx, &formula),
        Commands::Hash { files } => cmd::hash::hash(&files),
        Commands::New { name, output_dir } => cmd::new::new(&ctx, &name, &output_dir),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tap_cli::ui::Output::new(false).report_error(&err);
            ExitCode::FAILURE
        }
    }
}
