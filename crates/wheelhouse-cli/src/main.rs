//! wheelhouse - a private mirror of Python wheels

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use wheelhouse_cli::cmd;
use wheelhouse_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build(args) => cmd::build::build(args).await,
        Commands::Validate(args) => cmd::validate::validate(&args),
        Commands::Catalog(args) => cmd::catalog::catalog(&args).await,
    }
}
