//! wheelhouse - a private mirror of Python wheels
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
//!
//! Keeps an internal package index stocked with platform wheels for a
//! curated list of pinned packages.
//!
//! # Commands
//!
//! - `build` downloads or compiles every missing `(package, interpreter)`
//!   wheel into `--dest`, verifying each one as it is produced.
//! - `validate` re-runs the install-and-import check over a directory of
//!   wheels.
//! - `catalog` appends records for new wheels to the index catalog.

pub mod cmd;
pub mod ui;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use wheelhouse_schema::PythonVersion;

#[derive(Debug, Parser)]
#[command(name = "wheelhouse")]
#[command(author, version = env!("WHEELHOUSE_VERSION"), about = "wheelhouse - a private mirror of Python wheels")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Download or build every wheel the manifest is missing
    Build(BuildArgs),
    /// Install and import every wheel in a directory
    Validate(ValidateArgs),
    /// Append records for new wheels to the index catalog
    Catalog(CatalogArgs),
}

#[derive(Debug, Args)]
pub struct BuildArgs {
    /// Package manifest
    #[arg(long, default_value = "packages.ini")]
    pub packages_ini: PathBuf,
    /// Output directory for new wheels
    #[arg(long, default_value = "dist")]
    pub dest: PathBuf,
    /// Base URL of the internal index
    #[arg(long, env = "WHEELHOUSE_PYPI_URL")]
    pub pypi_url: String,
    /// Public index to download from (overrides WHEELHOUSE_PUBLIC_INDEX)
    #[arg(long)]
    pub public_index_url: Option<String>,
    /// Interpreter to build for; repeat for several (overrides WHEELHOUSE_PYTHONS)
    #[arg(long = "python", value_name = "3.X")]
    pub pythons: Vec<PythonVersion>,
    /// Skip the install-and-import check of new wheels
    #[arg(long)]
    pub no_validate: bool,
    /// Also print pairs the internal index already satisfies
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Package manifest
    #[arg(long, default_value = "packages.ini")]
    pub packages_ini: PathBuf,
    /// Directory of wheels to check
    #[arg(long, default_value = "dist")]
    pub dist: PathBuf,
    /// Index that dependencies are installed from
    #[arg(long)]
    pub index_url: String,
    /// Interpreter to check against; repeat for several (overrides WHEELHOUSE_PYTHONS)
    #[arg(long = "python", value_name = "3.X")]
    pub pythons: Vec<PythonVersion>,
}

#[derive(Debug, Args)]
pub struct CatalogArgs {
    /// Directory of wheels to publish
    #[arg(long, default_value = "dist")]
    pub dist: PathBuf,
    /// Base URL of the internal index
    #[arg(long, env = "WHEELHOUSE_PYPI_URL")]
    pub pypi_url: String,
    /// Where to write the combined catalog
    #[arg(long)]
    pub output: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_build_args() {
        let cli = Cli::try_parse_from([
            "wheelhouse",
            "build",
            "--pypi-url",
            "https://pypi.example.com/",
            "--python",
            "3.12",
            "--python",
            "3.13",
            "--no-validate",
        ])
        .unwrap();
        let Commands::Build(args) = cli.command else {
            panic!("expected build");
        };
        assert_eq!(args.packages_ini, PathBuf::from("packages.ini"));
        assert_eq!(args.pythons, vec![PythonVersion::new(3, 12), PythonVersion::new(3, 13)]);
        assert!(args.no_validate);
    }

    #[test]
    fn test_bad_python_rejected() {
        assert!(
            Cli::try_parse_from(["wheelhouse", "validate", "--index-url", "x", "--python", "three"]).is_err()
        );
    }
}
