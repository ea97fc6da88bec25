use anyhow::{Context, Result};
use tracing::info;
use wheelhouse_core::catalog::{self, fetch_catalog};
use wheelhouse_core::host::Host;
use wheelhouse_core::platform::{self, SetupContext};
use wheelhouse_core::python::Pip;
use wheelhouse_core::tags::TagUniverse;
use wheelhouse_core::{AvailabilityIndex, Manifest, Resolver};

use super::load_config;
use crate::BuildArgs;
use crate::ui::ConsoleReporter;

/// `wheelhouse build`
pub async fn build(args: BuildArgs) -> Result<()> {
    let mut config = load_config(&args.pythons)?;
    if let Some(public) = &args.public_index_url {
        config.public_index.clone_from(public);
    }

    let manifest = Manifest::load(&args.packages_ini)?;
    let index_url = catalog::index_url(&args.pypi_url)?;
    let host = Host::detect().context("failed to detect host platform")?;
    info!(?host, pythons = ?config.pythons, %index_url, "starting build");

    let client = config.http_client()?;
    let records = fetch_catalog(&client, &args.pypi_url)
        .await
        .context("failed to fetch the published catalog")?;
    let mut index = AvailabilityIndex::from_catalog(&records)?;

    let ctx = SetupContext {
        packages_ini: args.packages_ini.clone(),
        dest: args.dest.clone(),
        pypi_url: args.pypi_url.clone(),
        pythons: config.pythons.clone(),
        no_validate: args.no_validate,
    };

    // Every step below shells out and blocks.
    let report = tokio::task::spawn_blocking(move || {
        let platform = platform::for_host(&host, &config);
        let tools = Pip::new(&config.public_index, &config.tool_python);
        let reporter = ConsoleReporter::new(args.verbose);
        let universe = TagUniverse::for_host(&host);
        Resolver::new(
            platform.as_ref(),
            &tools,
            &reporter,
            universe,
            &config.pythons,
            index_url.as_str(),
        )
        .with_validation(!args.no_validate)
        .run(&manifest, &mut index, &args.dest, &ctx)
    })
    .await
    .context("build task panicked")??;

    if report.delegated {
        info!("build completed in container");
    } else {
        info!(
            downloaded = report.downloaded_count(),
            built = report.built_count(),
            satisfied = report.satisfied_count(),
            "build finished"
        );
    }
    Ok(())
}
