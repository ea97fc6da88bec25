use anyhow::{Context, Result};
use tracing::info;
use wheelhouse_core::Config;
use wheelhouse_core::catalog::{CommitInfo, extend_catalog, fetch_catalog, write_catalog};

use crate::CatalogArgs;

/// `wheelhouse catalog`
pub async fn catalog(args: &CatalogArgs) -> Result<()> {
    let config = Config::from_env().context("invalid environment configuration")?;
    let client = config.http_client()?;

    let published = fetch_catalog(&client, &args.pypi_url)
        .await
        .context("failed to fetch the published catalog")?;
    let before = published.len();

    let commit = CommitInfo::from_git().context("failed to read the current commit")?;
    let records = extend_catalog(published, &args.dist, &commit)?;
    write_catalog(&args.output, &records)
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    info!(
        published = before,
        added = records.len() - before,
        output = %args.output.display(),
        "catalog written"
    );
    println!("{} new wheels, {} total", records.len() - before, records.len());
    Ok(())
}
