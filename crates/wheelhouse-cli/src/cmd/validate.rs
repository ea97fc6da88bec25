use anyhow::{Context, Result};
use wheelhouse_core::host::Host;
use wheelhouse_core::platform;
use wheelhouse_core::python::Pip;
use wheelhouse_core::verify::Verifier;
use wheelhouse_core::{Manifest, Reporter};

use super::load_config;
use crate::ValidateArgs;
use crate::ui::ConsoleReporter;

/// `wheelhouse validate`
pub fn validate(args: &ValidateArgs) -> Result<()> {
    let config = load_config(&args.pythons)?;
    let manifest = Manifest::load(&args.packages_ini)?;
    let host = Host::detect().context("failed to detect host platform")?;

    let platform = platform::for_host(&host, &config);
    let tools = Pip::new(&config.public_index, &config.tool_python);
    let reporter = ConsoleReporter::default();
    let verifier = Verifier::new(
        platform.as_ref(),
        &tools,
        &reporter,
        &args.index_url,
        &config.pythons,
    );

    let start = std::time::Instant::now();
    let count = verifier
        .verify_dist(&args.dist, &manifest)
        .with_context(|| format!("validation of {} failed", args.dist.display()))?;
    reporter.summary(count, "validated", start.elapsed().as_secs_f64());
    Ok(())
}
