pub mod build;
pub mod catalog;
pub mod validate;

use anyhow::{Context, Result};
use wheelhouse_core::Config;
use wheelhouse_schema::PythonVersion;

/// Environment configuration with `--python` flags applied on top.
fn load_config(pythons: &[PythonVersion]) -> Result<Config> {
    let mut config = Config::from_env().context("invalid environment configuration")?;
    if !pythons.is_empty() {
        config.pythons = pythons.to_vec();
    }
    Ok(config)
}
