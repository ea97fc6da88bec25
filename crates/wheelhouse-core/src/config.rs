//! Run configuration read from the environment.
//!
//! CLI flags override individual fields after loading.

use std::time::Duration;

use reqwest::Client;
use wheelhouse_schema::PythonVersion;

use crate::error::{CatalogError, ConfigError, Result};

/// Interpreters built for when `WHEELHOUSE_PYTHONS` is unset.
pub const DEFAULT_PYTHONS: [PythonVersion; 3] = [
    PythonVersion::new(3, 11),
    PythonVersion::new(3, 12),
    PythonVersion::new(3, 13),
];

/// Where wheels and sdists are downloaded from.
pub const DEFAULT_PUBLIC_INDEX: &str = "https://pypi.org/simple";

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// Settings shared by every command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Supported interpreter versions, in build order.
    pub pythons: Vec<PythonVersion>,
    /// Public index used for downloads.
    pub public_index: String,
    /// Timeout for catalog requests.
    pub http_timeout: Duration,
    /// Interpreter that runs virtualenv, auditwheel and delocate.
    pub tool_python: String,
    /// Linux build image; `None` builds directly on the host.
    pub container_image: Option<String>,
    /// Set inside the build container to stop re-entering it.
    pub in_container: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pythons: DEFAULT_PYTHONS.to_vec(),
            public_index: DEFAULT_PUBLIC_INDEX.to_string(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            tool_python: "python3".to_string(),
            container_image: None,
            in_container: false,
        }
    }
}

/// Parse a comma-separated list such as `3.11,3.12`.
///
/// # Errors
///
/// [`ConfigError::InvalidSetting`] for any malformed item or an empty list.
pub fn parse_pythons(value: &str) -> Result<Vec<PythonVersion>, ConfigError> {
    let invalid = |message: String| ConfigError::InvalidSetting {
        key: "WHEELHOUSE_PYTHONS",
        value: value.to_string(),
        message,
    };
    let pythons = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<PythonVersion>().map_err(invalid))
        .collect::<Result<Vec<_>, _>>()?;
    if pythons.is_empty() {
        return Err(invalid("no interpreter versions given".to_string()));
    }
    Ok(pythons)
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Fails when a variable is set but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Same as [`Config::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup("WHEELHOUSE_PYTHONS") {
            config.pythons = parse_pythons(&value)?;
        }
        if let Some(value) = lookup("WHEELHOUSE_PUBLIC_INDEX").filter(|v| !v.is_empty()) {
            config.public_index = value;
        }
        if let Some(value) = lookup("WHEELHOUSE_HTTP_TIMEOUT") {
            let secs = value.trim().parse::<u64>().map_err(|e| ConfigError::InvalidSetting {
                key: "WHEELHOUSE_HTTP_TIMEOUT",
                value: value.clone(),
                message: e.to_string(),
            })?;
            config.http_timeout = Duration::from_secs(secs);
        }
        if let Some(value) = lookup("WHEELHOUSE_TOOL_PYTHON").filter(|v| !v.is_empty()) {
            config.tool_python = value;
        }
        config.container_image = lookup("WHEELHOUSE_CONTAINER_IMAGE").filter(|v| !v.is_empty());
        config.in_container = lookup("BUILD_IN_CONTAINER").is_some_and(|v| !v.is_empty());

        Ok(config)
    }

    /// Build the HTTP client used for catalog requests.
    ///
    /// # Errors
    ///
    /// TLS backend initialization failures.
    pub fn http_client(&self) -> Result<Client> {
        Client::builder()
            .user_agent(crate::USER_AGENT)
            .timeout(self.http_timeout)
            .build()
            .map_err(|e| CatalogError::Http(e).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.pythons, DEFAULT_PYTHONS.to_vec());
        assert_eq!(config.container_image, None);
        assert!(!config.in_container);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("WHEELHOUSE_PYTHONS", "3.12, 3.13"),
            ("WHEELHOUSE_PUBLIC_INDEX", "https://mirror.example.com/simple"),
            ("WHEELHOUSE_HTTP_TIMEOUT", "5"),
            ("WHEELHOUSE_TOOL_PYTHON", "/usr/bin/python3.12"),
            ("WHEELHOUSE_CONTAINER_IMAGE", "ghcr.io/example/manylinux"),
            ("BUILD_IN_CONTAINER", "1"),
        ]))
        .unwrap();
        assert_eq!(config.pythons, vec![PythonVersion::new(3, 12), PythonVersion::new(3, 13)]);
        assert_eq!(config.public_index, "https://mirror.example.com/simple");
        assert_eq!(config.http_timeout, Duration::from_secs(5));
        assert_eq!(config.tool_python, "/usr/bin/python3.12");
        assert_eq!(config.container_image.as_deref(), Some("ghcr.io/example/manylinux"));
        assert!(config.in_container);
    }

    #[test]
    fn test_invalid_values() {
        assert!(Config::from_lookup(lookup(&[("WHEELHOUSE_PYTHONS", "3")])).is_err());
        assert!(Config::from_lookup(lookup(&[("WHEELHOUSE_PYTHONS", " , ")])).is_err());
        assert!(Config::from_lookup(lookup(&[("WHEELHOUSE_HTTP_TIMEOUT", "soon")])).is_err());
    }

    #[test]
    fn test_http_client_builds() {
        assert!(Config::default().http_client().is_ok());
    }
}
