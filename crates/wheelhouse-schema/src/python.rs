//! Interpreter versions we build for.

use serde::{Deserialize, Serialize};

/// A CPython `(major, minor)` version such as `3.11`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PythonVersion {
    /// Major version (always 3 in practice).
    pub major: u32,
    /// Minor version.
    pub minor: u32,
}

impl PythonVersion {
    /// Create a version from its components.
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parse a CPython interpreter tag such as `cp311` or `cp39`.
    ///
    /// The first digit is the major version and the rest the minor, the same
    /// split the tag format itself uses.
    pub fn from_cp_tag(tag: &str) -> Option<Self> {
        let digits = tag.strip_prefix("cp")?;
        let mut chars = digits.chars();
        let major = chars.next()?.to_digit(10)?;
        let rest = chars.as_str();
        if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        Some(Self::new(major, rest.parse().ok()?))
    }

    /// The CPython interpreter tag, e.g. `cp311`.
    pub fn cp_tag(&self) -> String {
        format!("cp{}{}", self.major, self.minor)
    }

    /// The interpreter executable name on `PATH`, e.g. `python3.11`.
    pub fn exe(&self) -> String {
        format!("python{}.{}", self.major, self.minor)
    }
}

impl std::fmt::Display for PythonVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl std::str::FromStr for PythonVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (major, minor) = s
            .split_once('.')
            .ok_or_else(|| format!("Invalid python version: {s} (expected e.g. 3.11)"))?;
        let major = major
            .parse()
            .map_err(|_| format!("Invalid python version: {s}"))?;
        let minor = minor
            .parse()
            .map_err(|_| format!("Invalid python version: {s}"))?;
        Ok(Self::new(major, minor))
    }
}
