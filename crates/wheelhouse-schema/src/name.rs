//! Normalized project names.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;

/// A normalized Python project name.
///
/// Names compare equal after lowercasing and collapsing every run of `-`,
/// `_` and `.` into a single `-`, so `Django`, `aspy.yaml` and `my_pkg`
/// become `django`, `aspy-yaml` and `my-pkg`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectName(String);

impl ProjectName {
    /// Normalize `name` into a `ProjectName`.
    pub fn new(name: &str) -> Self {
        Self(canonicalize(name))
    }

    /// Return the normalized name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn canonicalize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.trim().chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator {
                out.push('-');
            }
            in_separator = true;
        } else {
            out.extend(c.to_lowercase());
            in_separator = false;
        }
    }
    out
}

impl std::fmt::Display for ProjectName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ProjectName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ProjectName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProjectName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercases() {
        assert_eq!(ProjectName::new("Django").as_str(), "django");
    }

    #[test]
    fn test_collapses_separator_runs() {
        assert_eq!(ProjectName::new("aspy.yaml").as_str(), "aspy-yaml");
        assert_eq!(ProjectName::new("my__pkg").as_str(), "my-pkg");
        assert_eq!(ProjectName::new("a-_.b").as_str(), "a-b");
    }

    #[test]
    fn test_wheel_and_section_spellings_match() {
        assert_eq!(ProjectName::new("my_pkg"), ProjectName::new("my-pkg"));
    }
}
