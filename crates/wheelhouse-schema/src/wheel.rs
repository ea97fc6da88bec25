//! Wheel filename parsing.
//!
//! `{name}-{version}(-{build})?-{python}-{abi}-{platform}.whl`, where the
//! name uses `_` in place of `-` and the last three components may be
//! dot-compressed (see [`TagSet::parse`]).

use thiserror::Error;

use crate::{ProjectName, TagSet, Version};

/// Errors produced while parsing a wheel filename.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilenameError {
    /// The filename does not end in `.whl`.
    #[error("invalid wheel filename (extension must be '.whl'): {0}")]
    Extension(String),

    /// Wrong number of `-`-separated parts.
    #[error("invalid wheel filename (wrong number of parts): {0}")]
    Parts(String),

    /// The name part contains characters a wheel name may not have.
    #[error("invalid project name: {0}")]
    Name(String),

    /// The version part is not PEP 440.
    #[error("invalid wheel filename (invalid version): {0}")]
    Version(String),

    /// The build tag does not start with a digit.
    #[error("invalid build number: {0}")]
    Build(String),
}

/// A parsed wheel filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WheelFilename {
    /// The filename exactly as given (basename only).
    pub filename: String,
    /// Normalized project name.
    pub name: ProjectName,
    /// Project version.
    pub version: Version,
    /// Optional build tag.
    pub build: Option<String>,
    /// Expanded compatibility tags.
    pub tags: TagSet,
}

impl WheelFilename {
    /// Parse the basename of a wheel file.
    ///
    /// # Errors
    ///
    /// Returns a [`FilenameError`] describing which component is invalid.
    pub fn parse(filename: &str) -> Result<Self, FilenameError> {
        let stem = filename
            .strip_suffix(".whl")
            .ok_or_else(|| FilenameError::Extension(filename.to_string()))?;

        let parts: Vec<&str> = stem.split('-').collect();
        if parts.len() != 5 && parts.len() != 6 {
            return Err(FilenameError::Parts(filename.to_string()));
        }

        let name_part = parts[0];
        if name_part.is_empty()
            || !name_part
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
        {
            return Err(FilenameError::Name(filename.to_string()));
        }

        let version = Version::parse(parts[1])
            .map_err(|_| FilenameError::Version(filename.to_string()))?;

        let build = if parts.len() == 6 {
            let build = parts[2];
            if !build.starts_with(|c: char| c.is_ascii_digit()) {
                return Err(FilenameError::Build(build.to_string()));
            }
            Some(build.to_string())
        } else {
            None
        };

        let n = parts.len();
        let tag_str = parts[n - 3..].join("-");
        let tags = TagSet::parse(&tag_str).map_err(|_| FilenameError::Parts(filename.to_string()))?;

        Ok(Self {
            filename: filename.to_string(),
            name: ProjectName::new(name_part),
            version,
            build,
            tags,
        })
    }

    /// Whether the wheel is platform-agnostic (`-any.whl`).
    pub fn is_purelib(&self) -> bool {
        self.filename.ends_with("-any.whl")
    }
}

impl std::fmt::Display for WheelFilename {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Tag;

    #[test]
    fn test_parse_purelib() {
        let whl = WheelFilename::parse("my_pkg-1.2.3-py2.py3-none-any.whl").unwrap();
        assert_eq!(whl.name.as_str(), "my-pkg");
        assert_eq!(whl.version, Version::parse("1.2.3").unwrap());
        assert_eq!(whl.build, None);
        assert!(whl.tags.contains(&Tag::new("py3", "none", "any")));
        assert!(whl.is_purelib());
    }

    #[test]
    fn test_parse_build_tag() {
        let whl = WheelFilename::parse("foo-1.0-1-cp311-cp311-manylinux_2_17_x86_64.whl").unwrap();
        assert_eq!(whl.build.as_deref(), Some("1"));
        assert!(!whl.is_purelib());
    }

    #[test]
    fn test_compressed_platforms_expand() {
        let whl = WheelFilename::parse(
            "foo-1.0-cp311-cp311-manylinux_2_17_x86_64.manylinux2014_x86_64.whl",
        )
        .unwrap();
        assert_eq!(whl.tags.len(), 2);
        assert!(whl.tags.contains(&Tag::new("cp311", "cp311", "manylinux2014_x86_64")));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            WheelFilename::parse("foo-1.0.tar.gz"),
            Err(FilenameError::Extension(_))
        ));
        assert!(matches!(
            WheelFilename::parse("foo-1.0-py3.whl"),
            Err(FilenameError::Parts(_))
        ));
        assert!(matches!(
            WheelFilename::parse("foo-bogus!-py3-none-any.whl"),
            Err(FilenameError::Version(_))
        ));
        assert!(matches!(
            WheelFilename::parse("foo-1.0-x1-py3-none-any.whl"),
            Err(FilenameError::Build(_))
        ));
    }
}
