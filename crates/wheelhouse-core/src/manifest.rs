//! The package manifest (`packages.ini`).
//!
//! One section per pinned package, named `<name>==<version>`, holding
//! whitespace-separated lists of build and validation hints:
//!
//! ```ini
//! [xmlsec==1.3.12]
//! apt_requires =
//!     libxmlsec1-dev
//!     pkg-config
//! brew_requires = libxmlsec1
//! python_versions = <3.13
//! ```
//!
//! The file is read with INI semantics: keys are case-insensitive, `=` or
//! `:` separate key and value, indented lines continue the previous value,
//! and lines starting with `#` or `;` are comments.

use std::collections::BTreeSet;
use std::path::Path;

use wheelhouse_schema::{ProjectName, SpecifierSet, Version};

use crate::error::{ConfigError, Result};

const KNOWN_KEYS: &[&str] = &[
    "apt_requires",
    "brew_requires",
    "custom_prebuild",
    "likely_binary_ignore",
    "ignore_wheels",
    "python_versions",
    "validate_extras",
    "validate_incorrect_missing_deps",
    "validate_skip_imports",
];

/// Hints consumed by the verifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidateInfo {
    /// Extras to install alongside the artifact, e.g. `crypto,socks`.
    pub extras: Option<String>,
    /// Requirements the artifact forgets to declare.
    pub incorrect_missing_deps: Vec<String>,
    /// Top-level modules that cannot be imported in isolation.
    pub skip_imports: Vec<String>,
}

/// One pinned package and its hints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Normalized project name.
    pub name: ProjectName,
    /// Pinned version.
    pub version: Version,
    /// Debian packages needed to build on Linux.
    pub apt_requires: Vec<String>,
    /// Homebrew formulae needed to build on macOS.
    pub brew_requires: Vec<String>,
    /// Executable and arguments that populate a prefix before building;
    /// the prefix path is appended as the last argument.
    pub custom_prebuild: Vec<String>,
    /// Source files that should not count as evidence of a native build.
    pub likely_binary_ignore: Vec<String>,
    /// Public wheel filenames that must never be downloaded.
    pub ignore_wheels: Vec<String>,
    /// Interpreters this version supports; empty means all.
    pub python_versions: SpecifierSet,
    /// Verifier hints.
    pub validate: ValidateInfo,
}

impl ManifestEntry {
    /// A bare entry with no hints.
    pub fn new(name: &str, version: Version) -> Self {
        Self {
            name: ProjectName::new(name),
            version,
            apt_requires: Vec::new(),
            brew_requires: Vec::new(),
            custom_prebuild: Vec::new(),
            likely_binary_ignore: Vec::new(),
            ignore_wheels: Vec::new(),
            python_versions: SpecifierSet::default(),
            validate: ValidateInfo::default(),
        }
    }

    /// `name==version`, the form used in messages and pip requirements.
    pub fn requirement(&self) -> String {
        format!("{}=={}", self.name, self.version)
    }

    fn from_section(section: &str, pairs: Vec<(String, String)>) -> Result<Self> {
        let Some((name, version_s)) = section
            .split_once("==")
            .filter(|(name, _)| !name.trim().is_empty())
        else {
            return Err(ConfigError::MalformedSection {
                section: section.to_string(),
            }
            .into());
        };
        let version = Version::parse(version_s.trim()).map_err(|source| ConfigError::InvalidVersion {
            section: section.to_string(),
            source,
        })?;

        let unknown: BTreeSet<String> = pairs
            .iter()
            .map(|(k, _)| k.clone())
            .filter(|k| !KNOWN_KEYS.contains(&k.as_str()))
            .collect();
        if !unknown.is_empty() {
            return Err(ConfigError::UnknownKeys {
                section: section.to_string(),
                keys: unknown.into_iter().collect(),
            }
            .into());
        }

        let mut entry = Self::new(name.trim(), version);
        for (key, value) in pairs {
            let tokens = || value.split_whitespace().map(str::to_string).collect::<Vec<_>>();
            match key.as_str() {
                "apt_requires" => entry.apt_requires = tokens(),
                "brew_requires" => entry.brew_requires = tokens(),
                "custom_prebuild" => entry.custom_prebuild = tokens(),
                "likely_binary_ignore" => entry.likely_binary_ignore = tokens(),
                "ignore_wheels" => entry.ignore_wheels = tokens(),
                "python_versions" => {
                    entry.python_versions = SpecifierSet::parse(&value).map_err(|source| {
                        ConfigError::InvalidVersion {
                            section: section.to_string(),
                            source,
                        }
                    })?;
                }
                "validate_extras" => {
                    let extras = value.trim();
                    entry.validate.extras = (!extras.is_empty()).then(|| extras.to_string());
                }
                "validate_incorrect_missing_deps" => entry.validate.incorrect_missing_deps = tokens(),
                "validate_skip_imports" => entry.validate.skip_imports = tokens(),
                _ => {}
            }
        }
        Ok(entry)
    }
}

/// All entries, in file order.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Read and parse a manifest file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::ManifestNotFound`] if the file cannot be read, and any
    /// parse error from [`Manifest::parse`].
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::ManifestNotFound(path.to_path_buf()))?;
        Self::parse_named(&text, &path.display().to_string())
    }

    /// Parse manifest text.
    ///
    /// # Errors
    ///
    /// Syntax errors, malformed section names, duplicate sections, unknown
    /// keys and unparsable versions are all fatal.
    pub fn parse(text: &str) -> Result<Self> {
        Self::parse_named(text, "<manifest>")
    }

    fn parse_named(text: &str, path: &str) -> Result<Self> {
        let sections = parse_ini(text, path)?;

        let mut seen = BTreeSet::new();
        let mut entries = Vec::with_capacity(sections.len());
        for (section, pairs) in sections {
            if !section.contains("==") {
                return Err(ConfigError::MalformedSection { section }.into());
            }
            let entry = ManifestEntry::from_section(&section, pairs)?;
            if !seen.insert((entry.name.clone(), entry.version.clone())) {
                return Err(ConfigError::DuplicateSection { section }.into());
            }
            entries.push(entry);
        }
        Ok(Self { entries })
    }

    /// Entries in file order.
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Look up an entry by normalized name and version.
    pub fn get(&self, name: &ProjectName, version: &Version) -> Option<&ManifestEntry> {
        self.entries
            .iter()
            .find(|e| &e.name == name && &e.version == version)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

type Section = (String, Vec<(String, String)>);

fn parse_ini(text: &str, path: &str) -> Result<Vec<Section>> {
    let syntax = |line: usize, message: &str| ConfigError::Syntax {
        path: path.to_string(),
        line,
        message: message.to_string(),
    };

    let mut sections: Vec<Section> = Vec::new();
    let mut names = BTreeSet::new();
    // Whether the last non-blank line was a key we may continue.
    let mut continuable = false;

    for (i, raw) in text.lines().enumerate() {
        let lineno = i + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }

        if raw.starts_with([' ', '\t']) {
            let pair = sections
                .last_mut()
                .and_then(|(_, pairs)| pairs.last_mut())
                .filter(|_| continuable)
                .ok_or_else(|| syntax(lineno, "continuation line without a key"))?;
            if !pair.1.is_empty() {
                pair.1.push('\n');
            }
            pair.1.push_str(trimmed);
            continue;
        }

        if let Some(name) = trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            let name = name.to_string();
            if !names.insert(name.clone()) {
                return Err(ConfigError::DuplicateSection { section: name }.into());
            }
            sections.push((name, Vec::new()));
            continuable = false;
            continue;
        }

        let Some(idx) = trimmed.find(['=', ':']) else {
            return Err(syntax(lineno, "expected `key = value`").into());
        };
        let key = trimmed[..idx].trim().to_lowercase();
        let value = trimmed[idx + 1..].trim().to_string();
        if key.is_empty() {
            return Err(syntax(lineno, "empty key").into());
        }
        let (_, pairs) = sections
            .last_mut()
            .ok_or_else(|| syntax(lineno, "key outside of a section"))?;
        if pairs.iter().any(|(k, _)| *k == key) {
            return Err(syntax(lineno, &format!("duplicate key {key:?}")).into());
        }
        pairs.push((key, value));
        continuable = true;
    }
    Ok(sections)
}
