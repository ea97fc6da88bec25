//! PEP 440 versions and version specifiers.
//!
//! Only what the mirror needs: parsing, normalized equality (`1.0 ==
//! 1.0.0`), total ordering, and `SpecifierSet` membership for the
//! `python_versions` manifest key.

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::PythonVersion;

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        ^\s*v?
        (?:(?P<epoch>[0-9]+)!)?
        (?P<release>[0-9]+(?:\.[0-9]+)*)
        (?P<pre>
            [-_\.]?
            (?P<pre_l>alpha|a|beta|b|preview|pre|c|rc)
            [-_\.]?
            (?P<pre_n>[0-9]+)?
        )?
        (?P<post>
            (?:-(?P<post_n1>[0-9]+))
            |
            (?:[-_\.]?(?P<post_l>post|rev|r)[-_\.]?(?P<post_n2>[0-9]+)?)
        )?
        (?P<dev>
            [-_\.]?
            (?P<dev_l>dev)
            [-_\.]?
            (?P<dev_n>[0-9]+)?
        )?
        (?:\+(?P<local>[a-z0-9]+(?:[-_\.][a-z0-9]+)*))?
        \s*$",
    )
    .expect("static version pattern is valid")
});

/// Errors from parsing versions and specifiers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// Not a PEP 440 version.
    #[error("invalid version: {0:?}")]
    InvalidVersion(String),

    /// Not a recognised `<op><version>` clause.
    #[error("invalid specifier: {0:?}")]
    InvalidSpecifier(String),
}

/// Pre-release phase, ordered `a < b < rc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Phase {
    Alpha,
    Beta,
    Rc,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Self::Alpha => "a",
            Self::Beta => "b",
            Self::Rc => "rc",
        }
    }
}

/// Local version segment. Strings sort before numbers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Local {
    Str(String),
    Num(u64),
}

/// A comparison slot that may be absent on either end of the ordering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Slot<T> {
    Low,
    Val(T),
    High,
}

/// A parsed PEP 440 version.
#[derive(Debug, Clone)]
pub struct Version {
    epoch: u64,
    release: Vec<u64>,
    pre: Option<(Phase, u64)>,
    post: Option<u64>,
    dev: Option<u64>,
    local: Option<Vec<Local>>,
}

type SortKey = (
    u64,
    Vec<u64>,
    Slot<(Phase, u64)>,
    Slot<u64>,
    Slot<u64>,
    Slot<Vec<Local>>,
);

impl Version {
    /// Parse a version string.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::InvalidVersion`] if `s` is not PEP 440.
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let caps = VERSION_RE
            .captures(s)
            .ok_or_else(|| VersionError::InvalidVersion(s.to_string()))?;
        let num = |name: &str| -> Result<Option<u64>, VersionError> {
            caps.name(name)
                .map(|m| m.as_str().parse::<u64>())
                .transpose()
                .map_err(|_| VersionError::InvalidVersion(s.to_string()))
        };

        let release = caps["release"]
            .split('.')
            .map(str::parse)
            .collect::<Result<Vec<u64>, _>>()
            .map_err(|_| VersionError::InvalidVersion(s.to_string()))?;

        let pre = match caps.name("pre_l") {
            Some(label) => {
                let phase = match label.as_str().to_lowercase().as_str() {
                    "a" | "alpha" => Phase::Alpha,
                    "b" | "beta" => Phase::Beta,
                    _ => Phase::Rc,
                };
                Some((phase, num("pre_n")?.unwrap_or(0)))
            }
            None => None,
        };

        let post = if caps.name("post").is_some() {
            Some(num("post_n1")?.or(num("post_n2")?).unwrap_or(0))
        } else {
            None
        };

        let dev = if caps.name("dev").is_some() {
            Some(num("dev_n")?.unwrap_or(0))
        } else {
            None
        };

        let local = caps.name("local").map(|m| {
            m.as_str()
                .split(['-', '_', '.'])
                .map(|seg| match seg.parse::<u64>() {
                    Ok(n) => Local::Num(n),
                    Err(_) => Local::Str(seg.to_lowercase()),
                })
                .collect()
        });

        Ok(Self {
            epoch: num("epoch")?.unwrap_or(0),
            release,
            pre,
            post,
            dev,
            local,
        })
    }

    /// This version with any `+local` label removed.
    pub fn public(&self) -> Self {
        Self {
            local: None,
            ..self.clone()
        }
    }

    fn sort_key(&self) -> SortKey {
        let mut release = self.release.clone();
        while release.len() > 1 && release.last() == Some(&0) {
            release.pop();
        }

        let pre = match (self.pre, self.post, self.dev) {
            (None, None, Some(_)) => Slot::Low,
            (None, _, _) => Slot::High,
            (Some(pre), _, _) => Slot::Val(pre),
        };
        let post = self.post.map_or(Slot::Low, Slot::Val);
        let dev = self.dev.map_or(Slot::High, Slot::Val);
        let local = self.local.clone().map_or(Slot::Low, Slot::Val);

        (self.epoch, release, pre, post, dev, local)
    }
}

impl From<PythonVersion> for Version {
    fn from(v: PythonVersion) -> Self {
        Self {
            epoch: 0,
            release: vec![u64::from(v.major), u64::from(v.minor)],
            pre: None,
            post: None,
            dev: None,
            local: None,
        }
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}

impl Eq for Version {}

impl std::hash::Hash for Version {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.sort_key().hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}!", self.epoch)?;
        }
        let release: Vec<String> = self.release.iter().map(ToString::to_string).collect();
        write!(f, "{}", release.join("."))?;
        if let Some((phase, n)) = self.pre {
            write!(f, "{}{n}", phase.as_str())?;
        }
        if let Some(n) = self.post {
            write!(f, ".post{n}")?;
        }
        if let Some(n) = self.dev {
            write!(f, ".dev{n}")?;
        }
        if let Some(local) = &self.local {
            let segs: Vec<String> = local
                .iter()
                .map(|seg| match seg {
                    Local::Str(s) => s.clone(),
                    Local::Num(n) => n.to_string(),
                })
                .collect();
            write!(f, "+{}", segs.join("."))?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Comparison operator of a single specifier clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Compatible,
    Equal,
    EqualPrefix,
    NotEqual,
    NotEqualPrefix,
    LessEqual,
    GreaterEqual,
    Less,
    Greater,
    Arbitrary,
}

/// One clause of a specifier set, e.g. `>=3.9`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Specifier {
    op: Op,
    raw: String,
    version: Option<Version>,
}

impl Specifier {
    /// Parse a single clause.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::InvalidSpecifier`] for an unknown operator, a
    /// wildcard on an operator that does not allow it, or a bad version.
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let s = s.trim();
        let invalid = || VersionError::InvalidSpecifier(s.to_string());

        const OPS: [(&str, Op); 8] = [
            ("===", Op::Arbitrary),
            ("~=", Op::Compatible),
            ("==", Op::Equal),
            ("!=", Op::NotEqual),
            ("<=", Op::LessEqual),
            (">=", Op::GreaterEqual),
            ("<", Op::Less),
            (">", Op::Greater),
        ];
        let (prefix, mut op) = OPS
            .iter()
            .find(|(prefix, _)| s.starts_with(prefix))
            .copied()
            .ok_or_else(invalid)?;
        let mut rest = s[prefix.len()..].trim();

        if op == Op::Arbitrary {
            return Ok(Self {
                op,
                raw: s.to_string(),
                version: None,
            });
        }

        if let Some(stripped) = rest.strip_suffix(".*") {
            op = match op {
                Op::Equal => Op::EqualPrefix,
                Op::NotEqual => Op::NotEqualPrefix,
                _ => return Err(invalid()),
            };
            rest = stripped;
        }

        let version = Version::parse(rest).map_err(|_| invalid())?;
        if op == Op::Compatible && version.release.len() < 2 {
            return Err(invalid());
        }

        Ok(Self {
            op,
            raw: s.to_string(),
            version: Some(version),
        })
    }

    /// Whether `candidate` satisfies this clause.
    pub fn contains(&self, candidate: &Version) -> bool {
        let Some(spec) = &self.version else {
            return self.raw.trim_start_matches("===").trim() == candidate.to_string();
        };
        let candidate = if spec.local.is_none() {
            candidate.public()
        } else {
            candidate.clone()
        };

        match self.op {
            Op::Equal => candidate == *spec,
            Op::NotEqual => candidate != *spec,
            Op::EqualPrefix => prefix_match(&candidate, spec, spec.release.len()),
            Op::NotEqualPrefix => !prefix_match(&candidate, spec, spec.release.len()),
            Op::LessEqual => candidate <= *spec,
            Op::GreaterEqual => candidate >= *spec,
            Op::Less => candidate < *spec,
            Op::Greater => candidate > *spec,
            Op::Compatible => {
                candidate >= *spec && prefix_match(&candidate, spec, spec.release.len() - 1)
            }
            Op::Arbitrary => false,
        }
    }
}

fn prefix_match(candidate: &Version, spec: &Version, len: usize) -> bool {
    if candidate.epoch != spec.epoch {
        return false;
    }
    (0..len).all(|i| {
        candidate.release.get(i).copied().unwrap_or(0) == spec.release.get(i).copied().unwrap_or(0)
    })
}

impl std::fmt::Display for Specifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// A comma-separated conjunction of specifiers. Empty matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecifierSet(Vec<Specifier>);

impl SpecifierSet {
    /// Parse e.g. `>=3.9,<3.13`. Blank input yields the empty set.
    ///
    /// # Errors
    ///
    /// Returns the first clause that fails [`Specifier::parse`].
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        s.split(',')
            .map(str::trim)
            .filter(|clause| !clause.is_empty())
            .map(Specifier::parse)
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    /// Whether every clause accepts `candidate`.
    pub fn contains(&self, candidate: &Version) -> bool {
        self.0.iter().all(|spec| spec.contains(candidate))
    }

    /// Whether every clause accepts the interpreter version `python`.
    pub fn contains_python(&self, python: PythonVersion) -> bool {
        self.contains(&Version::from(python))
    }

    /// Whether the set has no clauses.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for SpecifierSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let clauses: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", clauses.join(","))
    }
}
