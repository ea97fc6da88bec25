//! TagUniverse: every tag an interpreter on this host can install.
//!
//! The generated tags follow pip's own preference order (exact CPython ABI,
//! then `abi3`, then `none`, then the generic `py3*` tags), but the result
//! is a set: the order only matters for readability of debug output.

use wheelhouse_schema::{PythonVersion, Tag, TagSet};

use crate::host::Host;

/// One supported interpreter and the tags it can install on this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreter {
    /// `(major, minor)` version.
    pub version: PythonVersion,
    /// All installable tags for that version here.
    pub tags: TagSet,
}

/// Computes installable tag sets for the current host.
#[derive(Debug, Clone)]
pub struct TagUniverse {
    platforms: Vec<String>,
}

impl TagUniverse {
    /// Build from a host, dropping the bare `linux_<arch>` platform: a wheel
    /// tagged that way makes no portability claim at all.
    pub fn for_host(host: &Host) -> Self {
        Self::from_platforms(host.platform_tags())
    }

    /// Build from an explicit platform list (most specific first).
    pub fn from_platforms<I, S>(platforms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let platforms = platforms
            .into_iter()
            .map(Into::<String>::into)
            .filter(|p| !p.starts_with("linux_"))
            .collect();
        Self { platforms }
    }

    /// Every tag a CPython `python` interpreter can install on this host.
    pub fn tags_for(&self, python: PythonVersion) -> TagSet {
        supported_tags(python, &self.platforms).into_iter().collect()
    }

    /// Resolve each configured version into an [`Interpreter`].
    pub fn interpreters(&self, pythons: &[PythonVersion]) -> Vec<Interpreter> {
        pythons
            .iter()
            .map(|&version| Interpreter {
                version,
                tags: self.tags_for(version),
            })
            .collect()
    }
}

/// CPython tags followed by the generic compatible tags, in priority order.
pub fn supported_tags(python: PythonVersion, platforms: &[String]) -> Vec<Tag> {
    let mut tags = cpython_tags(python, platforms);
    tags.extend(compatible_tags(python, platforms));
    tags
}

fn cpython_tags(python: PythonVersion, platforms: &[String]) -> Vec<Tag> {
    let interpreter = python.cp_tag();
    let mut tags = Vec::new();
    for abi in [interpreter.as_str(), "abi3", "none"] {
        for platform in platforms {
            tags.push(Tag::new(&interpreter, abi, platform));
        }
    }
    // abi3 was introduced in 3.2; older minors that are still >= 3.2 are
    // compatible with this interpreter.
    if python.major == 3 {
        for minor in (2..python.minor).rev() {
            let older = PythonVersion::new(3, minor).cp_tag();
            for platform in platforms {
                tags.push(Tag::new(&older, "abi3", platform));
            }
        }
    }
    tags
}

fn py_interpreters(python: PythonVersion) -> Vec<String> {
    let mut out = vec![
        format!("py{}{}", python.major, python.minor),
        format!("py{}", python.major),
    ];
    for minor in (0..python.minor).rev() {
        out.push(format!("py{}{minor}", python.major));
    }
    out
}

fn compatible_tags(python: PythonVersion, platforms: &[String]) -> Vec<Tag> {
    let interpreters = py_interpreters(python);
    let mut tags = Vec::new();
    for interpreter in &interpreters {
        for platform in platforms {
            tags.push(Tag::new(interpreter, "none", platform));
        }
    }
    tags.push(Tag::new(&python.cp_tag(), "none", "any"));
    for interpreter in &interpreters {
        tags.push(Tag::new(interpreter, "none", "any"));
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostOs, Libc};

    fn linux_universe() -> TagUniverse {
        TagUniverse::for_host(&Host::new(
            HostOs::Linux {
                libc: Libc::Glibc {
                    major: 2,
                    minor: 28,
                },
            },
            "x86_64",
        ))
    }

    #[test]
    fn test_linux_generic_platform_is_never_included() {
        for machine in ["x86_64", "aarch64"] {
            let universe = TagUniverse::for_host(&Host::new(
                HostOs::Linux {
                    libc: Libc::Glibc {
                        major: 2,
                        minor: 31,
                    },
                },
                machine,
            ));
            let tags = universe.tags_for(PythonVersion::new(3, 12));
            let generic = format!("linux_{machine}");
            assert!(!tags.is_empty());
            assert!(tags.iter().all(|t| t.platform != generic));
        }
    }

    #[test]
    fn test_cpython_and_abi3_tags() {
        let tags = linux_universe().tags_for(PythonVersion::new(3, 11));
        assert!(tags.contains(&Tag::new("cp311", "cp311", "manylinux_2_17_x86_64")));
        assert!(tags.contains(&Tag::new("cp311", "abi3", "manylinux2014_x86_64")));
        assert!(tags.contains(&Tag::new("cp39", "abi3", "manylinux_2_28_x86_64")));
        assert!(tags.contains(&Tag::new("cp32", "abi3", "manylinux1_x86_64")));
        assert!(!tags.contains(&Tag::new("cp312", "abi3", "manylinux_2_17_x86_64")));
        assert!(!tags.contains(&Tag::new("cp310", "cp310", "manylinux_2_17_x86_64")));
    }

    #[test]
    fn test_compatible_tags() {
        let tags = linux_universe().tags_for(PythonVersion::new(3, 11));
        assert!(tags.contains(&Tag::new("py3", "none", "any")));
        assert!(tags.contains(&Tag::new("py311", "none", "any")));
        assert!(tags.contains(&Tag::new("py30", "none", "any")));
        assert!(tags.contains(&Tag::new("cp311", "none", "any")));
        assert!(tags.contains(&Tag::new("py3", "none", "manylinux_2_17_x86_64")));
        assert!(!tags.contains(&Tag::new("py2", "none", "any")));
    }

    #[test]
    fn test_wheel_matching() {
        let tags = linux_universe().tags_for(PythonVersion::new(3, 12));
        let good = TagSet::parse("cp312-cp312-manylinux_2_17_x86_64.manylinux2014_x86_64").unwrap();
        let newer_glibc = TagSet::parse("cp312-cp312-manylinux_2_34_x86_64").unwrap();
        let generic = TagSet::parse("cp312-cp312-linux_x86_64").unwrap();
        assert!(tags.intersects(&good));
        assert!(!tags.intersects(&newer_glibc));
        assert!(!tags.intersects(&generic));
    }

    #[test]
    fn test_interpreters_keep_order() {
        let pythons = [PythonVersion::new(3, 13), PythonVersion::new(3, 11)];
        let interpreters = linux_universe().interpreters(&pythons);
        assert_eq!(interpreters.len(), 2);
        assert_eq!(interpreters[0].version, PythonVersion::new(3, 13));
        assert!(interpreters[1].tags.contains(&Tag::new("cp311", "cp311", "manylinux_2_28_x86_64")));
    }
}
