//! ArchIntrospector: does a wheel really contain the CPU architectures its
//! filename claims?
//!
//! Public wheels are occasionally tagged for one architecture but ship a
//! shared library compiled for another. We decode the claim from the
//! platform tag, extract every native member, ask the host's introspection
//! tool what each one targets, and compare.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;
use wheelhouse_schema::Arch;
use zip::ZipArchive;

use crate::error::{ConfigError, Result, VerifyError};
use crate::platform::Platform;

/// `<pkg>.data/scripts/<name>` directly under the wheel root.
static DATA_SCRIPTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^/]+\.data/scripts/[^/]+$").expect("static regex")
});

/// One native member whose observed architectures do not cover the claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchMismatch {
    /// Archive member path.
    pub member: String,
    /// Architectures decoded from the filename.
    pub expected: BTreeSet<Arch>,
    /// Architectures the introspection tool reported.
    pub received: BTreeSet<Arch>,
}

fn joined(archs: &BTreeSet<Arch>) -> String {
    let mut names: Vec<&str> = archs.iter().map(Arch::as_str).collect();
    names.sort_unstable();
    names.join(", ")
}

impl std::fmt::Display for ArchMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "-> {} has mismatched architectures", self.member)?;
        writeln!(f, "---> expected {}", joined(&self.expected))?;
        write!(f, "---> received {}", joined(&self.received))
    }
}

/// Decode the architectures claimed by a wheel filename's platform tag.
///
/// `any` claims nothing, `*_universal2` claims `x86_64` and `arm64`,
/// `*_intel` claims `x86_64`, and everything else must end in a known
/// architecture. Dotted platform tags union their parts.
///
/// # Errors
///
/// [`ConfigError::UnexpectedPlatform`] for a platform tag that names no
/// known architecture.
pub fn expected_archs(filename: &str) -> Result<BTreeSet<Arch>> {
    let basename = Path::new(filename)
        .file_name()
        .map_or(filename.into(), |n| n.to_string_lossy());
    let stem = basename.strip_suffix(".whl").unwrap_or(&basename);
    let platforms = stem.rsplit('-').next().unwrap_or_default();

    let mut archs = BTreeSet::new();
    for plat in platforms.split('.') {
        if plat == "any" {
            continue;
        } else if plat.ends_with("_intel") {
            archs.insert(Arch::X86_64);
        } else if plat.ends_with("_universal2") {
            archs.insert(Arch::X86_64);
            archs.insert(Arch::Arm64);
        } else if plat.ends_with("_aarch64") {
            archs.insert(Arch::Aarch64);
        } else if plat.ends_with("_arm64") {
            archs.insert(Arch::Arm64);
        } else if plat.ends_with("_x86_64") {
            archs.insert(Arch::X86_64);
        } else {
            return Err(ConfigError::UnexpectedPlatform(plat.to_string()).into());
        }
    }
    Ok(archs)
}

/// Members that carry native code: shared libraries, plus data scripts
/// without a shebang (compiled launchers). Test directories are ignored.
///
/// # Errors
///
/// Fails if the archive cannot be read.
pub fn native_members<R: io::Read + io::Seek>(archive: &mut ZipArchive<R>) -> Result<Vec<String>> {
    let mut members = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        if name.contains("/tests/") {
            continue;
        }
        if name.ends_with(".so") || name.ends_with(".dylib") || name.contains(".so.") {
            members.push(name);
        } else if DATA_SCRIPTS.is_match(&name) && !name.ends_with(".py") {
            let mut head = Vec::with_capacity(2);
            entry.by_ref().take(2).read_to_end(&mut head)?;
            if head != b"#!" {
                members.push(name);
            }
        }
    }
    Ok(members)
}

/// Check every native member of `wheel` against the filename's claim.
///
/// Returns the first mismatch instead of failing so callers decide whether
/// it is a skip (acquisition) or fatal (final gate).
///
/// # Errors
///
/// Archive, extraction and introspection-tool failures, and native members
/// whose path would land outside the extraction directory.
pub fn verify(wheel: &Path, platform: &dyn Platform) -> Result<Option<ArchMismatch>> {
    let filename = wheel.file_name().map_or_else(String::new, |n| n.to_string_lossy().into_owned());
    let expected = expected_archs(&filename)?;

    let mut archive = ZipArchive::new(File::open(wheel)?)?;
    let members = native_members(&mut archive)?;
    if members.is_empty() {
        return Ok(None);
    }

    let scratch = tempfile::tempdir()?;
    for member in &members {
        let mut entry = archive.by_name(member)?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(VerifyError::UnsafeMember {
                filename,
                member: member.clone(),
            }
            .into());
        };
        let target = scratch.path().join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        io::copy(&mut entry, &mut File::create(&target)?)?;

        let received = platform.get_archs(&target)?;
        debug!(%member, expected = %joined(&expected), received = %joined(&received), "arch check");
        if !expected.is_subset(&received) {
            return Ok(Some(ArchMismatch {
                member: member.clone(),
                expected,
                received,
            }));
        }
    }
    Ok(None)
}
