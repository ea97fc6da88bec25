//! Acquirer: take a wheel from the public index when one is usable.
//!
//! Strategies are tried in order and the first candidate that passes the
//! architecture check wins. A rejected candidate is never retried.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use wheelhouse_schema::{PythonVersion, WheelFilename};

use crate::arch;
use crate::error::{BuildError, Result};
use crate::manifest::ManifestEntry;
use crate::platform::Platform;
pub use crate::python::DownloadTarget;
use crate::python::PythonTools;
use crate::reporter::Reporter;

/// Download strategies, most specific first.
pub const STRATEGIES: [DownloadTarget; 2] = [DownloadTarget::Native, DownloadTarget::AnyPlatform];

/// The only regular file in `dir`.
///
/// # Errors
///
/// [`BuildError::UnexpectedOutput`] when `dir` holds zero or several files.
pub(crate) fn single_file(dir: &Path, what: &'static str) -> Result<PathBuf> {
    let mut found: Vec<PathBuf> = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    found.retain(|p| p.is_file());
    found.sort();
    if found.len() != 1 {
        return Err(BuildError::UnexpectedOutput {
            what,
            dir: dir.to_path_buf(),
            found: found
                .iter()
                .filter_map(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .collect(),
        }
        .into());
    }
    Ok(found.remove(0))
}

/// Borrowed collaborators for one acquisition.
#[derive(Clone, Copy)]
pub struct Acquirer<'a> {
    platform: &'a dyn Platform,
    tools: &'a dyn PythonTools,
    reporter: &'a dyn Reporter,
}

impl std::fmt::Debug for Acquirer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acquirer")
            .field("platform", &self.platform.name())
            .finish_non_exhaustive()
    }
}

impl<'a> Acquirer<'a> {
    /// Wire up the collaborators.
    pub fn new(platform: &'a dyn Platform, tools: &'a dyn PythonTools, reporter: &'a dyn Reporter) -> Self {
        Self {
            platform,
            tools,
            reporter,
        }
    }

    /// Try each strategy for `entry` on `python`, copying the accepted wheel
    /// into `dest`.
    ///
    /// Returns `None` when no strategy produced an acceptable wheel and the
    /// caller should build from source.
    ///
    /// # Errors
    ///
    /// Tool, archive and filesystem failures. Architecture rejections are
    /// not errors.
    pub fn acquire(&self, entry: &ManifestEntry, python: PythonVersion, dest: &Path) -> Result<Option<WheelFilename>> {
        let mut rejected = false;
        for target in STRATEGIES {
            let scratch = tempfile::tempdir()?;
            if !self.tools.download_wheel(entry, python, scratch.path(), target)? {
                continue;
            }
            let path = single_file(scratch.path(), "downloaded wheel")?;
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            if entry.ignore_wheels.iter().any(|w| *w == filename) {
                self.reporter.ignored(&filename, "listed in ignore_wheels");
                rejected = true;
                continue;
            }
            let wheel = WheelFilename::parse(&filename)?;
            if let Some(mismatch) = arch::verify(&path, self.platform)? {
                info!(%filename, %mismatch, "rejected download");
                self.reporter.ignored(&filename, &mismatch.to_string());
                rejected = true;
                continue;
            }

            if rejected && target == DownloadTarget::AnyPlatform {
                warn!(package = %entry.requirement(), %python, %filename, "falling back to platform-agnostic wheel after rejecting a binary wheel");
                self.reporter.warning(&format!(
                    "{}: accepted {filename} after rejecting the binary wheel",
                    entry.requirement()
                ));
            }
            fs::copy(&path, dest.join(&filename))?;
            return Ok(Some(wheel));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(single_file(dir.path(), "wheel").is_err());

        fs::write(dir.path().join("a-1.0-py3-none-any.whl"), b"").unwrap();
        fs::create_dir(dir.path().join("build")).unwrap();
        let only = single_file(dir.path(), "wheel").unwrap();
        assert_eq!(only.file_name().unwrap(), "a-1.0-py3-none-any.whl");

        fs::write(dir.path().join("b-1.0-py3-none-any.whl"), b"").unwrap();
        let err = single_file(dir.path(), "wheel").unwrap_err().to_string();
        assert!(err.contains("a-1.0-py3-none-any.whl"));
        assert!(err.contains("b-1.0-py3-none-any.whl"));
    }

    #[test]
    fn test_strategy_order() {
        assert_eq!(STRATEGIES[0], DownloadTarget::Native);
        assert_eq!(STRATEGIES[1], DownloadTarget::AnyPlatform);
    }
}
