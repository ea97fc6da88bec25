//! Builder: compile a wheel from the source distribution.
//!
//! Runs when no public wheel was acceptable. System dependencies and the
//! optional prebuild prefix are held for the whole pipeline and torn down
//! afterwards whether it succeeded or not.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::{debug, info};
use wheelhouse_schema::{PythonVersion, WheelFilename};
use zip::ZipArchive;

use crate::acquire::single_file;
use crate::env::BuildEnv;
use crate::error::{BuildError, Result};
use crate::manifest::ManifestEntry;
use crate::platform::Platform;
use crate::prebuild;
use crate::python::PythonTools;

/// Source extensions that only make sense with a compiler.
const BINARY_EXTS: &[&str] = &[".c", ".cc", ".cpp", ".cxx", ".pxd", ".pxi", ".pyx", ".go", ".rs"];

/// Member names and concatenated `setup.py` contents of an sdist.
fn sdist_contents(sdist: &Path) -> Result<(Vec<String>, Vec<u8>)> {
    let name = sdist
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut names = Vec::new();
    let mut setup_py = Vec::new();

    if name.ends_with(".zip") {
        let mut archive = ZipArchive::new(File::open(sdist)?)?;
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            let member = entry.name().to_string();
            if member.ends_with("/setup.py") {
                entry.read_to_end(&mut setup_py)?;
            }
            names.push(member);
        }
        return Ok((names, setup_py));
    }

    let reader: Box<dyn Read> = if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Box::new(GzDecoder::new(File::open(sdist)?))
    } else if name.ends_with(".tar") {
        Box::new(File::open(sdist)?)
    } else {
        return Err(BuildError::UnsupportedSdist(name).into());
    };
    let mut archive = tar::Archive::new(reader);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let member = entry.path()?.to_string_lossy().into_owned();
        if member.ends_with("/setup.py") {
            entry.read_to_end(&mut setup_py)?;
        }
        names.push(member);
    }
    Ok((names, setup_py))
}

/// Why `sdist` should produce a native extension, if it should.
///
/// Members under test directories and members listed in `ignore` do not
/// count. Compiled-language sources take precedence over a `cffi_modules`
/// marker in `setup.py`.
///
/// # Errors
///
/// Unreadable or unsupported archives.
pub fn likely_binary(sdist: &Path, ignore: &[String]) -> Result<Option<String>> {
    let (names, setup_py) = sdist_contents(sdist)?;

    let mut exts = BTreeSet::new();
    for name in &names {
        if name.contains("/test/") || name.contains("/tests/") {
            continue;
        }
        if ignore.iter().any(|i| i == name) {
            continue;
        }
        let Some(ext) = Path::new(name).extension() else {
            continue;
        };
        let ext = format!(".{}", ext.to_string_lossy());
        if BINARY_EXTS.contains(&ext.as_str()) {
            exts.insert(ext);
        }
    }

    if !exts.is_empty() {
        let exts: Vec<String> = exts.into_iter().collect();
        return Ok(Some(format!(
            "sdist contains files with these extensions: {}",
            exts.join(", ")
        )));
    }
    if setup_py.windows(b"cffi_modules".len()).any(|w| w == b"cffi_modules") {
        return Ok(Some("sdist setup.py has `cffi_modules`".to_string()));
    }
    Ok(None)
}

/// Whether `wheel` contains a compiled extension.
///
/// # Errors
///
/// Unreadable archives.
pub fn produced_binary(wheel: &Path) -> Result<bool> {
    let archive = ZipArchive::new(File::open(wheel)?)?;
    Ok(archive.file_names().any(|n| n.ends_with(".so")))
}

/// Source builds for one host.
#[derive(Clone, Copy)]
pub struct Builder<'a> {
    platform: &'a dyn Platform,
    tools: &'a dyn PythonTools,
}

impl std::fmt::Debug for Builder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("platform", &self.platform.name())
            .finish_non_exhaustive()
    }
}

impl<'a> Builder<'a> {
    /// Wire up the collaborators.
    pub fn new(platform: &'a dyn Platform, tools: &'a dyn PythonTools) -> Self {
        Self { platform, tools }
    }

    /// Build `entry` for `python`, resolving build requirements from
    /// `index_url`, and copy the final wheel into `dest`.
    ///
    /// # Errors
    ///
    /// Every failure is fatal for the run: dependency installs, tool
    /// failures, an expected native extension that never appeared, and
    /// output directories not holding exactly one wheel.
    pub fn build(
        &self,
        entry: &ManifestEntry,
        python: PythonVersion,
        index_url: &str,
        dest: &Path,
    ) -> Result<WheelFilename> {
        let scratch = tempfile::tempdir()?;
        let mut env = BuildEnv::new();

        let mut deps = self.platform.install(entry, &mut env)?;
        let built = {
            let env = prebuild::enter(entry, scratch.path(), &mut deps)?;
            self.compile(entry, python, index_url, scratch.path(), &env)?
        };
        deps.finish()?;

        let filename = built
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let wheel = WheelFilename::parse(&filename)?;
        fs::copy(&built, dest.join(&filename))?;
        Ok(wheel)
    }

    /// Download, compile, check and repair inside `scratch`, returning the
    /// path of the final wheel.
    fn compile(
        &self,
        entry: &ManifestEntry,
        python: PythonVersion,
        index_url: &str,
        scratch: &Path,
        env: &BuildEnv,
    ) -> Result<PathBuf> {
        let sdist_dir = scratch.join("sdist");
        let wheel_dir = scratch.join("wheel");
        let repair_dir = scratch.join("repair");
        for dir in [&sdist_dir, &wheel_dir, &repair_dir] {
            fs::create_dir_all(dir)?;
        }

        self.tools.download_sdist(entry, python, &sdist_dir, env)?;
        let sdist = single_file(&sdist_dir, "sdist")?;
        info!(package = %entry.requirement(), %python, sdist = %sdist.display(), "building from source");

        self.tools.build_wheel(python, &sdist, index_url, &wheel_dir, env)?;
        let built = single_file(&wheel_dir, "built wheel")?;

        if let Some(reason) = likely_binary(&sdist, &entry.likely_binary_ignore)? {
            debug!(%reason, "expecting a native extension");
            if !produced_binary(&built)? {
                return Err(BuildError::ExpectedBinary {
                    package: entry.requirement(),
                    reason,
                }
                .into());
            }
        }

        let name = built
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if WheelFilename::parse(&name)?.is_purelib() {
            return Ok(built);
        }
        self.platform.repair_wheel(&built, &repair_dir)?;
        single_file(&repair_dir, "repaired wheel")
    }
}
