//! Verifier: the last gate before an artifact is published.
//!
//! Every interpreter a wheel claims to support gets a throwaway virtualenv;
//! the wheel must install there from the internal index and every top-level
//! module it ships must import.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};
use wheelhouse_schema::{PythonVersion, SpecifierSet, TagSet, WheelFilename};
use zip::ZipArchive;

use crate::arch;
use crate::error::{ConfigError, Result, VerifyError};
use crate::manifest::{Manifest, ManifestEntry};
use crate::platform::Platform;
use crate::python::PythonTools;
use crate::reporter::Reporter;

static DIST_INFO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^/]+\.dist-info/[^/]+$").expect("static regex"));

const INSTALL_HINT: &str = "see validate_incorrect_missing_deps / validate_extras";
const IMPORT_HINT: &str = "add it to validate_skip_imports";

/// Interpreters that must be able to install a wheel with `tags`.
///
/// An exact CPython tag needs that interpreter, a CPython `abi3` tag needs
/// every supported interpreter at or above its floor, `py3` needs every
/// supported interpreter and `py2` needs none. The union is then narrowed
/// to `constraint`.
///
/// # Errors
///
/// [`ConfigError::UnexpectedTag`] for any other interpreter tag, and
/// [`ConfigError::NoInterpreters`] when nothing is left to check.
pub fn pythons_to_check(
    tags: &TagSet,
    supported: &[PythonVersion],
    constraint: &SpecifierSet,
) -> Result<Vec<PythonVersion>> {
    let mut pythons = BTreeSet::new();
    for tag in tags.iter() {
        let interpreter = tag.interpreter.as_str();
        if interpreter.starts_with("cp") {
            let version = PythonVersion::from_cp_tag(interpreter).ok_or_else(|| ConfigError::UnexpectedTag {
                tag: tag.to_string(),
            })?;
            if tag.abi == "abi3" {
                pythons.extend(supported.iter().copied().filter(|py| *py >= version));
            } else {
                pythons.insert(version);
            }
        } else if interpreter == "py2" {
            continue;
        } else if interpreter == "py3" {
            pythons.extend(supported.iter().copied());
        } else {
            return Err(ConfigError::UnexpectedTag { tag: tag.to_string() }.into());
        }
    }

    pythons.retain(|py| constraint.contains_python(*py));
    if pythons.is_empty() {
        return Err(ConfigError::NoInterpreters { tags: tags.clone() }.into());
    }
    Ok(pythons.into_iter().collect())
}

/// Parse `RECORD` contents into top-level importable names.
pub fn parse_record(record: &str) -> Vec<String> {
    let mut modules: Vec<String> = Vec::new();
    for line in record.lines() {
        let path = line.split(',').next().unwrap_or_default();
        let module = if let Some(pkg) = path.strip_suffix("/__init__.py") {
            pkg.split('/').next()
        } else if !path.contains('/') && (path.ends_with(".so") || path.ends_with(".py")) {
            path.split('.').next()
        } else {
            None
        };
        if let Some(module) = module.filter(|m| !m.is_empty()) {
            if !modules.iter().any(|m| m == module) {
                modules.push(module.to_string());
            }
        }
    }
    modules
}

/// Top-level modules a wheel installs, in `RECORD` order.
///
/// # Errors
///
/// [`VerifyError::MissingRecord`] when the wheel has no `RECORD`, and
/// archive failures.
pub fn top_imports(wheel: &Path) -> Result<Vec<String>> {
    let mut archive = ZipArchive::new(File::open(wheel)?)?;
    let record = archive
        .file_names()
        .find(|n| DIST_INFO.is_match(n) && n.ends_with("/RECORD"))
        .map(str::to_string);
    let Some(record) = record else {
        let filename = wheel.file_name().map(|n| n.to_string_lossy().into_owned());
        return Err(VerifyError::MissingRecord(filename.unwrap_or_default()).into());
    };

    let mut contents = String::new();
    archive.by_name(&record)?.read_to_string(&mut contents)?;
    Ok(parse_record(&contents))
}

/// Post-build and post-download artifact checks.
pub struct Verifier<'a> {
    platform: &'a dyn Platform,
    tools: &'a dyn PythonTools,
    reporter: &'a dyn Reporter,
    index_url: String,
    supported: Vec<PythonVersion>,
}

impl std::fmt::Debug for Verifier<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Verifier")
            .field("platform", &self.platform.name())
            .field("index_url", &self.index_url)
            .field("supported", &self.supported)
            .finish_non_exhaustive()
    }
}

impl<'a> Verifier<'a> {
    /// Installs resolve dependencies from `index_url`; `supported` bounds
    /// what `abi3` and `py3` wheels are checked against.
    pub fn new(
        platform: &'a dyn Platform,
        tools: &'a dyn PythonTools,
        reporter: &'a dyn Reporter,
        index_url: &str,
        supported: &[PythonVersion],
    ) -> Self {
        Self {
            platform,
            tools,
            reporter,
            index_url: index_url.to_string(),
            supported: supported.to_vec(),
        }
    }

    /// Install `wheel` into a fresh environment for `python` and import
    /// every top-level module it ships.
    ///
    /// # Errors
    ///
    /// [`VerifyError::InstallFailed`] and [`VerifyError::ImportFailed`] carry
    /// the manifest key that would work around the failure.
    pub fn validate(&self, python: PythonVersion, wheel: &Path, entry: &ManifestEntry) -> Result<()> {
        let filename = wheel
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.reporter.validating(&filename, python);

        let scratch = tempfile::tempdir()?;
        let venv = scratch.path().join("venv");
        self.tools.create_env(python, &venv)?;

        let wheel = std::path::absolute(wheel)?;
        let find_links = wheel.parent().map_or_else(PathBuf::new, Path::to_path_buf);
        let target = match &entry.validate.extras {
            Some(extras) => format!("{}[{extras}]", wheel.display()),
            None => wheel.display().to_string(),
        };
        let mut requirements = vec![target];
        requirements.extend(entry.validate.incorrect_missing_deps.iter().cloned());

        debug!(%python, ?requirements, "installing");
        self.tools
            .install(&venv, &requirements, &self.index_url, &find_links)
            .map_err(|e| VerifyError::InstallFailed {
                filename: filename.clone(),
                python,
                hint: INSTALL_HINT,
                source: Box::new(e),
            })?;

        for module in top_imports(&wheel)? {
            if entry.validate.skip_imports.contains(&module) {
                debug!(%module, "skipping import");
                continue;
            }
            self.tools.import(&venv, &module).map_err(|e| VerifyError::ImportFailed {
                filename: filename.clone(),
                module: module.clone(),
                python,
                hint: IMPORT_HINT,
                source: Box::new(e),
            })?;
        }
        Ok(())
    }

    /// Full gate for one artifact: architecture check, then
    /// [`validate`](Self::validate) on every interpreter it claims.
    ///
    /// # Errors
    ///
    /// Any verification failure, or a configuration error when the wheel's
    /// tags leave no interpreter to check.
    pub fn verify_artifact(&self, wheel: &Path, entry: &ManifestEntry) -> Result<()> {
        let filename = wheel
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let parsed = WheelFilename::parse(&filename)?;

        if let Some(mismatch) = arch::verify(wheel, self.platform)? {
            return Err(VerifyError::ArchMismatch { filename, mismatch }.into());
        }
        for python in pythons_to_check(&parsed.tags, &self.supported, &entry.python_versions)? {
            self.validate(python, wheel, entry)?;
        }
        info!(%filename, "verified");
        Ok(())
    }

    /// Verify every wheel directly inside `dist` against its manifest
    /// entry, in filename order.
    ///
    /// Returns the number of wheels checked.
    ///
    /// # Errors
    ///
    /// [`ConfigError::MissingEntry`] for a wheel the manifest does not
    /// list, and the first verification failure.
    pub fn verify_dist(&self, dist: &Path, manifest: &Manifest) -> Result<usize> {
        let mut wheels: Vec<PathBuf> = fs::read_dir(dist)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<_>>()?;
        wheels.retain(|p| p.extension().is_some_and(|e| e == "whl"));
        wheels.sort();

        for path in &wheels {
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let wheel = WheelFilename::parse(&filename)?;
            let entry = manifest.get(&wheel.name, &wheel.version).ok_or_else(|| ConfigError::MissingEntry {
                filename: filename.clone(),
                name: wheel.name.to_string(),
                version: wheel.version.to_string(),
            })?;
            self.verify_artifact(path, entry)?;
        }
        Ok(wheels.len())
    }
}
