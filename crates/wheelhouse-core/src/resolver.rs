//! Resolver: walk the manifest × interpreter matrix and make sure every
//! pair has a wheel.
//!
//! Per pair the states are
//!
//! ```text
//! Unresolved -> Satisfied
//!            -> Downloading -> Produced
//!                           -> Rejected -> Building -> Produced | Fatal
//! ```
//!
//! Produced wheels are verified only once the whole matrix is done, so a
//! wheel can install dependencies produced later in manifest order. The
//! first fatal error stops the run.

use std::fs;
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info};
use wheelhouse_schema::{ProjectName, PythonVersion, Version, WheelFilename};

use crate::acquire::Acquirer;
use crate::availability::{AvailabilityIndex, Source};
use crate::builder::Builder;
use crate::error::{BuildError, Result};
use crate::manifest::{Manifest, ManifestEntry};
use crate::platform::{Platform, Setup, SetupContext};
use crate::python::PythonTools;
use crate::reporter::Reporter;
use crate::tags::{Interpreter, TagUniverse};
use crate::verify::Verifier;

/// How a pair ended up satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildResult {
    /// An existing wheel, published or produced earlier in the run, covers it.
    AlreadySatisfied,
    /// A public wheel was accepted unmodified.
    Downloaded(WheelFilename),
    /// The wheel was compiled from source.
    Built(WheelFilename),
}

impl BuildResult {
    /// The wheel this pair produced, if any.
    pub fn wheel(&self) -> Option<&WheelFilename> {
        match self {
            Self::AlreadySatisfied => None,
            Self::Downloaded(w) | Self::Built(w) => Some(w),
        }
    }
}

/// One resolved pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairOutcome {
    /// Package name.
    pub name: ProjectName,
    /// Pinned version.
    pub version: Version,
    /// Interpreter the pair was resolved for.
    pub python: PythonVersion,
    /// What happened.
    pub result: BuildResult,
}

/// Everything a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Pairs in processing order. Pairs outside an entry's
    /// `python_versions` are not listed.
    pub outcomes: Vec<PairOutcome>,
    /// The platform carried out the run elsewhere; `outcomes` is empty.
    pub delegated: bool,
}

impl RunReport {
    /// Wheels written to the output directory, in order.
    pub fn produced(&self) -> impl Iterator<Item = &WheelFilename> {
        self.outcomes.iter().filter_map(|o| o.result.wheel())
    }

    /// Number of pairs satisfied by a download.
    pub fn downloaded_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.result, BuildResult::Downloaded(_)))
            .count()
    }

    /// Number of pairs satisfied by a source build.
    pub fn built_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.result, BuildResult::Built(_)))
            .count()
    }

    /// Number of pairs that needed nothing.
    pub fn satisfied_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.result == BuildResult::AlreadySatisfied)
            .count()
    }
}

/// Drives acquisition, building and verification for a manifest.
pub struct Resolver<'a> {
    platform: &'a dyn Platform,
    tools: &'a dyn PythonTools,
    reporter: &'a dyn Reporter,
    universe: TagUniverse,
    pythons: Vec<PythonVersion>,
    index_url: String,
    validate: bool,
}

impl std::fmt::Debug for Resolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("platform", &self.platform.name())
            .field("pythons", &self.pythons)
            .field("index_url", &self.index_url)
            .field("validate", &self.validate)
            .finish_non_exhaustive()
    }
}

impl<'a> Resolver<'a> {
    /// `index_url` is the internal simple index; builds and verification
    /// resolve their dependencies from it.
    pub fn new(
        platform: &'a dyn Platform,
        tools: &'a dyn PythonTools,
        reporter: &'a dyn Reporter,
        universe: TagUniverse,
        pythons: &[PythonVersion],
        index_url: &str,
    ) -> Self {
        Self {
            platform,
            tools,
            reporter,
            universe,
            pythons: pythons.to_vec(),
            index_url: index_url.to_string(),
            validate: true,
        }
    }

    /// Turn the end-of-run verification gate on or off.
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Resolve one pair, writing any new wheel into `dest` and recording it
    /// in `index`.
    ///
    /// Returns `None` when the interpreter is outside the entry's
    /// `python_versions`.
    ///
    /// # Errors
    ///
    /// Acquisition and build failures.
    pub fn resolve_pair(
        &self,
        entry: &ManifestEntry,
        interpreter: &Interpreter,
        index: &mut AvailabilityIndex,
        dest: &Path,
    ) -> Result<Option<BuildResult>> {
        let python = interpreter.version;
        let source = index.satisfied_by(&entry.name, &entry.version, &interpreter.tags);
        if source == Some(Source::Published) {
            self.reporter.skipped(&entry.name, &entry.version, python);
            return Ok(Some(BuildResult::AlreadySatisfied));
        }
        if !entry.python_versions.contains_python(python) {
            debug!(package = %entry.requirement(), %python, constraint = %entry.python_versions, "interpreter excluded");
            return Ok(None);
        }

        self.reporter.pair(&entry.name, &entry.version, python);
        if source == Some(Source::Produced) {
            self.reporter.just_built();
            return Ok(Some(BuildResult::AlreadySatisfied));
        }

        self.reporter.building();
        let acquirer = Acquirer::new(self.platform, self.tools, self.reporter);
        let result = match acquirer.acquire(entry, python, dest)? {
            Some(wheel) => {
                self.reporter.downloaded(&wheel.filename);
                BuildResult::Downloaded(wheel)
            }
            None => {
                let wheel = Builder::new(self.platform, self.tools).build(entry, python, &self.index_url, dest)?;
                self.reporter.built(&wheel.filename);
                BuildResult::Built(wheel)
            }
        };

        if let Some(wheel) = result.wheel() {
            index.record(wheel);
        }
        Ok(Some(result))
    }

    /// Resolve every pair of `manifest`, in manifest order then interpreter
    /// order, then verify every wheel the run produced.
    ///
    /// # Errors
    ///
    /// The first failing pair, wrapped with its package and interpreter,
    /// or the first wheel that fails verification.
    pub fn run(
        &self,
        manifest: &Manifest,
        index: &mut AvailabilityIndex,
        dest: &Path,
        ctx: &SetupContext,
    ) -> Result<RunReport> {
        let start = Instant::now();
        fs::create_dir_all(dest)?;

        if self.platform.setup_dependencies(ctx)? == Setup::Delegated {
            info!(platform = self.platform.name(), "run delegated");
            return Ok(RunReport {
                outcomes: Vec::new(),
                delegated: true,
            });
        }

        let interpreters = self.universe.interpreters(&self.pythons);
        let mut report = RunReport::default();
        let mut produced = Vec::new();
        for entry in manifest.entries() {
            for interpreter in &interpreters {
                let outcome = self
                    .resolve_pair(entry, interpreter, index, dest)
                    .map_err(|e| BuildError::Pair {
                        package: entry.requirement(),
                        python: interpreter.version,
                        source: Box::new(e),
                    })?;
                if let Some(result) = outcome {
                    if let Some(wheel) = result.wheel() {
                        produced.push((entry, dest.join(&wheel.filename)));
                    }
                    report.outcomes.push(PairOutcome {
                        name: entry.name.clone(),
                        version: entry.version.clone(),
                        python: interpreter.version,
                        result,
                    });
                }
            }
        }

        self.reporter
            .summary(produced.len(), "produced", start.elapsed().as_secs_f64());

        if self.validate {
            let start = Instant::now();
            let verifier = Verifier::new(self.platform, self.tools, self.reporter, &self.index_url, &self.pythons);
            for (entry, wheel) in &produced {
                verifier.verify_artifact(wheel, entry)?;
            }
            self.reporter
                .summary(produced.len(), "validated", start.elapsed().as_secs_f64());
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(result: BuildResult) -> PairOutcome {
        PairOutcome {
            name: ProjectName::new("foo"),
            version: Version::parse("1.0").unwrap(),
            python: PythonVersion::new(3, 12),
            result,
        }
    }

    #[test]
    fn test_report_counts() {
        let wheel = |s: &str| WheelFilename::parse(s).unwrap();
        let report = RunReport {
            outcomes: vec![
                outcome(BuildResult::AlreadySatisfied),
                outcome(BuildResult::Downloaded(wheel("foo-1.0-py3-none-any.whl"))),
                outcome(BuildResult::Built(wheel("foo-1.0-cp312-cp312-manylinux_2_17_x86_64.whl"))),
                outcome(BuildResult::AlreadySatisfied),
            ],
            delegated: false,
        };
        assert_eq!(report.satisfied_count(), 2);
        assert_eq!(report.downloaded_count(), 1);
        assert_eq!(report.built_count(), 1);
        let produced: Vec<&str> = report.produced().map(|w| w.filename.as_str()).collect();
        assert_eq!(
            produced,
            vec![
                "foo-1.0-py3-none-any.whl",
                "foo-1.0-cp312-cp312-manylinux_2_17_x86_64.whl"
            ]
        );
    }

    #[test]
    fn test_build_result_wheel() {
        assert!(BuildResult::AlreadySatisfied.wheel().is_none());
    }
}
