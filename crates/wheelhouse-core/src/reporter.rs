//! Reporter trait for dependency injection
//!
//! The resolver and verifier stream per-pair progress through this trait so
//! the engine is not coupled to a particular console layout.

use wheelhouse_schema::{ProjectName, PythonVersion, Version};

/// Progress sink for a mirror run.
pub trait Reporter: Send + Sync {
    /// A `(package, interpreter)` pair is about to be processed.
    fn pair(&self, name: &ProjectName, version: &Version, python: PythonVersion);

    /// The pair was already satisfied by the published index.
    fn skipped(&self, name: &ProjectName, version: &Version, python: PythonVersion);

    /// The pair is covered by an artifact produced earlier in this run.
    fn just_built(&self);

    /// Acquisition is starting for the current pair.
    fn building(&self);

    /// A wheel was downloaded and accepted.
    fn downloaded(&self, filename: &str);

    /// A wheel was compiled and accepted.
    fn built(&self, filename: &str);

    /// A downloaded candidate was discarded.
    fn ignored(&self, filename: &str, reason: &str);

    /// A produced artifact is being checked on `python`.
    fn validating(&self, filename: &str, python: PythonVersion);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);

    /// Display a final summary of the run.
    fn summary(&self, count: usize, action: &str, elapsed_secs: f64);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn pair(&self, name: &ProjectName, version: &Version, python: PythonVersion) {
        (**self).pair(name, version, python)
    }
    fn skipped(&self, name: &ProjectName, version: &Version, python: PythonVersion) {
        (**self).skipped(name, version, python)
    }
    fn just_built(&self) {
        (**self).just_built()
    }
    fn building(&self) {
        (**self).building()
    }
    fn downloaded(&self, filename: &str) {
        (**self).downloaded(filename)
    }
    fn built(&self, filename: &str) {
        (**self).built(filename)
    }
    fn ignored(&self, filename: &str, reason: &str) {
        (**self).ignored(filename, reason)
    }
    fn validating(&self, filename: &str, python: PythonVersion) {
        (**self).validating(filename, python)
    }
    fn info(&self, msg: &str) {
        (**self).info(msg)
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg)
    }
    fn summary(&self, count: usize, action: &str, elapsed_secs: f64) {
        (**self).summary(count, action, elapsed_secs)
    }
}

/// A no-op reporter for silent operations (e.g., testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn pair(&self, _: &ProjectName, _: &Version, _: PythonVersion) {}
    fn skipped(&self, _: &ProjectName, _: &Version, _: PythonVersion) {}
    fn just_built(&self) {}
    fn building(&self) {}
    fn downloaded(&self, _: &str) {}
    fn built(&self, _: &str) {}
    fn ignored(&self, _: &str, _: &str) {}
    fn validating(&self, _: &str, _: PythonVersion) {}
    fn info(&self, _: &str) {}
    fn warning(&self, _: &str) {}
    fn summary(&self, _: usize, _: &str, _: f64) {}
}
