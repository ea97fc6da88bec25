//! Host-specific operations the engine depends on.
//!
//! Exactly two implementations exist, [`darwin::Darwin`] and
//! [`linux::Linux`]; [`for_host`] picks one at startup. Everything the
//! resolver does that differs between macOS and Linux goes through this
//! trait, so the rest of the engine never branches on the OS.

pub mod darwin;
pub mod linux;

use std::collections::BTreeSet;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::warn;
use wheelhouse_schema::{Arch, PythonVersion};

use crate::config::Config;
use crate::env::BuildEnv;
use crate::error::Result;
use crate::host::Host;
use crate::manifest::ManifestEntry;

/// System package managers are not reentrant; one install at a time.
static INSTALL_LOCK: Mutex<()> = Mutex::new(());

/// What a `build` invocation was asked to do, for platforms that re-run it
/// elsewhere.
#[derive(Debug, Clone)]
pub struct SetupContext {
    /// Manifest path on the host.
    pub packages_ini: PathBuf,
    /// Output directory on the host.
    pub dest: PathBuf,
    /// Internal index base URL.
    pub pypi_url: String,
    /// Interpreters to build for.
    pub pythons: Vec<PythonVersion>,
    /// Whether the post-build verification gate is disabled.
    pub no_validate: bool,
}

/// Outcome of [`Platform::setup_dependencies`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setup {
    /// Continue building in this process.
    Ready,
    /// The whole run was carried out elsewhere (e.g. in a container) and
    /// finished successfully.
    Delegated,
}

type Teardown = Box<dyn FnOnce() -> Result<()> + Send>;

/// Scoped system dependencies for one build.
///
/// Holds the global install lock, a snapshot of the build environment, and
/// the teardown that removes exactly what was installed. Dropping the guard
/// restores the environment and runs the teardown; [`finish`] does the same
/// but reports teardown failures.
///
/// [`finish`]: DependencyGuard::finish
pub struct DependencyGuard<'env> {
    env: &'env mut BuildEnv,
    saved: Option<BuildEnv>,
    teardown: Option<Teardown>,
    _lock: MutexGuard<'static, ()>,
}

impl<'env> DependencyGuard<'env> {
    /// Take the install lock and snapshot `env`.
    pub fn new(env: &'env mut BuildEnv) -> Self {
        let lock = INSTALL_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let saved = Some(env.clone());
        Self {
            env,
            saved,
            teardown: None,
            _lock: lock,
        }
    }

    /// Register the cleanup to run when the scope ends.
    pub fn on_teardown(&mut self, teardown: impl FnOnce() -> Result<()> + Send + 'static) {
        self.teardown = Some(Box::new(teardown));
    }

    fn restore(&mut self) -> Result<()> {
        if let Some(saved) = self.saved.take() {
            *self.env = saved;
        }
        match self.teardown.take() {
            Some(teardown) => teardown(),
            None => Ok(()),
        }
    }

    /// End the scope, propagating teardown errors.
    ///
    /// # Errors
    ///
    /// Whatever the registered teardown returns.
    pub fn finish(mut self) -> Result<()> {
        self.restore()
    }
}

impl Deref for DependencyGuard<'_> {
    type Target = BuildEnv;

    fn deref(&self) -> &BuildEnv {
        self.env
    }
}

impl DerefMut for DependencyGuard<'_> {
    fn deref_mut(&mut self) -> &mut BuildEnv {
        self.env
    }
}

impl Drop for DependencyGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            warn!("failed to remove build dependencies: {e}");
        }
    }
}

impl std::fmt::Debug for DependencyGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGuard")
            .field("env", &self.env)
            .field("has_teardown", &self.teardown.is_some())
            .finish_non_exhaustive()
    }
}

/// Operations that differ between macOS and Linux.
pub trait Platform: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Prepare the host before any package is processed. May run the whole
    /// build somewhere else and report [`Setup::Delegated`].
    ///
    /// # Errors
    ///
    /// Failure to start or complete the delegated run.
    fn setup_dependencies(&self, ctx: &SetupContext) -> Result<Setup>;

    /// Install the entry's system dependencies for the duration of the
    /// returned guard, exporting any search paths they need into `env`.
    ///
    /// # Errors
    ///
    /// Package manager failures.
    fn install<'env>(&self, entry: &ManifestEntry, env: &'env mut BuildEnv) -> Result<DependencyGuard<'env>>;

    /// CPU architectures a native binary targets.
    ///
    /// # Errors
    ///
    /// Introspection tool failures or unrecognized output.
    fn get_archs(&self, path: &Path) -> Result<BTreeSet<Arch>>;

    /// Bundle external shared libraries into `wheel`, writing the repaired
    /// wheel into `dest`.
    ///
    /// # Errors
    ///
    /// Repair tool failures.
    fn repair_wheel(&self, wheel: &Path, dest: &Path) -> Result<()>;
}

/// The platform implementation for `host`.
pub fn for_host(host: &Host, config: &Config) -> Box<dyn Platform> {
    if host.is_macos() {
        Box::new(darwin::Darwin::new(config))
    } else {
        Box::new(linux::Linux::new(host, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_guard_restores_env_and_runs_teardown() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut env = BuildEnv::new();
        env.set("CPPFLAGS", "-I/orig");
        {
            let mut guard = DependencyGuard::new(&mut env);
            guard.set("CPPFLAGS", "-I/brew/include");
            let c = Arc::clone(&calls);
            guard.on_teardown(move || {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            assert_eq!(guard.get("CPPFLAGS").as_deref(), Some("-I/brew/include"));
        }
        assert_eq!(env.get("CPPFLAGS").as_deref(), Some("-I/orig"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_finish_propagates_teardown_error_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut env = BuildEnv::new();
        let mut guard = DependencyGuard::new(&mut env);
        let c = Arc::clone(&calls);
        guard.on_teardown(move || {
            c.fetch_add(1, Ordering::SeqCst);
            Err(std::io::Error::other("purge failed").into())
        });
        assert!(guard.finish().is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
