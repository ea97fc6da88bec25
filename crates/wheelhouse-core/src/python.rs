//! Python packaging tools the engine drives: pip for downloads and builds,
//! virtualenv for isolated verification environments.
//!
//! Kept behind [`PythonTools`] so the resolver can be exercised without real
//! interpreters.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;
use wheelhouse_schema::PythonVersion;

use crate::env::BuildEnv;
use crate::error::{BuildError, Result};
use crate::manifest::ManifestEntry;
use crate::process;

/// Which wheel flavour a download asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadTarget {
    /// The best wheel for this interpreter on this host.
    Native,
    /// A platform-agnostic (`-any`) wheel only.
    AnyPlatform,
}

/// External Python tooling.
pub trait PythonTools: Send + Sync {
    /// Download the entry's wheel into the empty directory `dest`.
    ///
    /// Returns `false` when the index has no matching wheel; that is a normal
    /// outcome, not an error.
    ///
    /// # Errors
    ///
    /// Failure to run the tool at all.
    fn download_wheel(
        &self,
        entry: &ManifestEntry,
        python: PythonVersion,
        dest: &Path,
        target: DownloadTarget,
    ) -> Result<bool>;

    /// Download the entry's source distribution into `dest`.
    ///
    /// # Errors
    ///
    /// Any tool failure.
    fn download_sdist(&self, entry: &ManifestEntry, python: PythonVersion, dest: &Path, env: &BuildEnv) -> Result<()>;

    /// Compile `sdist` into a wheel under `wheel_dir`, resolving build
    /// dependencies from `index_url`.
    ///
    /// # Errors
    ///
    /// Any tool failure.
    fn build_wheel(
        &self,
        python: PythonVersion,
        sdist: &Path,
        index_url: &str,
        wheel_dir: &Path,
        env: &BuildEnv,
    ) -> Result<()>;

    /// Create an isolated environment for `python` at `venv`.
    ///
    /// # Errors
    ///
    /// Any tool failure.
    fn create_env(&self, python: PythonVersion, venv: &Path) -> Result<()>;

    /// Install `requirements` into `venv`, binary-only, also searching
    /// `find_links`.
    ///
    /// # Errors
    ///
    /// Any tool failure.
    fn install(&self, venv: &Path, requirements: &[String], index_url: &str, find_links: &Path) -> Result<()>;

    /// Import `module` inside `venv`.
    ///
    /// # Errors
    ///
    /// The import raising.
    fn import(&self, venv: &Path, module: &str) -> Result<()>;
}

/// pip and virtualenv on the host.
#[derive(Debug, Clone)]
pub struct Pip {
    public_index: String,
    tool_python: String,
}

impl Pip {
    /// `public_index` serves downloads; `tool_python` runs virtualenv.
    pub fn new(public_index: &str, tool_python: &str) -> Self {
        Self {
            public_index: public_index.to_string(),
            tool_python: tool_python.to_string(),
        }
    }

    fn pip(python: PythonVersion) -> Command {
        let mut cmd = Command::new(python.exe());
        cmd.args(["-m", "pip"]);
        cmd
    }

    fn venv_python(venv: &Path) -> PathBuf {
        venv.join("bin").join("python")
    }
}

impl PythonTools for Pip {
    fn download_wheel(
        &self,
        entry: &ManifestEntry,
        python: PythonVersion,
        dest: &Path,
        target: DownloadTarget,
    ) -> Result<bool> {
        let mut cmd = Self::pip(python);
        cmd.arg("download")
            .arg(format!("--dest={}", dest.display()))
            .arg(format!("--index-url={}", self.public_index))
            .args(["--no-deps", "--only-binary=:all:"]);
        if target == DownloadTarget::AnyPlatform {
            cmd.arg("--platform=any");
        }
        cmd.arg(entry.requirement());

        let command = process::describe(&cmd);
        let status = cmd
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|source| BuildError::Spawn {
                command: command.clone(),
                source,
            })?;
        debug!(%command, success = status.success(), "wheel download");
        Ok(status.success())
    }

    fn download_sdist(&self, entry: &ManifestEntry, python: PythonVersion, dest: &Path, env: &BuildEnv) -> Result<()> {
        let mut cmd = Self::pip(python);
        cmd.arg("download")
            .arg(format!("--dest={}", dest.display()))
            .arg(format!("--index-url={}", self.public_index))
            .arg("--no-deps")
            .arg(format!("--no-binary={}", entry.name))
            .arg(entry.requirement());
        process::run(env.apply(&mut cmd))
    }

    fn build_wheel(
        &self,
        python: PythonVersion,
        sdist: &Path,
        index_url: &str,
        wheel_dir: &Path,
        env: &BuildEnv,
    ) -> Result<()> {
        let mut cmd = Self::pip(python);
        cmd.arg("wheel")
            .arg(format!("--index-url={index_url}"))
            .arg(format!("--wheel-dir={}", wheel_dir.display()))
            .arg("--no-deps")
            .arg(sdist);
        // Keep macOS builds single-arch; universal2 doubles build time.
        env.apply(&mut cmd).env("ARCHFLAGS", "");
        process::run(&mut cmd)
    }

    fn create_env(&self, python: PythonVersion, venv: &Path) -> Result<()> {
        process::run(
            Command::new(&self.tool_python)
                .args([
                    "-m",
                    "virtualenv",
                    "--no-periodic-update",
                    "--pip=embed",
                    "--setuptools=embed",
                    "--wheel=embed",
                    "--quiet",
                ])
                .arg(format!("--python={}", python.exe()))
                .arg(venv),
        )
    }

    fn install(&self, venv: &Path, requirements: &[String], index_url: &str, find_links: &Path) -> Result<()> {
        process::run(
            Command::new(Self::venv_python(venv))
                .args([
                    "-m",
                    "pip",
                    "install",
                    "--quiet",
                    "--no-cache-dir",
                    "--disable-pip-version-check",
                    "--only-binary=:all:",
                ])
                .arg(format!("--index-url={index_url}"))
                .arg(format!("--find-links={}", find_links.display()))
                .args(requirements),
        )
    }

    fn import(&self, venv: &Path, module: &str) -> Result<()> {
        process::run(
            Command::new(Self::venv_python(venv))
                .arg("-c")
                .arg(format!("__import__({module:?})")),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pip_command() {
        let cmd = Pip::pip(PythonVersion::new(3, 12));
        assert_eq!(process::describe(&cmd), "python3.12 -m pip");
    }

    #[test]
    fn test_venv_python() {
        assert_eq!(
            Pip::venv_python(Path::new("/tmp/venv")),
            PathBuf::from("/tmp/venv/bin/python")
        );
    }

    #[test]
    fn test_download_reports_missing_interpreter_as_error() {
        let pip = Pip::new("https://pypi.org/simple", "python3");
        let entry = ManifestEntry::new("foo", wheelhouse_schema::Version::parse("1.0").unwrap());
        let dir = tempfile::tempdir().unwrap();
        // No interpreter is ever installed as python3.99.
        let result = pip.download_wheel(&entry, PythonVersion::new(3, 99), dir.path(), DownloadTarget::Native);
        assert!(result.is_err());
    }
}
