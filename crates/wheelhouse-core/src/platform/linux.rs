//! Linux: apt for system dependencies, `file` for ELF headers,
//! `auditwheel` for repair, and an optional build container.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;
use wheelhouse_schema::Arch;

use super::{DependencyGuard, Platform, Setup, SetupContext};
use crate::config::Config;
use crate::env::BuildEnv;
use crate::error::{BuildError, ConfigError, Result};
use crate::host::Host;
use crate::manifest::ManifestEntry;
use crate::process;

/// Where the running executable is mounted inside the build container.
const CONTAINER_EXE: &str = "/usr/local/bin/wheelhouse";

static APT_UPDATED: AtomicBool = AtomicBool::new(false);

/// The Linux platform.
#[derive(Debug, Clone)]
pub struct Linux {
    config: Config,
    repair_policy: Option<String>,
}

impl Linux {
    /// Create from the detected host and run configuration.
    pub fn new(host: &Host, config: &Config) -> Self {
        Self {
            config: config.clone(),
            repair_policy: host.repair_policy(),
        }
    }
}

/// Container runtime used to re-run a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Engine {
    /// Rootless podman maps the invoking user already.
    Podman,
    /// Docker needs to be told who owns the output.
    Docker {
        /// Owner of files written to the output directory.
        uid: u32,
        /// Group of files written to the output directory.
        gid: u32,
    },
}

impl Engine {
    fn detect() -> Result<Self> {
        if which::which("podman").is_ok() {
            return Ok(Self::Podman);
        }
        let id = |flag: &str| -> Result<u32> {
            let mut cmd = Command::new("id");
            cmd.arg(flag);
            let out = process::output(&mut cmd)?;
            out.trim().parse().map_err(|_| {
                BuildError::ToolOutput {
                    command: process::describe(&cmd),
                    output: out.trim().to_string(),
                }
                .into()
            })
        };
        Ok(Self::Docker {
            uid: id("-u")?,
            gid: id("-g")?,
        })
    }
}

/// The command that re-runs this `build` inside `image`.
///
/// The manifest is mounted read-only, the output directory read-write, and
/// the running executable read-only in place of an installed copy. Every
/// run setting is passed through the environment so the inner run behaves
/// like the outer one.
pub fn container_command(
    engine: &Engine,
    image: &str,
    exe: &Path,
    packages_ini: &Path,
    dest: &Path,
    ctx: &SetupContext,
    config: &Config,
) -> Command {
    let mut cmd = match engine {
        Engine::Podman => {
            let mut c = Command::new("podman");
            c.arg("run");
            c
        }
        Engine::Docker { uid, gid } => {
            let mut c = Command::new("docker");
            c.arg("run").arg("--user").arg(format!("{uid}:{gid}"));
            c
        }
    };
    let pythons: Vec<String> = ctx.pythons.iter().map(ToString::to_string).collect();
    cmd.args(["--pull=always", "--rm"])
        .arg(format!("--volume={}:/packages.ini:ro", packages_ini.display()))
        .arg(format!("--volume={}:/dist:rw", dest.display()))
        .arg(format!("--volume={}:{CONTAINER_EXE}:ro", exe.display()))
        .arg("--env=BUILD_IN_CONTAINER=1")
        .arg(format!("--env=WHEELHOUSE_PYTHONS={}", pythons.join(",")))
        .arg(format!("--env=WHEELHOUSE_PUBLIC_INDEX={}", config.public_index))
        .arg(format!("--env=WHEELHOUSE_TOOL_PYTHON={}", config.tool_python))
        .arg(format!("--env=WHEELHOUSE_HTTP_TIMEOUT={}", config.http_timeout.as_secs()))
        .arg(image)
        .arg(CONTAINER_EXE)
        .args(["build", "--dest=/dist", "--packages-ini=/packages.ini"])
        .arg(format!("--pypi-url={}", ctx.pypi_url));
    if ctx.no_validate {
        cmd.arg("--no-validate");
    }
    cmd
}

/// Installed package names from `dpkg-query --show`.
pub fn parse_dpkg(output: &str) -> BTreeSet<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Architecture from `file <path>` output.
///
/// # Errors
///
/// Output naming neither x86-64 nor aarch64.
pub fn parse_file_output(output: &str) -> Result<BTreeSet<Arch>> {
    if output.contains(", x86-64,") {
        Ok(BTreeSet::from([Arch::X86_64]))
    } else if output.contains(", ARM aarch64,") {
        Ok(BTreeSet::from([Arch::Aarch64]))
    } else {
        Err(BuildError::ToolOutput {
            command: "file".to_string(),
            output: format!("unknown architecture: {}", output.trim()),
        }
        .into())
    }
}

fn installed() -> Result<BTreeSet<String>> {
    let out = process::output(Command::new("dpkg-query").args([
        "--show",
        "--showformat",
        "${binary:Package}\n",
    ]))?;
    Ok(parse_dpkg(&out))
}

fn apt_update() -> Result<()> {
    if APT_UPDATED.load(Ordering::SeqCst) {
        return Ok(());
    }
    process::run(Command::new("apt-get").args(["update", "-qq"]))?;
    APT_UPDATED.store(true, Ordering::SeqCst);
    Ok(())
}

fn purge_new(before: &BTreeSet<String>) -> Result<()> {
    let newly: Vec<String> = installed()?.difference(before).cloned().collect();
    if newly.is_empty() {
        return Ok(());
    }
    info!(packages = ?newly, "apt-get purge");
    process::run(
        Command::new("apt-get")
            .args(["purge", "-qqy"])
            .args(&newly)
            .stdout(Stdio::null()),
    )
}

fn absolute(path: &Path) -> Result<PathBuf> {
    Ok(std::path::absolute(path)?)
}

impl Platform for Linux {
    fn name(&self) -> &'static str {
        "linux"
    }

    fn setup_dependencies(&self, ctx: &SetupContext) -> Result<Setup> {
        if self.config.in_container {
            return Ok(Setup::Ready);
        }
        let Some(image) = &self.config.container_image else {
            return Ok(Setup::Ready);
        };

        info!(%image, "building inside container");
        let engine = Engine::detect()?;
        let exe = std::env::current_exe()?;
        let mut cmd = container_command(
            &engine,
            image,
            &exe,
            &absolute(&ctx.packages_ini)?,
            &absolute(&ctx.dest)?,
            ctx,
            &self.config,
        );
        process::run(&mut cmd)?;
        Ok(Setup::Delegated)
    }

    fn install<'env>(&self, entry: &ManifestEntry, env: &'env mut BuildEnv) -> Result<DependencyGuard<'env>> {
        let mut guard = DependencyGuard::new(env);
        if entry.apt_requires.is_empty() {
            return Ok(guard);
        }

        apt_update()?;
        let before = installed()?;
        guard.on_teardown(move || purge_new(&before));

        info!(packages = ?entry.apt_requires, "apt-get install");
        process::run(
            Command::new("apt-get")
                .args(["install", "-qqy", "--no-install-recommends"])
                .args(&entry.apt_requires)
                .env("DEBIAN_FRONTEND", "noninteractive")
                .stdout(Stdio::null())
                .stderr(Stdio::null()),
        )?;
        Ok(guard)
    }

    fn get_archs(&self, path: &Path) -> Result<BTreeSet<Arch>> {
        let out = process::output(Command::new("file").arg(path))?;
        parse_file_output(&out)
    }

    fn repair_wheel(&self, wheel: &Path, dest: &Path) -> Result<()> {
        let policy = self
            .repair_policy
            .as_deref()
            .ok_or_else(|| ConfigError::UnsupportedHost("no manylinux policy for this host".to_string()))?;
        process::run(
            Command::new(&self.config.tool_python)
                .args(["-m", "auditwheel", "repair"])
                .arg(format!("--wheel-dir={}", dest.display()))
                .arg(format!("--plat={policy}"))
                .arg(wheel),
        )
    }
}
