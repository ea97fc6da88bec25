//! macOS: Homebrew for system dependencies, `otool` for Mach-O headers,
//! `delocate` for repair.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info};
use wheelhouse_schema::Arch;

use super::{DependencyGuard, Platform, Setup, SetupContext};
use crate::config::Config;
use crate::env::BuildEnv;
use crate::error::{BuildError, Result};
use crate::manifest::ManifestEntry;
use crate::process;

/// The macOS platform.
#[derive(Debug, Clone)]
pub struct Darwin {
    tool_python: String,
}

impl Darwin {
    /// Create from run configuration.
    pub fn new(config: &Config) -> Self {
        Self {
            tool_python: config.tool_python.clone(),
        }
    }
}

/// Names of installed formulae from `brew info --json=v1 --installed`.
///
/// # Errors
///
/// Output that is not a JSON array of objects with a `name`.
pub fn parse_brew_installed(json: &str) -> Result<BTreeSet<String>> {
    let bad = || BuildError::ToolOutput {
        command: "brew info --json=v1 --installed".to_string(),
        output: json.chars().take(200).collect(),
    };
    let value: serde_json::Value = serde_json::from_str(json).map_err(|_| bad())?;
    let formulae = value.as_array().ok_or_else(bad)?;
    formulae
        .iter()
        .map(|f| {
            f.get("name")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| bad().into())
        })
        .collect()
}

/// CPU types from `otool -hv -arch all`: one 4-line chunk per slice, the
/// CPU type is the second column of the chunk's last line.
///
/// # Errors
///
/// Output whose line count is not a multiple of four.
pub fn parse_otool(output: &str) -> Result<BTreeSet<Arch>> {
    let lines: Vec<&str> = output.lines().collect();
    if lines.is_empty() || lines.len() % 4 != 0 {
        return Err(BuildError::ToolOutput {
            command: "otool -hv -arch all".to_string(),
            output: output.to_string(),
        }
        .into());
    }
    let mut archs = BTreeSet::new();
    for chunk in lines.chunks(4) {
        let cpu = chunk[3].split_whitespace().nth(1).unwrap_or_default();
        if let Ok(arch) = cpu.parse() {
            archs.insert(arch);
        }
    }
    Ok(archs)
}

fn installed() -> Result<BTreeSet<String>> {
    let out = process::output(Command::new("brew").args(["info", "--json=v1", "--installed"]))?;
    parse_brew_installed(&out)
}

fn uninstall_new(before: &BTreeSet<String>) -> Result<()> {
    let newly: Vec<String> = installed()?.difference(before).cloned().collect();
    if newly.is_empty() {
        return Ok(());
    }
    info!(packages = ?newly, "brew uninstall");
    process::run(
        Command::new("brew")
            .arg("uninstall")
            .args(&newly)
            .stdout(Stdio::null()),
    )
}

impl Platform for Darwin {
    fn name(&self) -> &'static str {
        "darwin"
    }

    fn setup_dependencies(&self, _ctx: &SetupContext) -> Result<Setup> {
        Ok(Setup::Ready)
    }

    fn install<'env>(&self, entry: &ManifestEntry, env: &'env mut BuildEnv) -> Result<DependencyGuard<'env>> {
        let mut guard = DependencyGuard::new(env);
        if entry.brew_requires.is_empty() {
            return Ok(guard);
        }

        let before = installed()?;
        guard.on_teardown(move || uninstall_new(&before));

        info!(packages = ?entry.brew_requires, "brew install");
        process::run(
            Command::new("brew")
                .arg("install")
                .args(&entry.brew_requires)
                .arg("--overwrite")
                .env("HOMEBREW_NO_AUTO_UPDATE", "1"),
        )?;

        let out = process::output(Command::new("brew").arg("--prefix").args(&entry.brew_requires))?;
        let prefixes: Vec<PathBuf> = out.lines().map(PathBuf::from).collect();
        debug!(?prefixes, "brew prefixes");

        let under = |sub: &str| -> Vec<String> {
            prefixes
                .iter()
                .map(|p| p.join(sub).display().to_string())
                .collect()
        };
        let flags = |flag: &str, sub: &str| -> String {
            under(sub)
                .iter()
                .map(|p| format!("{flag}{p}"))
                .collect::<Vec<_>>()
                .join(" ")
        };
        guard.set("CPPFLAGS", flags("-I", "include"));
        guard.set("LDFLAGS", flags("-L", "lib"));
        guard.set("PKG_CONFIG_PATH", under("lib/pkgconfig").join(":"));
        Ok(guard)
    }

    fn get_archs(&self, path: &Path) -> Result<BTreeSet<Arch>> {
        let out = process::output(Command::new("otool").args(["-hv", "-arch", "all"]).arg(path))?;
        parse_otool(&out)
    }

    fn repair_wheel(&self, wheel: &Path, dest: &Path) -> Result<()> {
        process::run(
            Command::new(&self.tool_python)
                .args(["-m", "delocate.cmd.delocate_wheel"])
                .arg(wheel)
                .arg("--wheel-dir")
                .arg(dest),
        )
    }
}
