//! Custom prebuild steps.
//!
//! Some packages need a library that neither apt nor brew provide in a
//! usable form. The manifest can name a command that installs it into a
//! private prefix; the build then sees that prefix first on every search
//! path.

use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::process::Command;

use tracing::info;

use crate::env::BuildEnv;
use crate::error::Result;
use crate::manifest::ManifestEntry;
use crate::process;

/// `(variable, prefix subdirectory or flag template, separator)`.
const SEARCH_PATHS: &[(&str, &str, &str)] = &[
    ("PATH", "bin", ":"),
    ("CPPFLAGS", "-I{}/include", " "),
    ("LDFLAGS", "-L{}/lib", " "),
    ("LD_LIBRARY_PATH", "lib", ":"),
    ("PKG_CONFIG_PATH", "lib/pkgconfig", ":"),
];

fn search_value(template: &str, prefix: &Path) -> String {
    let prefix = prefix.display().to_string();
    if template.contains("{}") {
        template.replace("{}", &prefix)
    } else {
        format!("{prefix}/{template}")
    }
}

/// Environment changes of one prebuild, undone on drop.
#[derive(Debug)]
pub struct PrebuildGuard<'env> {
    env: &'env mut BuildEnv,
    saved: Option<BuildEnv>,
}

impl Deref for PrebuildGuard<'_> {
    type Target = BuildEnv;

    fn deref(&self) -> &BuildEnv {
        self.env
    }
}

impl DerefMut for PrebuildGuard<'_> {
    fn deref_mut(&mut self) -> &mut BuildEnv {
        self.env
    }
}

impl Drop for PrebuildGuard<'_> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            *self.env = saved;
        }
    }
}

/// Point `env` at `prefix` for every search path a build consults.
pub fn export_prefix(env: &mut BuildEnv, prefix: &Path) {
    for (name, template, sep) in SEARCH_PATHS {
        env.prepend(name, &search_value(template, prefix), sep);
    }
}

/// Run the entry's prebuild command, if any, into `<scratch>/prefix`.
///
/// The returned guard derefs to the adjusted environment and restores the
/// previous values when dropped. Entries without a prebuild get a guard
/// that changes nothing.
///
/// # Errors
///
/// The prebuild command failing.
pub fn enter<'env>(entry: &ManifestEntry, scratch: &Path, env: &'env mut BuildEnv) -> Result<PrebuildGuard<'env>> {
    let Some((program, args)) = entry.custom_prebuild.split_first() else {
        return Ok(PrebuildGuard { env, saved: None });
    };

    let prefix = scratch.join("prefix");
    info!(package = %entry.name, prefix = %prefix.display(), "custom prebuild");
    let mut cmd = Command::new(program);
    cmd.args(args).arg(&prefix);
    process::run(env.apply(&mut cmd))?;

    let saved = Some(env.clone());
    export_prefix(env, &prefix);
    Ok(PrebuildGuard { env, saved })
}
