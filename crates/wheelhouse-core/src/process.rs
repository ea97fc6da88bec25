//! Thin helpers around `std::process::Command`.
//!
//! Every external tool the engine drives (pip, auditwheel, otool, brew,
//! apt-get, ...) goes through one of these so failures carry the command
//! line that produced them.

use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::{BuildError, Result};

/// Render a command roughly as a shell would show it.
pub fn describe(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().into_owned()];
    parts.extend(cmd.get_args().map(|a| a.to_string_lossy().into_owned()));
    parts.join(" ")
}

/// Run `cmd` with inherited stdio and fail unless it exits zero.
///
/// # Errors
///
/// [`BuildError::Spawn`] if the program cannot be started and
/// [`BuildError::Command`] on a non-zero exit.
pub fn run(cmd: &mut Command) -> Result<()> {
    let command = describe(cmd);
    debug!(%command, "running");
    let status = cmd.status().map_err(|source| BuildError::Spawn {
        command: command.clone(),
        source,
    })?;
    if !status.success() {
        return Err(BuildError::Command {
            command,
            status: status.to_string(),
        }
        .into());
    }
    Ok(())
}

/// Run `cmd` and return its stdout as text, failing unless it exits zero.
///
/// stderr is passed through so tool diagnostics stay visible.
///
/// # Errors
///
/// Same as [`run`].
pub fn output(cmd: &mut Command) -> Result<String> {
    let command = describe(cmd);
    debug!(%command, "capturing");
    let out = cmd
        .stderr(Stdio::inherit())
        .output()
        .map_err(|source| BuildError::Spawn {
            command: command.clone(),
            source,
        })?;
    if !out.status.success() {
        return Err(BuildError::Command {
            command,
            status: out.status.to_string(),
        }
        .into());
    }
    Ok(String::from_utf8_lossy(&out.stdout).into_owned())
}
